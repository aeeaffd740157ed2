use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::cache::Caches;
use crate::remotecluster::RemoteClusterRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub caches: Arc<Caches>,
    pub clusters: Arc<RemoteClusterRegistry>,
}

/// `{"Message": "..."}` error body (spec.md §6: "Error responses are
/// `{Message: string}`").
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(ErrorBody { message: self.message })).into_response()
    }
}

#[derive(Serialize)]
pub struct ClusterSummary {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Host")]
    host: String,
}

pub async fn list_clusters(State(state): State<ApiState>) -> Json<Vec<ClusterSummary>> {
    let clusters = state
        .clusters
        .list()
        .into_iter()
        .map(|c| ClusterSummary {
            name: c.cluster_id.clone(),
            host: c.host.clone(),
        })
        .collect();
    Json(clusters)
}

pub async fn clusters_for_identity(
    State(state): State<ApiState>,
    Path(identity): Path<String>,
) -> Json<Vec<String>> {
    Json(state.caches.identity_clusters.get_clusters_for_identity(&identity))
}

/// Mesh-artifact payloads (envoy filters, virtual services) are synthesized
/// entirely by the external feature reconcilers (spec.md §1 Non-goals); this
/// fabric never stores the rendered artifacts, so both routes always answer
/// with an empty list rather than pretending to have a cache for them.
pub async fn cluster_envoy_filters(
    State(_state): State<ApiState>,
    Path(_cluster_id): Path<String>,
) -> Json<Vec<serde_json::Value>> {
    Json(Vec::new())
}

pub async fn cluster_virtual_services(
    State(_state): State<ApiState>,
    Path(_cluster_id): Path<String>,
) -> Json<Vec<serde_json::Value>> {
    Json(Vec::new())
}

pub async fn dependencies_for_identity(
    State(state): State<ApiState>,
    Path(identity): Path<String>,
) -> Json<Vec<String>> {
    Json(state.caches.identity_dependencies.get_dependencies_for_identity(&identity))
}

pub async fn dependents_for_identity(
    State(state): State<ApiState>,
    Path(identity): Path<String>,
) -> Json<Vec<String>> {
    Json(state.caches.identity_dependencies.get_dependents_for_identity(&identity))
}

#[derive(Serialize)]
pub struct DependentsTotal {
    total: usize,
}

pub async fn dependents_total(State(state): State<ApiState>) -> Json<DependentsTotal> {
    Json(DependentsTotal {
        total: state.caches.identity_dependencies.get_total_dependencies(),
    })
}

pub async fn deployments_for_cluster_identity_env(
    State(state): State<ApiState>,
    Path((cluster, identity, env)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .caches
        .deployments
        .get_by_cluster_identity_env(&cluster, &identity, &env)
        .map(|item| Json(item.resource).into_response())
        .ok_or_else(|| ApiError::not_found(format!("no workload for {identity}/{env} on {cluster}")))
}

pub async fn deployments_for_cluster_identity(
    State(state): State<ApiState>,
    Path((cluster, identity)): Path<(String, String)>,
) -> impl IntoResponse {
    let by_env = state.caches.deployments.get_by_cluster_identity(&cluster, &identity);
    let resources: Vec<_> = by_env.into_values().map(|item| item.resource).collect();
    Json(resources)
}

pub async fn deployments_for_identity(
    State(state): State<ApiState>,
    Path(identity): Path<String>,
) -> impl IntoResponse {
    let by_cluster = state.caches.deployments.get_by_identity(&identity);
    let resources: Vec<_> = by_cluster
        .into_values()
        .flat_map(|by_env| by_env.into_values().map(|item| item.resource))
        .collect();
    Json(resources)
}

pub async fn services_for_cluster_namespace(
    State(state): State<ApiState>,
    Path((cluster, namespace)): Path<(String, String)>,
) -> impl IntoResponse {
    let by_name = state.caches.services.get_by_cluster_namespace(&cluster, &namespace);
    let resources: Vec<_> = by_name.into_values().map(|item| item.service).collect();
    Json(resources)
}

pub async fn traffic_config_for_identity_env(
    State(state): State<ApiState>,
    Path((identity, env)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .caches
        .traffic_configs
        .get(&identity, &env)
        .map(|entry| Json(entry.route_view).into_response())
        .ok_or_else(|| ApiError::not_found(format!("no traffic config for {identity}/{env}")))
}

pub async fn traffic_config_for_identity(
    State(state): State<ApiState>,
    Path(identity): Path<String>,
) -> impl IntoResponse {
    let by_env = state.caches.traffic_configs.get_all_envs(&identity);
    let views: Vec<_> = by_env.into_values().map(|entry| entry.route_view).collect();
    Json(views)
}

pub async fn traffic_config_resource_for_identity(
    State(state): State<ApiState>,
    Path(identity): Path<String>,
) -> impl IntoResponse {
    let by_env = state.caches.traffic_configs.get_all_envs(&identity);
    let policies: Vec<_> = by_env.into_values().map(|entry| entry.policy).collect();
    Json(policies)
}

pub async fn traffic_config_resource_for_dependent(
    State(state): State<ApiState>,
    Path((identity, dependent)): Path<(String, String)>,
) -> impl IntoResponse {
    let dependents = state.caches.identity_dependencies.get_dependents_for_identity(&identity);
    if !dependents.iter().any(|d| d.eq_ignore_ascii_case(&dependent)) {
        return Json(Vec::<serde_json::Value>::new());
    }
    let by_env = state.caches.traffic_configs.get_all_envs(&dependent);
    Json(
        by_env
            .into_values()
            .map(|entry| serde_json::to_value(entry.policy).unwrap_or(serde_json::Value::Null))
            .collect(),
    )
}

pub async fn traffic_config_resource_for_dependent_env(
    State(state): State<ApiState>,
    Path((identity, dependent, env)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let dependents = state.caches.identity_dependencies.get_dependents_for_identity(&identity);
    if !dependents.iter().any(|d| d.eq_ignore_ascii_case(&dependent)) {
        return Err(ApiError::not_found(format!("{dependent} is not a dependent of {identity}")));
    }
    state
        .caches
        .traffic_configs
        .get(&dependent, &env)
        .map(|entry| Json(entry.policy).into_response())
        .ok_or_else(|| ApiError::not_found(format!("no traffic config for {dependent}/{env}")))
}

pub async fn health_full() -> &'static str {
    "Health full ok"
}
