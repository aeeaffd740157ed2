//! Read-only HTTP introspection API (spec.md §6, C-API): serves the
//! contents of the process-singleton caches as JSON under `/api/v1`.

pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::cache::Caches;
use crate::remotecluster::RemoteClusterRegistry;
use routes::ApiState;

pub fn build_router(caches: Arc<Caches>, clusters: Arc<RemoteClusterRegistry>) -> Router {
    let state = ApiState { caches, clusters };

    Router::new()
        .route("/clusters", get(routes::list_clusters))
        .route("/clusters/identities/{identity}", get(routes::clusters_for_identity))
        .route("/clusters/{cluster_id}/envoyfilters", get(routes::cluster_envoy_filters))
        .route(
            "/clusters/{cluster_id}/envoyfilters/identities/{identity}",
            get(routes::cluster_envoy_filters),
        )
        .route("/clusters/{cluster_id}/virtualservices", get(routes::cluster_virtual_services))
        .route(
            "/clusters/{cluster_id}/virtualservices/identities/{identity}",
            get(routes::cluster_virtual_services),
        )
        .route("/dependency/identities/{identity}", get(routes::dependencies_for_identity))
        .route("/dependents/identities/{identity}", get(routes::dependents_for_identity))
        .route("/dependents/total", get(routes::dependents_total))
        .route(
            "/workload/clusters/{cluster}/identities/{identity}",
            get(routes::deployments_for_cluster_identity),
        )
        .route(
            "/workload/clusters/{cluster}/identities/{identity}/env/{env}",
            get(routes::deployments_for_cluster_identity_env),
        )
        .route(
            "/workload/clusters/identities/{identity}",
            get(routes::deployments_for_identity),
        )
        .route(
            "/workload/clusters/{cluster}/namespaces/{namespace}/services",
            get(routes::services_for_cluster_namespace),
        )
        .route(
            "/trafficconfig/identities/{identity}",
            get(routes::traffic_config_for_identity),
        )
        .route(
            "/trafficconfig/identities/{identity}/env/{env}",
            get(routes::traffic_config_for_identity_env),
        )
        .route(
            "/trafficconfig/resources/identities/{identity}",
            get(routes::traffic_config_resource_for_identity),
        )
        .route(
            "/trafficconfig/resources/identities/{identity}/dependents/{dependent}",
            get(routes::traffic_config_resource_for_dependent),
        )
        .route(
            "/trafficconfig/resources/identities/{identity}/dependents/{dependent}/env/{env}",
            get(routes::traffic_config_resource_for_dependent_env),
        )
        .route("/health/full", get(routes::health_full))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
