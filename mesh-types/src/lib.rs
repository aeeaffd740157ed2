//! CRD and shared domain type definitions for the mesh control plane.
//!
//! These mirror the `admiral-api` CRDs the fabric watches (`Dependency`,
//! `TrafficConfig`) plus the small value types that travel through caches
//! and the HTTP introspection API. Kubernetes-native workload types
//! (`Deployment`, `Service`, `Secret`) are consumed directly from
//! `k8s-openapi` rather than re-declared here.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `Rollout` mirrors the subset of the argoproj.io `Rollout` CRD the fabric
/// cares about: a pod template shaped exactly like a `Deployment`'s, so that
/// identity/env derivation and the workload caches can treat the two kinds
/// symmetrically (spec.md §4.1, "Deployments / Rollouts (symmetric)").
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Rollout",
    plural = "rollouts",
    derive = "PartialEq",
    namespaced
)]
#[kube(derive = "Default")]
pub struct RolloutSpec {
    pub replicas: Option<i32>,
    pub template: Option<PodTemplateSpec>,
}

/// `Dependency` declares which identities a source identity calls.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "admiral.io",
    version = "v1",
    kind = "Dependency",
    plural = "dependencies",
    derive = "PartialEq",
    namespaced
)]
#[kube(derive = "Default")]
pub struct DependencySpec {
    pub source: String,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default, rename = "identityLabel")]
    pub identity_label: Option<String>,
}

/// A single routed path within an `EdgeService`.
#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
pub struct Route {
    pub name: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    pub inbound: Option<String>,
    pub outbound: Option<String>,
    #[serde(default)]
    pub workload_envs: Vec<String>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
pub struct EdgeService {
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub dns_prefixes: Vec<String>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
pub struct QuotaGroupRule {
    pub name: String,
    pub max_amount: Option<i64>,
    #[serde(default)]
    pub restrictions: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
pub struct QuotaGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<QuotaGroupRule>,
}

/// `TrafficConfig` describes per-environment routing for an identity, keyed
/// off a label/annotation rather than a spec field (see
/// `traffic_config_identity_key` in the process options).
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "admiral.io",
    version = "v1",
    kind = "TrafficConfig",
    plural = "trafficconfigs",
    derive = "PartialEq",
    namespaced
)]
#[kube(derive = "Default")]
pub struct TrafficConfigSpec {
    #[serde(default)]
    pub workload_env: Vec<String>,
    pub edge_service: Option<EdgeService>,
    pub quota_group: Option<QuotaGroup>,
}

/// Per-service computed route view, the compacted shape the traffic config
/// cache hands out to consumers (handlers, the HTTP API) instead of the raw
/// CRD spec.
#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
pub struct ServiceRouteConfig {
    #[serde(default)]
    pub workload_env_revision: BTreeMap<String, String>,
    pub service_asset_alias: String,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
pub struct RouteConfig {
    #[serde(default)]
    pub services_route_config: Vec<ServiceRouteConfig>,
}

/// Label/annotation keys the fabric reads off arbitrary resources. These are
/// fixed protocol constants, unlike the configurable keys in
/// `mesh_common::options` (e.g. `workload_identity_key`).
pub mod well_known {
    pub const REVISION_NUMBER_KEY: &str = "admiral.io/revision";
    pub const TRANSACTION_ID_KEY: &str = "admiral.io/txId";
    pub const IS_DISABLED_KEY: &str = "admiral.io/disabled";
    pub const IS_TRUE: &str = "true";
}
