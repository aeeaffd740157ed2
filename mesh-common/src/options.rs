use std::sync::OnceLock;
use std::time::{Duration, Instant};

use clap::Parser;
use regex::Regex;

/// CLI surface for the control plane binary. Mirrors the flag/env pairing
/// conventions used throughout the workspace's other `*Args` structs: a long
/// flag name, an explicit env fallback, and a built-in default so the
/// process runs sanely with zero configuration in a dev cluster.
#[derive(Parser, Debug, Clone)]
pub struct CliArgs {
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_COLOR", default_value_t = false)]
    pub log_color: bool,

    #[arg(long, env = "ARGO_ROLLOUTS_ENABLED", default_value_t = true)]
    pub argo_rollouts_enabled: bool,

    #[arg(long, env = "CONFIG_PATH", default_value = "/etc/mesh/config.yaml")]
    pub config_path: String,

    #[arg(long, env = "WORKLOAD_IDENTITY_KEY", default_value = "alpha.istio.io/identity")]
    pub workload_identity_key: String,

    #[arg(long, env = "MESH_INJECTION_ENABLED_KEY", default_value = "sidecar.istio.io/inject")]
    pub mesh_injection_enabled_key: String,

    #[arg(long, env = "ENV_KEY", default_value = "admiral.io/env")]
    pub env_key: String,

    #[arg(long, env = "RESOURCE_IGNORE_LABEL", default_value = "admiral.io/ignore")]
    pub resource_ignore_label: String,

    #[arg(long, env = "SECRET_SYNC_LABEL", default_value = "admiral.io/sync")]
    pub secret_sync_label: String,

    #[arg(long, env = "HOSTNAME_SUFFIX", default_value = "mesh")]
    pub hostname_suffix: String,

    #[arg(long, env = "ENABLE_PROFILING", default_value_t = false)]
    pub enable_profiling: bool,

    #[arg(long, env = "PROFILER_ENDPOINT", default_value = "localhost:4040")]
    pub profiler_endpoint: String,

    #[arg(long, env = "CONFIG_RESOLVER", default_value = "secret")]
    pub config_resolver: String,

    #[arg(long, env = "STATE_CHECKER", default_value = "none")]
    pub state_checker: String,

    #[arg(long, env = "TRAFFIC_CONFIG_NAMESPACE", default_value = "admiral")]
    pub traffic_config_namespace: String,

    #[arg(long, env = "TRAFFIC_CONFIG_IDENTITY_KEY", default_value = "asset")]
    pub traffic_config_identity_key: String,

    #[arg(long, env = "ALLOWED_CLUSTER_SCOPE", value_delimiter = ',', default_value = ".*")]
    pub allowed_cluster_scope: Vec<String>,

    #[arg(long, env = "IGNORE_ASSET_ALIASES", value_delimiter = ',')]
    pub ignore_asset_aliases: Vec<String>,

    #[arg(long, env = "ENVOY_FILTER_VERSIONS", value_delimiter = ',', default_value = "1.21")]
    pub envoy_filter_versions: Vec<String>,

    #[arg(long, env = "DEPRECATED_ENVOY_FILTER_VERSIONS", value_delimiter = ',', default_value = "1.13")]
    pub deprecated_envoy_filter_versions: Vec<String>,

    #[arg(long, env = "DISABLED_FEATURES", value_delimiter = ',')]
    pub disabled_features: Vec<String>,

    #[arg(long, env = "ASYNC_EXECUTOR_MAX_GOROUTINES", default_value_t = 20_000)]
    pub async_executor_max_goroutines: i32,

    #[arg(long, env = "WORKER_CONCURRENCY", default_value_t = 1)]
    pub worker_concurrency: usize,

    #[arg(long, env = "CACHE_REFRESH_INTERVAL_SECS", default_value_t = 60)]
    pub cache_refresh_interval_secs: u64,

    #[arg(long, env = "KUBECONFIG_PATH", default_value = "")]
    pub kube_config_path: String,

    #[arg(long, env = "CLUSTER_REGISTRIES_NAMESPACE", default_value = "admiral")]
    pub cluster_registries_namespace: String,

    #[arg(long, env = "DEPENDENCIES_NAMESPACE", default_value = "admiral")]
    pub dependencies_namespace: String,

    #[arg(long, env = "SYNC_NAMESPACE", default_value = "admiral-sync")]
    pub sync_namespace: String,
}

/// Resolved, process-wide snapshot of [`CliArgs`]. Built once at startup and
/// published through [`init`]; every subsequent read goes through [`get`]
/// rather than threading the args struct through every call site.
#[derive(Debug, Clone)]
pub struct Options {
    pub args: CliArgs,
    pub start_up_time: Instant,
}

static OPTIONS: OnceLock<Options> = OnceLock::new();

/// Publishes the process-wide options snapshot. Must be called exactly once,
/// early in `main`, before any other module calls [`get`].
pub fn init(args: CliArgs) {
    let options = Options {
        args,
        start_up_time: Instant::now(),
    };
    if OPTIONS.set(options).is_err() {
        tracing::warn!("options::init called more than once, ignoring");
    }
}

pub fn get() -> &'static Options {
    OPTIONS.get().expect("options::init must run before options::get")
}

pub fn is_cache_warmed_up() -> bool {
    let opts = get();
    opts.start_up_time.elapsed() > Duration::from_secs(opts.args.cache_refresh_interval_secs)
}

pub fn cache_refresh_interval() -> Duration {
    Duration::from_secs(get().args.cache_refresh_interval_secs)
}

/// Case-insensitive regex match of `cluster` against any of the configured
/// scope patterns. A misconfigured pattern is treated as a startup
/// configuration error, mirroring the Go implementation's panic on an
/// invalid scope regex.
pub fn is_cluster_in_allowed_scope(cluster: &str) -> bool {
    for scope in &get().args.allowed_cluster_scope {
        let pattern = format!("(?i){}", scope.trim());
        let re = Regex::new(&pattern)
            .unwrap_or_else(|e| panic!("unable to compile regex for scope={scope}: {e}"));
        if re.is_match(cluster) {
            return true;
        }
    }
    false
}

pub fn is_asset_ignored(asset: &str) -> bool {
    get()
        .args
        .ignore_asset_aliases
        .iter()
        .any(|a| a.eq_ignore_ascii_case(asset))
}

/// A disabled-features list is a denylist: a feature not present in it is
/// considered enabled, matching the Go `!slices.Contains(...)` check.
pub fn is_feature_enabled(feature: &str) -> bool {
    !get()
        .args
        .disabled_features
        .iter()
        .any(|f| f == feature)
}
