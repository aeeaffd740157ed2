use tracing_subscriber::EnvFilter;

/// Field name constants shared across the codebase so that log lines stay
/// queryable by the same key no matter which module emits them.
pub mod fields {
    pub const CONTROLLER_NAME: &str = "controller_name";
    pub const CLUSTER: &str = "cluster";
    pub const IDENTITY: &str = "identity";
    pub const ENV: &str = "env";
    pub const EVENT_TYPE: &str = "event_type";
    pub const EVENT_STATUS: &str = "event_status";
    pub const EVENT_ID: &str = "event_id";
    pub const CHILD_EVENT_ID: &str = "child_event_id";
    pub const RESOURCE: &str = "resource";
    pub const NAMESPACE: &str = "namespace";
    pub const QUEUE_LEN: &str = "queue_len";
    pub const QUEUE_TIME_MS: &str = "queue_time_ms";
    pub const TIME_TAKEN_MS: &str = "time_taken_ms";
    pub const HANDLER_NAME: &str = "handler_name";
}

/// Installs the global `tracing` subscriber. Level is driven by `RUST_LOG`
/// when set, falling back to `--log_level`. JSON output in prod-like
/// environments, human-readable pretty output otherwise.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let is_prod = std::env::var("APP_ENV")
        .map(|v| v.eq_ignore_ascii_case("prod") || v.eq_ignore_ascii_case("production"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if is_prod {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}

/// Idempotent subscriber install for use from `#[cfg(test)]` modules.
pub fn test_init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
