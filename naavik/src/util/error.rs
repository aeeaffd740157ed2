#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("invalid config resolver: {0}")]
    InvalidResolver(String),

    #[error("invalid state checker: {0}")]
    InvalidStateChecker(String),

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}
