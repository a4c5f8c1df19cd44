use crate::model::GuardianError;

/// Unified error type for anything that crosses an API boundary in this crate:
/// config loading, container manager setup, and the `ChainRpc`/`DataStore` trait
/// methods. Container pipeline failures are *not* routed through this type — they
/// are job-fatal but not crate-fatal, and are recorded as `ContainerResult::Error`
/// values instead (see `orchestration::pipeline`).
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("guardian rejected message: {0}")]
    Guardian(#[from] GuardianError),

    #[error("container {container_id} returned a non-structured response: {message}")]
    ContainerResponse { container_id: String, message: String },

    #[error("container {container_id} io failure: {message}")]
    ContainerIo { container_id: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("data store error: {0}")]
    Store(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
