/// Error taxonomy for the decision engine
/// Transient I/O failures are logged and skipped item-by-item inside a tick;
/// everything else either degrades to an empty plan or propagates.

use hivebus_load_data::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Failures surfaced by the broker admin endpoint
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("admin request rejected: {0}")]
    Request(String),

    #[error("broker server error: {0}")]
    Server(String),

    #[error("admin transport error: {0}")]
    Transport(String),
}

/// Error types for the load-balancer engine
#[derive(Error, Debug)]
pub enum BalancerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error("namespace service failure: {0}")]
    Namespace(String),

    #[error("malformed bundle id: '{0}'")]
    InvalidBundleId(String),

    /// Programmer error: a strategy was asked for that this engine cannot build
    #[error("strategy context mismatch: {0}")]
    InvalidContext(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("engine is shutting down")]
    Shutdown,
}
