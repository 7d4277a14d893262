use miette::Diagnostic;
use thiserror::Error;

/// Store error type
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    /// No configured endpoint produced a usable connection
    #[error("No allocation store endpoint reachable: {message}")]
    #[diagnostic(
        code(vlanipam::store::unreachable),
        help("Check ETCD_ENDPOINTS and that every member of the etcd cluster is serving")
    )]
    Unreachable {
        message: String,
    },

    /// A request against an established connection failed
    #[error("Store operation failed: {message}")]
    #[diagnostic(
        code(vlanipam::store::operation),
        help("The etcd cluster may be degraded; the operation is safe to retry")
    )]
    Operation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create an Unreachable error
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create an Operation error
    pub fn operation(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Operation {
            message: message.into(),
            source,
        }
    }
}

impl From<etcd_client::Error> for StoreError {
    fn from(err: etcd_client::Error) -> Self {
        StoreError::operation(format!("etcd error: {err}"), Some(Box::new(err)))
    }
}
