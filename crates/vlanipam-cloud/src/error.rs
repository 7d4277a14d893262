use miette::Diagnostic;
use thiserror::Error;

/// Cloud client error type
#[derive(Error, Debug, Diagnostic)]
pub enum CloudError {
    /// Token file missing, unreadable, or without a token entry
    #[error("Credentials unavailable: {message}")]
    #[diagnostic(
        code(vlanipam::cloud::credentials),
        help("Check LINODE_CLI_CONFIG and that the file contains a 'token = ...' line")
    )]
    Credentials {
        message: String,
    },

    /// A 200 response whose body could not be interpreted
    #[error("Invalid API response: {message}")]
    #[diagnostic(
        code(vlanipam::cloud::invalid_response),
        help("The provider may have changed its response schema; this is not retried")
    )]
    InvalidResponse {
        message: String,
    },

    /// Retry budget exhausted against a failing or throttling API
    #[error("Transient cloud failure: {message}")]
    #[diagnostic(
        code(vlanipam::cloud::transient),
        help("The Linode API is degraded or rate limiting; the operation is safe to retry")
    )]
    Transient {
        message: String,
    },
}

/// Result type for cloud operations
pub type Result<T> = std::result::Result<T, CloudError>;

impl CloudError {
    /// Create a Credentials error
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Create an InvalidResponse error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a Transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Whether this failure is a missing/broken credential rather than
    /// a provider-side problem.
    pub fn is_credentials(&self) -> bool {
        matches!(self, CloudError::Credentials { .. })
    }
}
