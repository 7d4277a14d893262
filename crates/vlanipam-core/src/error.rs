use miette::Diagnostic;
use thiserror::Error;

/// Error type shared by the allocation engine and the HTTP surface
#[derive(Error, Debug, Diagnostic)]
pub enum IpamError {
    /// Malformed or missing caller input
    #[error("Invalid input: {reason}")]
    #[diagnostic(
        code(vlanipam::invalid_input),
        help("Check that the request body carries a well-formed subnet or IP address")
    )]
    InvalidInput {
        reason: String,
    },

    /// Required environment variable not set
    #[error("Missing configuration: {variable} is not set")]
    #[diagnostic(
        code(vlanipam::missing_config),
        help("Set the {variable} environment variable before starting the service")
    )]
    MissingConfig {
        variable: String,
    },

    /// Release target is a network/broadcast/gateway slot
    #[error("Cannot release reserved address {ip}")]
    #[diagnostic(
        code(vlanipam::reserved_address),
        help("Network, broadcast, and gateway addresses are never allocated and cannot be released")
    )]
    CannotReleaseReserved {
        ip: String,
    },

    /// Release target exists in neither key form
    #[error("Address {ip} is not allocated")]
    #[diagnostic(
        code(vlanipam::not_allocated),
        help("The address may already have been released, or was never allocated by this service")
    )]
    NotAllocated {
        ip: String,
    },

    /// Every non-reserved host in the subnet is used
    #[error(
        "No IPs available in subnet {subnet}: attempted {attempted}, {reserved} reserved, {used} in use"
    )]
    #[diagnostic(
        code(vlanipam::subnet_exhausted),
        help("Release unused addresses or allocate from a larger subnet")
    )]
    SubnetExhausted {
        subnet: String,
        attempted: usize,
        reserved: usize,
        used: usize,
    },

    /// No store endpoint answered, or a store operation failed
    #[error("Allocation store unavailable: {message}")]
    #[diagnostic(
        code(vlanipam::store_unavailable),
        help("Check ETCD_ENDPOINTS and the health of the etcd cluster")
    )]
    StoreUnavailable {
        message: String,
    },

    /// Cloud inventory could not be fetched
    #[error("Cloud API unavailable: {message}")]
    #[diagnostic(
        code(vlanipam::cloud_unavailable),
        help("Allocation refuses to proceed without a fresh cloud view; retry once the Linode API is reachable")
    )]
    CloudUnavailable {
        message: String,
    },

    /// API token file missing or malformed
    #[error("Cloud credentials unavailable: {message}")]
    #[diagnostic(
        code(vlanipam::credentials_unavailable),
        help("Verify the linode-cli config file exists and contains a token entry")
    )]
    CredentialsUnavailable {
        message: String,
    },

    /// Refresh job submission or inspection failed
    #[error("Refresh operation failed: {message}")]
    #[diagnostic(
        code(vlanipam::refresh_failed),
        help("Check the job manifest and connectivity to the Kubernetes API server")
    )]
    RefreshFailed {
        message: String,
    },

    /// Local resource pressure or another liveness signal failed
    #[error("Service unhealthy: {reason}")]
    #[diagnostic(code(vlanipam::unhealthy))]
    Unhealthy {
        reason: String,
    },
}

/// Result type alias for allocation operations
pub type Result<T> = std::result::Result<T, IpamError>;

impl IpamError {
    /// Create an InvalidInput error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create a MissingConfig error
    pub fn missing_config(variable: impl Into<String>) -> Self {
        Self::MissingConfig {
            variable: variable.into(),
        }
    }

    /// Create a CannotReleaseReserved error
    pub fn cannot_release_reserved(ip: impl Into<String>) -> Self {
        Self::CannotReleaseReserved { ip: ip.into() }
    }

    /// Create a NotAllocated error
    pub fn not_allocated(ip: impl Into<String>) -> Self {
        Self::NotAllocated { ip: ip.into() }
    }

    /// Create a SubnetExhausted error with diagnostic counts
    pub fn subnet_exhausted(
        subnet: impl Into<String>,
        attempted: usize,
        reserved: usize,
        used: usize,
    ) -> Self {
        Self::SubnetExhausted {
            subnet: subnet.into(),
            attempted,
            reserved,
            used,
        }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a CloudUnavailable error
    pub fn cloud_unavailable(message: impl Into<String>) -> Self {
        Self::CloudUnavailable {
            message: message.into(),
        }
    }

    /// Create a CredentialsUnavailable error
    pub fn credentials_unavailable(message: impl Into<String>) -> Self {
        Self::CredentialsUnavailable {
            message: message.into(),
        }
    }

    /// Create a RefreshFailed error
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::RefreshFailed {
            message: message.into(),
        }
    }

    /// Create an Unhealthy error
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::Unhealthy {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = IpamError::invalid_input("subnet not provided");
        assert!(matches!(err, IpamError::InvalidInput { .. }));

        let err = IpamError::subnet_exhausted("10.0.0.0/30", 2, 1, 1);
        assert!(matches!(err, IpamError::SubnetExhausted { .. }));
    }

    #[test]
    fn test_exhaustion_message_carries_counts() {
        let err = IpamError::subnet_exhausted("10.0.0.0/24", 254, 1, 253);
        let msg = err.to_string();
        assert!(msg.contains("254"));
        assert!(msg.contains("1 reserved"));
        assert!(msg.contains("253 in use"));
    }
}
