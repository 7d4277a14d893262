use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use vlanipam_core::IpamError;

/// HTTP-facing wrapper over the engine's error taxonomy.
#[derive(Debug)]
pub struct ApiError(pub IpamError);

/// Result type for handlers
pub type Result<T> = std::result::Result<T, ApiError>;

impl From<IpamError> for ApiError {
    fn from(err: IpamError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IpamError::InvalidInput { .. } | IpamError::SubnetExhausted { .. } => {
                StatusCode::BAD_REQUEST
            }
            IpamError::CannotReleaseReserved { .. } => StatusCode::FORBIDDEN,
            IpamError::NotAllocated { .. } => StatusCode::NOT_FOUND,
            IpamError::MissingConfig { .. }
            | IpamError::StoreUnavailable { .. }
            | IpamError::CloudUnavailable { .. }
            | IpamError::CredentialsUnavailable { .. }
            | IpamError::RefreshFailed { .. }
            | IpamError::Unhealthy { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({ "error": self.0.to_string() });
        if let IpamError::SubnetExhausted {
            attempted,
            reserved,
            used,
            ..
        } = &self.0
        {
            body["attempted"] = json!(attempted);
            body["reserved"] = json!(reserved);
            body["used"] = json!(used);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: IpamError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(IpamError::invalid_input("bad subnet")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(IpamError::subnet_exhausted("10.0.0.0/30", 2, 1, 1)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(IpamError::cannot_release_reserved("10.0.0.1")),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(IpamError::not_allocated("10.0.0.2")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(IpamError::store_unavailable("no endpoint")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(IpamError::cloud_unavailable("api down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
