use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use provena_types::ProvenaError;

/// A core error on its way out of a handler.
///
/// Caller mistakes keep their reason string. Upstream and internal failures
/// are logged in full and answered with a generic message.
#[derive(Debug)]
pub struct ApiError(pub ProvenaError);

impl From<ProvenaError> for ApiError {
    fn from(err: ProvenaError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self
            .0
            .http_status()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self.0 {
            ProvenaError::ValidationError(_)
            | ProvenaError::QueryInputError(_)
            | ProvenaError::JobNotFound { .. } => self.0.to_string(),
            ProvenaError::UpstreamService { service, .. } => {
                tracing::error!(error = %self.0, "Upstream service failure");
                format!("Upstream service failure ({service})")
            }
            _ => {
                tracing::error!(error = %self.0, "Internal failure");
                "Internal server error".to_string()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ProvenaError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn statuses_follow_error_taxonomy() {
        assert_eq!(
            status_of(ProvenaError::ValidationError("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ProvenaError::QueryInputError("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ProvenaError::transport("registry", "refused")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ProvenaError::BuildInvariantError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ProvenaError::JobNotFound { id: "j".into() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ProvenaError::Other("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
