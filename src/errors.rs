use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error type surfaced by the engine's services.
///
/// Handlers convert these into the store API envelope
/// `{"status": "error", "message": ..., "data": {}}` via the
/// [`IntoResponse`] impl below.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No stock available")]
    OutOfStock,

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) | ServiceError::OutOfStock => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidOperation(_) => StatusCode::CONFLICT,
            ServiceError::PaymentProvider(_) | ServiceError::ExternalService(_) => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::DatabaseError(_) | ServiceError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to the public API. Internal failures are masked.
    fn public_message(&self) -> String {
        match self {
            ServiceError::DatabaseError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "status": "error",
            "message": self.public_message(),
            "data": {},
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = ServiceError::ValidationError("Missing required field: email".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn out_of_stock_keeps_documented_message() {
        let err = ServiceError::OutOfStock;
        assert_eq!(err.to_string(), "No stock available");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_errors_are_masked() {
        let err = ServiceError::DatabaseError(sea_orm::DbErr::Custom("boom".into()));
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
