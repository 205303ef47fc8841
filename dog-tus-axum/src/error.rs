use axum::{
    response::{IntoResponse, Response},
    Json,
};
use dog_tus::TusError;
use serde_json::json;
use tracing::error;

/// Engine error that escaped the protocol handler
#[derive(Debug)]
pub struct TusAxumError(pub TusError);

impl From<TusError> for TusAxumError {
    fn from(e: TusError) -> Self {
        Self(e)
    }
}

impl IntoResponse for TusAxumError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();

        // Server faults never leak their details
        let message = if status.is_server_error() {
            error!(error = %self.0, "upload request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let name = status.canonical_reason().unwrap_or("Error");
        let body = json!({
            "name": name.replace(' ', ""),
            "message": message,
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
