use crate::directory::DirectoryErrorKind;
use crate::AdRestError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

impl AdRestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdRestError::EmptyResults | AdRestError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
            AdRestError::Directory(e) if e.kind == DirectoryErrorKind::NoSuchObject => {
                StatusCode::NOT_FOUND
            }
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdRestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }

        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
