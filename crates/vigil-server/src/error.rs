use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use vigil_shared::CategoryError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Missing location: lat and lng are required")]
    MissingLocation,

    #[error("Invalid location: lat must be within ±90 and lng within ±180 degrees")]
    InvalidLocation,

    #[error(transparent)]
    InvalidCategory(#[from] CategoryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::MissingFields(_)
            | ServerError::MissingLocation
            | ServerError::InvalidLocation => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": self.to_string() }))
            }
            ServerError::InvalidCategory(e) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": self.to_string(),
                    "validCategories": e.valid_categories(),
                }),
            ),
            ServerError::Store(e) => {
                tracing::error!(error = %e, "Report store invariant violated");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
