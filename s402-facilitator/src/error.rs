//! Error responses for the facilitator service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use s402::error::PaymentError;

/// Errors surfaced by the HTTP handlers.
///
/// Protocol rejections (`isValid=false`, `success=false`) are not errors;
/// they travel as 200 responses. These variants cover transport and server
/// failures only.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    /// Verify/settle failed below the protocol level.
    #[error("payment processing failed: {0}")]
    Payment(#[from] PaymentError),

    /// The discovery store failed.
    #[error("store failure: {0}")]
    Store(#[from] s402::store::StoreError),

    /// The request referenced a resource that does not exist.
    #[error("resource not found")]
    NotFound,
}

impl IntoResponse for FacilitatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Payment(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Underlying causes are logged where they occur; the response body
        // stays generic.
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
