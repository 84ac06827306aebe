//! HTTP-level rejections for the MCP endpoint.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::protocol::{JsonRpcError, JsonRpcResponse};

/// Requests refused before reaching a session.
#[derive(Debug, thiserror::Error)]
pub enum RouteRejection {
    #[error("Bad Request: No valid session ID provided")]
    MissingSession,

    #[error("Invalid or missing session ID")]
    UnknownSession,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: Only one SSE stream is allowed per session")]
    StreamConflict,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RouteRejection {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            RouteRejection::UnknownSession => {
                return (
                    StatusCode::BAD_REQUEST,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    self.to_string(),
                )
                    .into_response();
            }
            RouteRejection::MissingSession => (
                StatusCode::BAD_REQUEST,
                JsonRpcError::server_error(self.to_string()),
            ),
            RouteRejection::Parse(_) => (
                StatusCode::BAD_REQUEST,
                JsonRpcError::parse_error(self.to_string()),
            ),
            RouteRejection::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request(self.to_string()),
            ),
            RouteRejection::StreamConflict => (
                StatusCode::CONFLICT,
                JsonRpcError::server_error(self.to_string()),
            ),
            RouteRejection::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                JsonRpcError::internal_error(self.to_string()),
            ),
        };

        (status, Json(JsonRpcResponse::error(None, error))).into_response()
    }
}
