//! HTTP API routes.
//!
//! `POST /mcp` carries JSON-RPC messages, `GET /mcp` opens the session's
//! server-to-client event stream, `DELETE /mcp` ends the session.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;

use crate::buffer::RecentBuffer;
use crate::dispatch::{decide, RouteDecision, SessionLookup};
use crate::error::RouteRejection;
use crate::protocol::{error_codes, is_initialize_request, IncomingMessage, JsonRpcResponse};
use crate::server::McpServer;
use crate::session::{Session, SessionRegistry, TransportState, MCP_SESSION_ID_HEADER};
use crate::tools::session_tools;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub buffer: Arc<RecentBuffer>,
}

impl AppState {
    pub fn new(registry: SessionRegistry, buffer: Arc<RecentBuffer>) -> Self {
        Self { registry, buffer }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

// ============ Health Check ============

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sky-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len(),
        "buffered": state.buffer.len(),
    }))
}

// ============ MCP Endpoint ============

/// Session header value. An empty or blank header counts as absent; one that
/// is not valid UTF-8 counts as present but unknown.
fn session_header(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(MCP_SESSION_ID_HEADER)?;
    match value.to_str() {
        Ok(id) if id.trim().is_empty() => None,
        Ok(id) => Some(id),
        Err(_) => Some(""),
    }
}

async fn handle_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let session_id = session_header(&headers);
    let message = serde_json::from_slice::<serde_json::Value>(&body);
    let is_initialize = message.as_ref().is_ok_and(is_initialize_request);

    let decision = decide(
        SessionLookup::resolve(session_id, &state.registry),
        is_initialize,
    );
    tracing::debug!(
        decision = decision.name(),
        session_id = session_id.unwrap_or("-"),
        "Routing MCP request"
    );

    match decision {
        RouteDecision::RejectMissingSession => RouteRejection::MissingSession.into_response(),
        RouteDecision::RejectUnknownSession => RouteRejection::UnknownSession.into_response(),
        RouteDecision::Initialize => match message {
            Ok(message) => initialize_session(&state, message).await,
            Err(e) => RouteRejection::Parse(e.to_string()).into_response(),
        },
        RouteDecision::Reuse(session) => match message {
            Ok(message) => handle_session_message(&session, message).await,
            Err(e) => RouteRejection::Parse(e.to_string()).into_response(),
        },
    }
}

/// Create a session, run the handshake, and register it only if the
/// handshake succeeded.
async fn initialize_session(state: &AppState, message: serde_json::Value) -> Response {
    let request = match IncomingMessage::classify(message) {
        Ok(IncomingMessage::Request(request)) => request,
        Ok(_) => {
            return RouteRejection::InvalidRequest("Initialize must be a request".into())
                .into_response();
        }
        Err(response) => return (StatusCode::BAD_REQUEST, Json(response)).into_response(),
    };

    let session = Arc::new(Session::new(McpServer::new(session_tools(
        state.buffer.clone(),
    ))));
    let response = session.initialize(request).await;

    if response.is_error() || session.state() != TransportState::Active {
        state.registry.remove(session.id());
        session.close();
        return (StatusCode::BAD_REQUEST, Json(response)).into_response();
    }

    let session = match state.registry.create(session.clone()) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Session identifier generator produced a duplicate");
            session.close();
            return RouteRejection::Internal("Session identifier collision".into()).into_response();
        }
    };

    let header_value = match HeaderValue::from_str(session.id()) {
        Ok(value) => value,
        Err(e) => {
            state.registry.close(session.id());
            return RouteRejection::Internal(e.to_string()).into_response();
        }
    };

    tracing::info!(
        session_id = %session.id(),
        sessions = state.registry.len(),
        "MCP session initialized"
    );

    let mut http_response = Json(response).into_response();
    http_response
        .headers_mut()
        .insert(MCP_SESSION_ID_HEADER, header_value);
    http_response
}

async fn handle_session_message(session: &Session, message: serde_json::Value) -> Response {
    match message {
        serde_json::Value::Array(batch) => {
            if batch.is_empty() {
                return RouteRejection::InvalidRequest("Empty batch".into()).into_response();
            }
            let mut responses = Vec::with_capacity(batch.len());
            for item in batch {
                if let Some(response) = session.handle_value(item).await {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        single => match session.handle_value(single).await {
            Some(response) => (status_for(&response), Json(response)).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

/// Envelope-level errors map to 400; everything else rides on 200.
fn status_for(response: &JsonRpcResponse) -> StatusCode {
    match response.error_code() {
        Some(error_codes::PARSE_ERROR | error_codes::INVALID_REQUEST) => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    }
}

async fn handle_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = session_header(&headers).and_then(|id| state.registry.lookup(id)) else {
        return RouteRejection::UnknownSession.into_response();
    };

    let Some(guard) = session.try_open_stream() else {
        return RouteRejection::StreamConflict.into_response();
    };

    session.touch();
    tracing::debug!(session_id = %session.id(), "SSE stream opened");

    let state_rx = session.subscribe_state();
    let closed = async move {
        wait_for_close(state_rx).await;
        drop(guard);
    };

    // No server-initiated messages; the stream carries keep-alives and
    // ends with the session.
    let events = stream::once(closed).filter_map(|()| async { None::<Result<Event, Infallible>> });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn wait_for_close(mut state: watch::Receiver<TransportState>) {
    loop {
        let current = *state.borrow_and_update();
        if current == TransportState::Closed || state.changed().await.is_err() {
            break;
        }
    }
}

async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match session_header(&headers) {
        Some(id) if state.registry.close(id) => StatusCode::OK.into_response(),
        _ => RouteRejection::UnknownSession.into_response(),
    }
}
