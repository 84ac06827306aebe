//! MCP sessions and the process-wide session registry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::protocol::{methods, IncomingMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::McpServer;

/// Header carrying the session identifier.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Lifecycle of a session's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, handshake not yet answered
    Uninitialized,
    /// Handshake succeeded; accepts requests
    Active,
    Closed,
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session ID already registered: {0}")]
    Duplicate(String),
}

/// One client session.
pub struct Session {
    id: String,
    server: McpServer,
    state: watch::Sender<TransportState>,
    created_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
    stream_open: AtomicBool,
}

impl Session {
    /// Create an uninitialized session with a fresh UUID v4 identifier.
    pub fn new(server: McpServer) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), server)
    }

    pub fn with_id(id: impl Into<String>, server: McpServer) -> Self {
        let now = Utc::now();
        let (state, _) = watch::channel(TransportState::Uninitialized);
        Self {
            id: id.into(),
            server,
            state,
            created_at: now,
            last_activity: Mutex::new(now),
            stream_open: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Watch state changes (used by the SSE stream to end on close).
    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    /// Whether the session has been idle for longer than `timeout`. A session
    /// holding an open stream is never idle.
    pub fn is_idle(&self, timeout: Duration) -> bool {
        if self.has_open_stream() {
            return false;
        }
        let idle = Utc::now().signed_duration_since(self.last_activity());
        idle.to_std().is_ok_and(|idle| idle > timeout)
    }

    /// Answer the initialize request. On success the session becomes
    /// `Active`; on failure it stays `Uninitialized`.
    pub async fn initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        self.touch();
        let response = self.server.handle_request(request).await;
        if !response.is_error() {
            self.state.send_if_modified(|state| {
                if *state == TransportState::Uninitialized {
                    *state = TransportState::Active;
                    true
                } else {
                    false
                }
            });
        }
        response
    }

    /// Handle one decoded JSON value posted to an active session. Returns
    /// `None` for notifications and client responses.
    pub async fn handle_value(&self, value: serde_json::Value) -> Option<JsonRpcResponse> {
        self.touch();
        match IncomingMessage::classify(value) {
            Err(error_response) => Some(error_response),
            Ok(IncomingMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(IncomingMessage::Notification(notification)) => {
                self.server.handle_notification(&notification);
                None
            }
            Ok(IncomingMessage::Response(_)) => {
                tracing::debug!(session_id = %self.id, "Ignoring client response");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match self.state() {
            TransportState::Active if request.method == methods::INITIALIZE => {
                JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_request("Server already initialized"),
                )
            }
            TransportState::Active => self.server.handle_request(request).await,
            TransportState::Uninitialized => JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("Server not initialized"),
            ),
            TransportState::Closed => {
                JsonRpcResponse::error(request.id, JsonRpcError::invalid_request("Session closed"))
            }
        }
    }

    /// Mark the session closed. Returns `false` if it already was.
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == TransportState::Closed {
                false
            } else {
                *state = TransportState::Closed;
                true
            }
        })
    }

    /// Claim the single server-to-client stream slot.
    pub fn try_open_stream(self: &Arc<Self>) -> Option<StreamGuard> {
        self.stream_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StreamGuard {
                session: Arc::clone(self),
            })
    }

    pub fn has_open_stream(&self) -> bool {
        self.stream_open.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .field("stream_open", &self.has_open_stream())
            .finish_non_exhaustive()
    }
}

/// Releases the stream slot when dropped.
#[derive(Debug)]
pub struct StreamGuard {
    session: Arc<Session>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.session.stream_open.store(false, Ordering::Release);
    }
}

/// Session ID → session map shared by all request handlers.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Register a session. Fails if its id is already present.
    pub fn create(&self, session: Arc<Session>) -> Result<Arc<Session>, SessionError> {
        match self.sessions.entry(session.id().to_string()) {
            Entry::Occupied(_) => Err(SessionError::Duplicate(session.id().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Remove a session without closing it. Absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Remove and close a session. Returns whether it was registered.
    pub fn close(&self, id: &str) -> bool {
        match self.remove(id) {
            Some(session) => {
                session.close();
                let age_secs = Utc::now()
                    .signed_duration_since(session.created_at)
                    .num_seconds();
                tracing::info!(session_id = %id, age_secs, "MCP session closed");
                true
            }
            None => false,
        }
    }

    /// Close every session idle for longer than `timeout`.
    pub fn close_idle(&self, timeout: Duration) -> usize {
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(timeout))
            .map(|entry| entry.key().clone())
            .collect();

        idle.iter().filter(|id| self.close(id)).count()
    }

    /// Close every session (shutdown).
    pub fn close_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.close(id)).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RecentBuffer;
    use crate::protocol::error_codes;
    use crate::tools::session_tools;
    use serde_json::json;

    fn new_session() -> Arc<Session> {
        Arc::new(Session::new(McpServer::new(session_tools(Arc::new(
            RecentBuffer::new(5),
        )))))
    }

    fn init_request() -> JsonRpcRequest {
        JsonRpcRequest::new(1i64, "initialize").with_params(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test", "version": "1"}
        }))
    }

    async fn active_session() -> Arc<Session> {
        let session = new_session();
        let resp = session.initialize(init_request()).await;
        assert!(!resp.is_error());
        session
    }

    #[test]
    fn new_sessions_have_distinct_uuid_ids() {
        let a = new_session();
        let b = new_session();
        assert_ne!(a.id(), b.id());
        assert!(uuid::Uuid::parse_str(a.id()).is_ok());
        assert_eq!(a.state(), TransportState::Uninitialized);
    }

    #[tokio::test]
    async fn initialize_activates() {
        let session = active_session().await;
        assert_eq!(session.state(), TransportState::Active);
    }

    #[tokio::test]
    async fn failed_initialize_stays_uninitialized() {
        let session = new_session();
        let resp = session
            .initialize(JsonRpcRequest::new(1i64, "initialize"))
            .await;
        assert!(resp.is_error());
        assert_eq!(session.state(), TransportState::Uninitialized);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let session = active_session().await;
        let resp = session
            .handle_value(serde_json::to_value(init_request()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.error_code(), Some(error_codes::INVALID_REQUEST));
        assert_eq!(resp.error.unwrap().message, "Server already initialized");
    }

    #[tokio::test]
    async fn notifications_and_responses_get_no_reply() {
        let session = active_session().await;
        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(session.handle_value(notification).await.is_none());
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        assert!(session.handle_value(response).await.is_none());
    }

    #[tokio::test]
    async fn close_is_observed_by_watchers() {
        let session = active_session().await;
        let mut rx = session.subscribe_state();
        assert!(session.close());
        assert!(!session.close());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), TransportState::Closed);
    }

    #[test]
    fn only_one_stream_at_a_time() {
        let session = new_session();
        let guard = session.try_open_stream().unwrap();
        assert!(session.has_open_stream());
        assert!(session.try_open_stream().is_none());
        drop(guard);
        assert!(!session.has_open_stream());
        assert!(session.try_open_stream().is_some());
    }

    #[test]
    fn registry_create_lookup_remove() {
        let registry = SessionRegistry::new();
        let session = new_session();
        let id = session.id().to_string();

        registry.create(session).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&id).is_some());

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.lookup(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let registry = SessionRegistry::new();
        let server = || McpServer::new(Vec::new());
        registry
            .create(Arc::new(Session::with_id("same", server())))
            .unwrap();
        let err = registry
            .create(Arc::new(Session::with_id("same", server())))
            .unwrap_err();
        assert!(matches!(err, SessionError::Duplicate(id) if id == "same"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_close_marks_closed() {
        let registry = SessionRegistry::new();
        let session = registry.create(new_session()).unwrap();
        assert!(registry.close(session.id()));
        assert_eq!(session.state(), TransportState::Closed);
        assert!(!registry.close(session.id()));
    }

    #[test]
    fn close_idle_only_closes_stale_sessions() {
        let registry = SessionRegistry::new();
        let stale = registry.create(new_session()).unwrap();
        let fresh = registry.create(new_session()).unwrap();
        *stale.last_activity.lock().unwrap() = Utc::now() - chrono::Duration::seconds(120);

        assert_eq!(registry.close_idle(Duration::from_secs(60)), 1);
        assert!(registry.lookup(stale.id()).is_none());
        assert!(registry.lookup(fresh.id()).is_some());
        assert_eq!(stale.state(), TransportState::Closed);
    }

    #[test]
    fn streaming_session_is_never_idle() {
        let registry = SessionRegistry::new();
        let streaming = registry.create(new_session()).unwrap();
        *streaming.last_activity.lock().unwrap() = Utc::now() - chrono::Duration::seconds(120);

        let guard = streaming.try_open_stream().unwrap();
        assert!(!streaming.is_idle(Duration::from_secs(60)));
        assert_eq!(registry.close_idle(Duration::from_secs(60)), 0);
        assert_eq!(streaming.state(), TransportState::Uninitialized);

        drop(guard);
        assert!(streaming.is_idle(Duration::from_secs(60)));
        assert_eq!(registry.close_idle(Duration::from_secs(60)), 1);
    }

    #[test]
    fn close_all_empties_registry() {
        let registry = SessionRegistry::new();
        let a = registry.create(new_session()).unwrap();
        registry.create(new_session()).unwrap();
        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(a.state(), TransportState::Closed);
    }
}
