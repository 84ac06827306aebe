//! Routing decision for `POST /mcp`.
//!
//! | session header | known | initialize | decision               |
//! |----------------|-------|------------|------------------------|
//! | present        | yes   | any        | `Reuse`                |
//! | absent         | n/a   | yes        | `Initialize`           |
//! | absent         | n/a   | no         | `RejectMissingSession` |
//! | present        | no    | any        | `RejectUnknownSession` |

use std::sync::Arc;

use crate::session::{Session, SessionRegistry};

/// Result of looking up the request's session header.
#[derive(Debug, Clone)]
pub enum SessionLookup {
    /// No session header
    Absent,
    /// Header present but not registered
    Unknown,
    Known(Arc<Session>),
}

impl SessionLookup {
    pub fn resolve(header: Option<&str>, registry: &SessionRegistry) -> Self {
        match header {
            None => Self::Absent,
            Some(id) => registry.lookup(id).map_or(Self::Unknown, Self::Known),
        }
    }
}

/// What to do with a POST.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    /// Forward to the existing session
    Reuse(Arc<Session>),
    /// Start a new session
    Initialize,
    RejectMissingSession,
    RejectUnknownSession,
}

impl RouteDecision {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reuse(_) => "reuse",
            Self::Initialize => "initialize",
            Self::RejectMissingSession => "reject_missing_session",
            Self::RejectUnknownSession => "reject_unknown_session",
        }
    }
}

/// Decide how to route a POST.
pub fn decide(session: SessionLookup, is_initialize: bool) -> RouteDecision {
    match (session, is_initialize) {
        (SessionLookup::Known(session), _) => RouteDecision::Reuse(session),
        (SessionLookup::Unknown, _) => RouteDecision::RejectUnknownSession,
        (SessionLookup::Absent, true) => RouteDecision::Initialize,
        (SessionLookup::Absent, false) => RouteDecision::RejectMissingSession,
    }
}
