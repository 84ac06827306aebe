//! Jetstream event types.
//!
//! A commit event looks like:
//!
//! ```json
//! {
//!   "did": "did:plc:eygmaihciaxprqvxpfvl6flk",
//!   "time_us": 1725911162329308,
//!   "kind": "commit",
//!   "commit": {
//!     "rev": "3l3qo2vutsw2b",
//!     "operation": "create",
//!     "collection": "app.bsky.feed.post",
//!     "rkey": "3l3qo2vuowo2b",
//!     "record": { "$type": "app.bsky.feed.post", "text": "hello", "createdAt": "..." },
//!     "cid": "bafyreidwaivazkwu67xztlmuobx35hs2lnfh3kolmgfmucldvhd3sgzcqi"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Top-level event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Commit,
    Identity,
    Account,
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Identity => "identity",
            Self::Account => "account",
            Self::Unknown => "unknown",
        }
    }
}

/// Repository operation carried by a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOperation {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

impl CommitOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unknown => "unknown",
        }
    }
}

/// Commit payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitData {
    #[serde(default)]
    pub rev: String,
    pub operation: CommitOperation,
    pub collection: String,
    #[serde(default)]
    pub rkey: String,
    /// Absent on deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

/// One message from the Jetstream socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JetstreamEvent {
    pub did: String,
    /// Server timestamp in microseconds, usable as a resume cursor
    pub time_us: i64,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitData>,
}

impl JetstreamEvent {
    /// Parse a raw socket text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// True for commits that create a record.
    pub fn is_create(&self) -> bool {
        self.kind == EventKind::Commit
            && self
                .commit
                .as_ref()
                .is_some_and(|c| c.operation == CommitOperation::Create)
    }

    /// Collection NSID of the commit, if this is a commit.
    pub fn collection(&self) -> Option<&str> {
        self.commit.as_ref().map(|c| c.collection.as_str())
    }

    /// The committed record body, if any.
    pub fn record(&self) -> Option<&serde_json::Value> {
        self.commit.as_ref().and_then(|c| c.record.as_ref())
    }
}
