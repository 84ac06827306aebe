//! Jetstream ingestion: turns firehose events into buffer entries.

use std::sync::Arc;

use sky_jetstream::{EventKind, JetstreamEvent};

use crate::buffer::{EventEntry, RecentBuffer};

/// Why an event could not become a buffer entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("{kind} event from {did} is not a commit")]
    NotACommit { did: String, kind: &'static str },

    #[error("{operation} commit from {did} in {collection} does not create a record")]
    NotACreate {
        did: String,
        collection: String,
        operation: &'static str,
    },

    #[error("commit from {did} in {collection} has no record")]
    MissingRecord { did: String, collection: String },

    #[error("record from {did} in {collection} has no text")]
    MissingText { did: String, collection: String },
}

/// Feed callback target. Owns a handle to the shared buffer.
#[derive(Debug, Clone)]
pub struct IngestAdapter {
    buffer: Arc<RecentBuffer>,
    silent: bool,
}

impl IngestAdapter {
    pub fn new(buffer: Arc<RecentBuffer>, silent: bool) -> Self {
        Self { buffer, silent }
    }

    /// Normalize an event and push it into the buffer.
    pub fn ingest(&self, event: &JetstreamEvent) -> Result<EventEntry, IngestError> {
        let entry = extract_entry(event)?;
        self.buffer.push(entry.clone());
        Ok(entry)
    }

    /// Callback handed to the Jetstream client. Never fails.
    pub fn on_event(&self, event: JetstreamEvent) {
        match self.ingest(&event) {
            Ok(entry) => {
                if !self.silent {
                    tracing::info!("{}: {}", entry.actor_id, entry.text);
                }
            }
            Err(e @ IngestError::NotACommit { .. }) => {
                tracing::debug!(did = %event.did, "Dropped event: {e}");
            }
            Err(e) => {
                tracing::warn!(did = %event.did, "Dropped malformed event: {e}");
            }
        }
    }
}

fn extract_entry(event: &JetstreamEvent) -> Result<EventEntry, IngestError> {
    let commit = match (&event.kind, &event.commit) {
        (EventKind::Commit, Some(commit)) => commit,
        _ => {
            return Err(IngestError::NotACommit {
                did: event.did.clone(),
                kind: event.kind.as_str(),
            })
        }
    };

    if !event.is_create() {
        return Err(IngestError::NotACreate {
            did: event.did.clone(),
            collection: commit.collection.clone(),
            operation: commit.operation.as_str(),
        });
    }

    let record = commit.record.as_ref().ok_or_else(|| IngestError::MissingRecord {
        did: event.did.clone(),
        collection: commit.collection.clone(),
    })?;

    let text = record
        .get("text")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| IngestError::MissingText {
            did: event.did.clone(),
            collection: commit.collection.clone(),
        })?;

    Ok(EventEntry::new(event.did.clone(), text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> JetstreamEvent {
        JetstreamEvent::parse(json).unwrap()
    }

    fn post(did: &str, text: &str) -> JetstreamEvent {
        event(&format!(
            r#"{{"did":"{did}","time_us":1,"kind":"commit","commit":{{"rev":"r","operation":"create",
                "collection":"app.bsky.feed.post","rkey":"k","record":{{"text":"{text}"}}}}}}"#
        ))
    }

    fn adapter(capacity: usize) -> (IngestAdapter, Arc<RecentBuffer>) {
        let buffer = Arc::new(RecentBuffer::new(capacity));
        (IngestAdapter::new(buffer.clone(), true), buffer)
    }

    #[test]
    fn ingested_post_appears_in_snapshot() {
        let (adapter, buffer) = adapter(10);
        let entry = adapter.ingest(&post("did:plc:alice", "hello")).unwrap();
        assert_eq!(entry.actor_id, "did:plc:alice");
        assert_eq!(entry.text, "hello");
        assert_eq!(buffer.snapshot(), vec![entry]);
    }

    #[test]
    fn capacity_bound_holds_through_adapter() {
        let (adapter, buffer) = adapter(2);
        for text in ["one", "two", "three"] {
            adapter.on_event(post("did:plc:a", text));
        }
        let texts: Vec<_> = buffer.snapshot().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["three", "two"]);
    }

    #[test]
    fn identity_event_is_not_a_commit() {
        let (adapter, buffer) = adapter(10);
        let err = adapter
            .ingest(&event(r#"{"did":"did:plc:a","time_us":1,"kind":"identity"}"#))
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::NotACommit {
                did: "did:plc:a".into(),
                kind: "identity"
            }
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn delete_is_rejected() {
        let (adapter, _) = adapter(10);
        let err = adapter
            .ingest(&event(
                r#"{"did":"did:plc:a","time_us":1,"kind":"commit",
                    "commit":{"operation":"delete","collection":"app.bsky.feed.post"}}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, IngestError::NotACreate { operation: "delete", .. }));
    }

    #[test]
    fn missing_record_and_text() {
        let (adapter, buffer) = adapter(10);
        let no_record = event(
            r#"{"did":"did:plc:a","time_us":1,"kind":"commit",
                "commit":{"operation":"create","collection":"app.bsky.feed.post"}}"#,
        );
        assert!(matches!(
            adapter.ingest(&no_record),
            Err(IngestError::MissingRecord { .. })
        ));

        let no_text = event(
            r#"{"did":"did:plc:a","time_us":1,"kind":"commit",
                "commit":{"operation":"create","collection":"app.bsky.feed.like","record":{"subject":{}}}}"#,
        );
        assert!(matches!(
            adapter.ingest(&no_text),
            Err(IngestError::MissingText { .. })
        ));

        let number_text = event(
            r#"{"did":"did:plc:a","time_us":1,"kind":"commit",
                "commit":{"operation":"create","collection":"app.bsky.feed.post","record":{"text":42}}}"#,
        );
        assert!(adapter.ingest(&number_text).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn malformed_events_do_not_stop_ingestion() {
        let (adapter, buffer) = adapter(10);
        adapter.on_event(event(r#"{"did":"did:plc:a","time_us":1,"kind":"account"}"#));
        adapter.on_event(post("did:plc:b", "still here"));
        assert_eq!(buffer.len(), 1);
    }
}
