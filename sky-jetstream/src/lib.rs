//! Sky Jetstream - Bluesky Jetstream firehose client.
//!
//! Jetstream is a JSON re-encoding of the AT Protocol firehose served over a
//! WebSocket. This crate connects to it, applies the collection/DID filter,
//! and hands every record-creation commit to a caller-supplied callback.
//!
//! ```text
//! Jetstream (wss) ──▶ JetstreamClient ──▶ callback(JetstreamEvent)
//!        ▲                  │
//!        └── reconnect ◀────┘ (exponential backoff, resumes from cursor)
//! ```
//!
//! The client owns its own reconnection policy; callers only see events.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod event;
pub mod subscription;

pub use client::{JetstreamClient, JetstreamOptions};
pub use error::{JetstreamError, JetstreamResult};
pub use event::{CommitData, CommitOperation, EventKind, JetstreamEvent};
pub use subscription::{subscribe_url, SubscriptionFilter};
