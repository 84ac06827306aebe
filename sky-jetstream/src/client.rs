//! Jetstream WebSocket client with automatic reconnection.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::{JetstreamError, JetstreamResult};
use crate::event::JetstreamEvent;
use crate::subscription::{subscribe_url, SubscriptionFilter};

/// Default public Jetstream instance.
pub const DEFAULT_ENDPOINT: &str = "wss://jetstream2.us-east.bsky.network/subscribe";

/// Connection options for [`JetstreamClient`].
#[derive(Debug, Clone)]
pub struct JetstreamOptions {
    /// Subscribe endpoint (ws:// or wss://)
    pub endpoint: String,
    /// Collections and DIDs to subscribe to
    pub filter: SubscriptionFilter,
    /// Delay before the first reconnection attempt
    pub initial_backoff: Duration,
    /// Upper bound for the reconnection delay
    pub max_backoff: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_retries: Option<u32>,
}

impl Default for JetstreamOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            filter: SubscriptionFilter::new(vec!["app.bsky.feed.post".to_string()], vec![]),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// How a single connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Shutdown,
    Closed,
}

/// Jetstream subscriber.
///
/// Delivers record-creation commits that pass the filter to the callback,
/// reconnecting with exponential backoff whenever the socket drops. Each
/// reconnect resumes from the `time_us` of the last message seen.
pub struct JetstreamClient {
    options: JetstreamOptions,
    /// Last seen `time_us`; 0 until the first message arrives
    cursor: AtomicI64,
    received: AtomicU64,
}

impl JetstreamClient {
    pub fn new(options: JetstreamOptions) -> Self {
        Self {
            options,
            cursor: AtomicI64::new(0),
            received: AtomicU64::new(0),
        }
    }

    /// Resume cursor for the next connection, if any message has been seen.
    pub fn cursor(&self) -> Option<i64> {
        match self.cursor.load(Ordering::Relaxed) {
            0 => None,
            c => Some(c),
        }
    }

    /// Total socket text frames received across all connections.
    pub fn messages_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Subscribe and deliver events until `shutdown` flips to `true` (or its
    /// sender is dropped), or until `max_retries` consecutive attempts fail.
    pub async fn run<F>(
        &self,
        callback: F,
        mut shutdown: watch::Receiver<bool>,
    ) -> JetstreamResult<()>
    where
        F: Fn(JetstreamEvent) + Send + Sync,
    {
        // Fail fast on a bad endpoint instead of retrying forever
        subscribe_url(&self.options.endpoint, &self.options.filter, None)?;

        let mut retries: u32 = 0;
        let mut backoff = self.options.initial_backoff;

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                return Ok(());
            }

            let url = subscribe_url(&self.options.endpoint, &self.options.filter, self.cursor())?;
            let received_before = self.messages_received();

            let outcome = self.connect_and_stream(&url, &callback, &mut shutdown).await;

            if self.messages_received() > received_before {
                retries = 0;
                backoff = self.options.initial_backoff;
            }

            match outcome {
                Ok(StreamEnd::Shutdown) => {
                    tracing::info!("Jetstream subscription stopped");
                    return Ok(());
                }
                Ok(StreamEnd::Closed) => {
                    tracing::warn!("Jetstream connection closed by server");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Jetstream connection error");
                }
            }

            retries += 1;
            if let Some(max) = self.options.max_retries {
                if retries > max {
                    tracing::error!(retries = retries, "Max Jetstream reconnection attempts exceeded");
                    return Err(JetstreamError::RetriesExhausted(max));
                }
            }

            tracing::warn!(
                retry = retries,
                backoff_ms = backoff.as_millis() as u64,
                cursor = ?self.cursor(),
                "Reconnecting to Jetstream..."
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                changed = shutdown.changed() => {
                    let stopping = changed.is_err() || *shutdown.borrow();
                    if stopping {
                        return Ok(());
                    }
                }
            }

            backoff = next_backoff(backoff, self.options.max_backoff);
        }
    }

    async fn connect_and_stream<F>(
        &self,
        url: &Url,
        callback: &F,
        shutdown: &mut watch::Receiver<bool>,
    ) -> JetstreamResult<StreamEnd>
    where
        F: Fn(JetstreamEvent) + Send + Sync,
    {
        tracing::info!(url = %url, "Jetstream: connecting...");

        let (mut ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| JetstreamError::Connection(format!("WebSocket connection failed: {e}")))?;

        tracing::info!("Jetstream: connected");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    let stopping = changed.is_err() || *shutdown.borrow();
                    if stopping {
                        if let Err(e) = ws_stream.close(None).await {
                            tracing::debug!(error = %e, "Jetstream close handshake failed");
                        }
                        return Ok(StreamEnd::Shutdown);
                    }
                }
                msg = ws_stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, callback);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(frame = ?frame, "Jetstream sent close frame");
                            return Ok(StreamEnd::Closed);
                        }
                        None => return Ok(StreamEnd::Closed),
                        // Pongs are queued by tungstenite and flushed on the next read
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(JetstreamError::Connection(format!("WebSocket error: {e}")));
                        }
                    }
                }
            }
        }
    }

    /// Parse one text frame, advance the cursor, and deliver it if wanted.
    /// Returns whether the callback was invoked.
    fn handle_text<F>(&self, text: &str, callback: &F) -> bool
    where
        F: Fn(JetstreamEvent),
    {
        self.received.fetch_add(1, Ordering::Relaxed);

        let event = match JetstreamEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed Jetstream message");
                return false;
            }
        };

        if event.time_us > 0 {
            self.cursor.store(event.time_us, Ordering::Relaxed);
        }

        if !event.is_create() || !self.options.filter.matches(&event) {
            return false;
        }

        callback(event);
        true
    }
}

/// Double the delay, capped at `max`.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    std::cmp::min(current.saturating_mul(2), max)
}
