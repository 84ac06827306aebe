//! Sky MCP - recent Bluesky posts over the Model Context Protocol.
//!
//! A background task subscribes to Jetstream and keeps the most recent
//! posts in a bounded buffer. MCP clients open sessions over Streamable
//! HTTP (`/mcp`) and read the buffer through the `getMessages` tool.
//!
//! ```text
//! Jetstream ──▶ IngestAdapter ──▶ RecentBuffer ◀── GetMessagesTool
//!                                                        ▲
//! client ──▶ /mcp ──▶ decide() ──▶ SessionRegistry ──▶ Session ──▶ McpServer
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod buffer;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod protocol;
pub mod routes;
pub mod server;
pub mod session;
pub mod tools;

pub use buffer::{EventEntry, RecentBuffer};
pub use dispatch::{decide, RouteDecision, SessionLookup};
pub use error::RouteRejection;
pub use ingest::{IngestAdapter, IngestError};
pub use routes::{build_router, AppState};
pub use server::McpServer;
pub use session::{Session, SessionError, SessionRegistry, TransportState, MCP_SESSION_ID_HEADER};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderName;
use sky_common::config::{Config, JetstreamConfig};
use sky_jetstream::{JetstreamClient, JetstreamOptions, SubscriptionFilter};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Upper bound on how often idle sessions are checked.
const MAX_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Build the full HTTP stack: routes, CORS, and body limit.
pub fn build_app(state: AppState, max_body_bytes: usize) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(MCP_SESSION_ID_HEADER)]);

    build_router(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
}

/// Jetstream client options from configuration.
pub fn jetstream_options(config: &JetstreamConfig) -> JetstreamOptions {
    JetstreamOptions {
        endpoint: config.endpoint.clone(),
        filter: SubscriptionFilter::new(
            config.wanted_collections.clone(),
            config.wanted_dids.clone(),
        ),
        initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        max_backoff: Duration::from_millis(config.max_backoff_ms),
        max_retries: None,
    }
}

/// Spawn the Jetstream ingestion task.
pub fn spawn_ingester(
    options: JetstreamOptions,
    adapter: IngestAdapter,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = JetstreamClient::new(options);
        match client.run(move |event| adapter.on_event(event), shutdown).await {
            Ok(()) => tracing::info!("Jetstream ingestion stopped"),
            Err(e) => tracing::error!(error = %e, "Jetstream ingestion failed"),
        }
    })
}

/// How often the reaper checks for sessions idle past `timeout`.
pub fn reaper_interval(timeout: Duration) -> Duration {
    std::cmp::min(timeout, MAX_REAPER_INTERVAL)
}

/// Spawn the idle-session reaper.
pub fn spawn_reaper(
    registry: SessionRegistry,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(reaper_interval(timeout));
        // First tick fires immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let closed = registry.close_idle(timeout);
                    if closed > 0 {
                        tracing::info!(closed, remaining = registry.len(), "Closed idle MCP sessions");
                    }
                }
                changed = shutdown.changed() => {
                    let stopping = changed.is_err() || *shutdown.borrow();
                    if stopping {
                        break;
                    }
                }
            }
        }
    })
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down..."),
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}

/// Start the MCP server and the Jetstream ingester.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = config.listen_address()?;

    let buffer = Arc::new(RecentBuffer::new(config.buffer.capacity));
    let registry = SessionRegistry::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingester = spawn_ingester(
        jetstream_options(&config.jetstream),
        IngestAdapter::new(buffer.clone(), config.observability.silent),
        shutdown_rx.clone(),
    );

    let reaper = config
        .server
        .session_idle_timeout_secs
        .map(|secs| spawn_reaper(registry.clone(), Duration::from_secs(secs), shutdown_rx));

    let app = build_app(
        AppState::new(registry.clone(), buffer.clone()),
        config.server.max_body_bytes,
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        capacity = buffer.capacity(),
        collections = ?config.jetstream.wanted_collections,
        "MCP server listening on http://{}/mcp",
        addr
    );

    // Sessions must close before graceful shutdown waits on open streams
    let shutdown_registry = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_tx.send_replace(true);
            let closed = shutdown_registry.close_all();
            tracing::info!(closed, "Closed MCP sessions");
        })
        .await
        .context("HTTP server error")?;

    if let Err(e) = ingester.await {
        tracing::warn!(error = %e, "Ingestion task ended abnormally");
    }
    if let Some(reaper) = reaper {
        if let Err(e) = reaper.await {
            tracing::warn!(error = %e, "Reaper task ended abnormally");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaper_interval_is_capped() {
        assert_eq!(reaper_interval(Duration::from_secs(5)), Duration::from_secs(5));
        assert_eq!(reaper_interval(Duration::from_secs(3600)), MAX_REAPER_INTERVAL);
    }

    #[test]
    fn jetstream_options_from_config() {
        let config = Config::default();
        let options = jetstream_options(&config.jetstream);
        assert_eq!(options.endpoint, config.jetstream.endpoint);
        assert_eq!(
            options.filter.wanted_collections,
            vec!["app.bsky.feed.post".to_string()]
        );
        assert!(options.filter.wanted_dids.is_empty());
        assert_eq!(options.initial_backoff, Duration::from_millis(1000));
        assert_eq!(options.max_backoff, Duration::from_millis(30000));
        assert_eq!(options.max_retries, None);
    }

    #[tokio::test]
    async fn reaper_closes_idle_sessions_and_stops() {
        let registry = SessionRegistry::new();
        let session = registry
            .create(Arc::new(Session::new(McpServer::new(Vec::new()))))
            .unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = spawn_reaper(registry.clone(), Duration::from_millis(20), rx);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(registry.is_empty());
        assert_eq!(session.state(), TransportState::Closed);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn ingester_stops_on_shutdown() {
        let options = JetstreamOptions {
            // Nothing listens here; the client keeps retrying until shutdown
            endpoint: "ws://127.0.0.1:9/subscribe".into(),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
            ..Default::default()
        };
        let adapter = IngestAdapter::new(Arc::new(RecentBuffer::new(5)), true);
        let (tx, rx) = watch::channel(false);

        let handle = spawn_ingester(options, adapter, rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
