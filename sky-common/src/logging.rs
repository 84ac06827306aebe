//! Logging utilities for the Sky feed services.
//!
//! # Noise Filtering
//!
//! By default, noisy library modules (hyper, h2, rustls, tungstenite, ...)
//! are set to `warn` level to keep connection-level chatter out of the
//! business logs. `RUST_LOG` overrides everything.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default noisy modules that should be filtered to warn level.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
    "tokio_util",
    "tower_http",
    "tungstenite",
    "tokio_tungstenite",
];

/// Build the filter directives for a base level with noise suppression.
fn filter_directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }
    directives
}

/// Build the default EnvFilter, preferring `RUST_LOG` when it is set.
fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(filter_directives(log_level))
}

/// Initialize logging.
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - "json" for structured JSON, anything else for human-readable
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);
    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Run `f` under a temporary stderr subscriber at `info`, for the work that
/// happens before the configured logger exists.
pub fn with_startup_logging<T>(f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter("info"))
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}
