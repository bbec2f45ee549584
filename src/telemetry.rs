//! Telemetry & Logging
//!
//! Structured logging for engine transitions and persistence:
//! - Compact human-readable lines or JSON lines on stderr
//! - Filter from `RUST_LOG`, falling back to the configured filter
//! - Control-character escaping for user-supplied ids

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither RUST_LOG nor the config sets one
pub const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();

/// Install the global subscriber. `RUST_LOG` takes precedence over `filter`.
/// Later calls are no-ops.
pub fn init_tracing(filter: &str, json: bool) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| filter.to_string());
    init_tracing_with_filter(&filter, json);
}

/// Install the global subscriber with an explicit filter string
pub fn init_tracing_with_filter(filter: &str, json: bool) {
    INIT.call_once(|| {
        let filter_layer =
            EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        if json {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .try_init();
        } else {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .try_init();
        }
    });
}

/// Escape control characters so user-provided ids cannot forge log lines.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            '\x0c' => out.push_str("\\f"),
            '\x1b' => out.push_str("\\e"),
            '\x00' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}
