use std::str::FromStr;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Output shape of the log stream, selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl LogFormat {
    fn from_env() -> (Self, Option<String>) {
        match std::env::var("LOG_FORMAT") {
            Ok(raw) => match raw.parse() {
                Ok(format) => (format, None),
                Err(e) => (Self::default(), Some(e)),
            },
            Err(_) => (Self::default(), None),
        }
    }
}

/// Install the global subscriber for `service`.
///
/// Filtering follows `RUST_LOG` and falls back to `info`. A second call (as
/// happens when several tests boot a server in one process) keeps the first
/// subscriber.
pub fn init_tracing(service: &'static str) {
    let (format, format_error) = LogFormat::from_env();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init(),
    };
    if installed.is_err() {
        return;
    }

    if let Some(e) = format_error {
        tracing::warn!("Ignoring LOG_FORMAT: {}; using text", e);
    }
    tracing::info!(service, ?format, version = env!("CARGO_PKG_VERSION"), "Logging initialised");
}
