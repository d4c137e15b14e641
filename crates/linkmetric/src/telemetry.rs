//! Tracing bootstrap for the analysis service.
//!
//! Verbosity comes from `RUST_LOG` when set, otherwise from the configured
//! default level. Either source must parse as filter directives; a typo in
//! `RUST_LOG` aborts startup instead of silently logging at the wrong level.
//! Output is compact single-line text without ANSI color.

use crate::config::TelemetryConfig;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("unparseable log directive '{directive}'")]
    Directive {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("global subscriber rejected: {0}")]
    Install(Box<dyn std::error::Error + Send + Sync>),
}

/// Install the process-wide tracing subscriber. Call once at startup.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = resolve_filter(std::env::var("RUST_LOG").ok(), &config.log_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(TelemetryError::Install)
}

fn resolve_filter(
    env_directives: Option<String>,
    fallback: &str,
) -> Result<EnvFilter, TelemetryError> {
    let directive = env_directives.unwrap_or_else(|| fallback.to_string());
    EnvFilter::try_new(&directive).map_err(|source| TelemetryError::Directive {
        directive,
        source,
    })
}
