//! Logging initialization for vulnpost-daemon.
//!
//! The `[general]` section of `VulnpostConfig` selects the level and the
//! output format. `RUST_LOG` wins over the configured level when set.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use vulnpost_core::config::GeneralConfig;

/// Log output format selected by `[general].log_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    /// Machine-parseable JSON lines (production)
    Json,
    /// Human-readable colored output (development)
    Pretty,
}

impl LogFormat {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            )),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format = LogFormat::parse(&config.log_format)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
