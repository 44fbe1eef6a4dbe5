use crate::config::TelemetryConfig;
use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout carries the protocol.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| anyhow!("invalid log level/filter '{}': {}", config.log_level, e))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("telemetry error: {e}"))
}
