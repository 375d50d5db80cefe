//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Install a JSON `tracing` subscriber for the process
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `service.log_level`; an unparseable level falls back to `info`.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(&config.service.log_level))
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "Tracing initialized"
    );

    Ok(())
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
