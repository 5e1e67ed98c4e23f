//! Startup configuration validation

use anyhow::Result;
use casefile_core::Config;

pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    if !config.scanner_enabled {
        tracing::warn!(
            "Malware scanning is not configured (CLAMD_ENABLED is false); \
             uploaded files will be held in an error state until scanned"
        );
    }

    Ok(())
}
