//! Storage backend setup

use std::sync::Arc;

use anyhow::{Context, Result};
use casefile_core::Config;
use casefile_storage::{create_storage, Storage};

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;

    tracing::info!(
        backend = ?config.storage_backend,
        encrypted = config.encryption_key.is_some(),
        "Storage backend initialized"
    );

    Ok(storage)
}
