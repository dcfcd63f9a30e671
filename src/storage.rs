use anyhow::{Context, Result};

use context_pack_core::store::JsonlStore;

use crate::config::Config;

/// Open the record store at the configured storage root.
pub fn open(config: &Config) -> Result<JsonlStore> {
    let root = config.storage_root();
    tracing::debug!(root = %root.display(), topics = config.inputs.len(), "opening store");
    JsonlStore::open(&root, config.topics())
        .with_context(|| format!("Failed to open storage root {}", root.display()))
}
