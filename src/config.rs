//! TOML configuration.
//!
//! ```toml
//! [storage]
//! root = "database"
//!
//! [ingest]
//! batch_size = 64
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [[inputs]]
//! topic = "coding"
//! paths = ["docs/coding/**/*.md"]
//! rank = 10
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    /// Directory of the config file; set by [`load_config`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("database")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Remote host for `openai`/`ollama`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// One named group of input documents.
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub topic: String,
    pub paths: Vec<String>,
    #[serde(default)]
    pub rank: Option<f64>,
}

impl Config {
    /// Storage root, resolved against the config directory.
    pub fn storage_root(&self) -> PathBuf {
        self.base_dir.join(&self.storage.root)
    }

    /// Configured topic names, in file order.
    pub fn topics(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.topic.clone()).collect()
    }

    pub fn input(&self, topic: &str) -> Option<&InputConfig> {
        self.inputs.iter().find(|i| i.topic == topic)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.batch_size == 0 {
        bail!("ingest.batch_size must be > 0");
    }

    let mut seen = HashSet::new();
    for input in &config.inputs {
        if input.topic.trim().is_empty() {
            bail!("inputs.topic must not be empty");
        }
        if input.topic.contains(':') || input.topic.contains('/') {
            bail!(
                "inputs.topic '{}' must not contain ':' or '/'",
                input.topic
            );
        }
        if !seen.insert(input.topic.as_str()) {
            bail!("Duplicate topic in inputs: '{}'", input.topic);
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "hash" | "openai" | "ollama" => {
            if config.embedding.dims.unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
