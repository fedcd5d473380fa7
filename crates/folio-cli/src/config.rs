//! Configuration file, data directory and API key resolution.
//!
//! Settings come from an optional TOML file:
//! - `--config <path>` (must exist), or
//! - `<platform config dir>/folio.toml` (optional)
//!
//! ```toml
//! data_dir = "/srv/folio"
//!
//! [engine]
//! chunk_size = 1000
//! chunk_overlap = 200
//! top_k = 3
//! normalization = "min-max"
//!
//! [embedding]
//! model = "sentence-transformers/all-MiniLM-L6-v2"
//!
//! [generation]
//! model = "qwen/qwen3-235b-a22b:free"
//! ```

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use folio_core::config::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, EMBED_BATCH_SIZE,
};
use folio_core::providers::{HUGGINGFACE_BASE_URL, OPENROUTER_BASE_URL};
use folio_core::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "folio.toml";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "FOLIO_DATA_DIR";
pub const HUGGINGFACE_KEY_ENV: &str = "HUGGINGFACE_API_KEY";
pub const OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub base_url: String,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: HUGGINGFACE_BASE_URL.to_string(),
            batch_size: EMBED_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub base_url: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_GENERATION_MODEL.to_string(),
            base_url: OPENROUTER_BASE_URL.to_string(),
        }
    }
}

/// Contents of `folio.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    /// `engine.data_dir` is replaced by the resolved data directory
    pub engine: EngineConfig,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
}

impl CliConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration file")
    }

    /// Loads `explicit` if given, otherwise the default config file if it
    /// exists, otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In {}", path.display()))
    }

    /// Engine configuration rooted at the resolved data directory.
    pub fn engine_config(&self, data_dir: PathBuf) -> EngineConfig {
        EngineConfig {
            data_dir,
            ..self.engine.clone()
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "folio", "Folio")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}

/// Resolves the data directory.
///
/// Order: `--data-dir`, then `$FOLIO_DATA_DIR`, then `data_dir` from the
/// config file, then the platform data directory:
/// - macOS: `~/Library/Application Support/dev.folio.Folio/`
/// - Linux: `~/.local/share/folio/`
/// - Windows: `%APPDATA%\folio\Folio\data\`
pub fn resolve_data_dir(
    flag: Option<&PathBuf>,
    env: Option<String>,
    file: Option<&PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir.clone());
    }
    if let Some(dir) = env.filter(|d| !d.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = file {
        return Ok(dir.clone());
    }
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Reads a required API key from the environment.
pub fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(anyhow!(
            "${} is not set. Export it, or pass --offline to use local providers.",
            var
        )),
    }
}
