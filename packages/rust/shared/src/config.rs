//! Application configuration for cultureseg.
//!
//! User config lives at `~/.cultureseg/cultureseg.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmenterError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "cultureseg.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".cultureseg";

// ---------------------------------------------------------------------------
// Config structs (matching cultureseg.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Confidence and attention thresholds.
    #[serde(default)]
    pub quality: QualityConfig,

    /// Local enrichment settings.
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Flat list of known subject names, one per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_titles_path: Option<String>,

    /// Persisted repo database used when `--repo` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,

    /// Directory for exports given as bare file names.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Documents processed at once in batch mode.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            known_titles_path: None,
            repo_path: None,
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_concurrency() -> usize {
    4
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Summaries shorter than this are only trusted at `medium`.
    #[serde(default = "default_min_summary_chars")]
    pub min_summary_chars: usize,

    /// Content shorter than this is flagged for review.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_summary_chars: default_min_summary_chars(),
            min_content_chars: default_min_content_chars(),
        }
    }
}

fn default_min_summary_chars() -> usize {
    100
}
fn default_min_content_chars() -> usize {
    200
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Run the rules enricher without `--enrich` on the command line.
    #[serde(default)]
    pub enabled: bool,

    /// JSON rules file for the local enricher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<String>,

    /// External enrichment worker speaking JSON lines on stdin/stdout.
    /// Takes precedence over `rules_path` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_command: Option<String>,

    /// Arguments passed to `bridge_command`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bridge_args: Vec<String>,

    /// Seconds to wait for each bridge reply before restarting the worker.
    #[serde(default = "default_bridge_timeout_secs")]
    pub bridge_timeout_secs: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rules_path: None,
            bridge_command: None,
            bridge_args: Vec::new(),
            bridge_timeout_secs: default_bridge_timeout_secs(),
        }
    }
}

fn default_bridge_timeout_secs() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.cultureseg/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SegmenterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.cultureseg/cultureseg.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SegmenterError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        SegmenterError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values that would make a run meaningless.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.defaults.concurrency == 0 {
        return Err(SegmenterError::config(
            "defaults.concurrency must be at least 1",
        ));
    }
    if config
        .enrichment
        .bridge_command
        .as_deref()
        .is_some_and(|c| c.trim().is_empty())
    {
        return Err(SegmenterError::config(
            "enrichment.bridge_command must not be empty",
        ));
    }
    if config.enrichment.bridge_timeout_secs == 0 {
        return Err(SegmenterError::config(
            "enrichment.bridge_timeout_secs must be at least 1",
        ));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SegmenterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SegmenterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SegmenterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
