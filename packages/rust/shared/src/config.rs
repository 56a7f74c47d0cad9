//! Application configuration for rosterboard.
//!
//! User config lives at `~/.rosterboard/rosterboard.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RosterboardError};
use crate::types::{WorldId, WorldNames};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rosterboard.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rosterboard";

// ---------------------------------------------------------------------------
// Config structs (matching rosterboard.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Webhook settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Roster input settings.
    #[serde(default)]
    pub roster: RosterConfig,

    /// Embed payload budgets.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Snapshot persistence settings.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Optional world display names, keyed by world id.
    #[serde(default)]
    pub worlds: BTreeMap<String, String>,
}

/// `[webhook]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Name of the env var holding the webhook URL (never store the URL
    /// itself — it embeds a secret token).
    #[serde(default = "default_webhook_url_env")]
    pub url_env: String,

    /// Discord server id, used to build message jump links.
    #[serde(default)]
    pub guild_id: String,

    /// Timeout for transport requests in seconds.
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url_env: default_webhook_url_env(),
            guild_id: String::new(),
            timeout_secs: default_webhook_timeout(),
        }
    }
}

fn default_webhook_url_env() -> String {
    "ROSTERBOARD_WEBHOOK_URL".into()
}
fn default_webhook_timeout() -> u64 {
    30
}

/// `[roster]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Input mode: "local" or "remote".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Remote roster export URL (JSON array of raw rows).
    #[serde(default)]
    pub roster_url: Option<String>,

    /// Optional world-assignment overlay URL (`guild_id -> world_id` map)
    /// applied over the roster rows before normalization.
    #[serde(default)]
    pub assignments_url: Option<String>,

    /// Local roster export path, used in "local" mode.
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Timeout for roster fetch requests in seconds.
    #[serde(default = "default_roster_timeout")]
    pub timeout_secs: u64,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            roster_url: None,
            assignments_url: None,
            local_path: default_local_path(),
            timeout_secs: default_roster_timeout(),
        }
    }
}

fn default_mode() -> String {
    "local".into()
}
fn default_local_path() -> String {
    "roster.json".into()
}
fn default_roster_timeout() -> u64 {
    10
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum characters per embed field value.
    #[serde(default = "default_max_field_chars")]
    pub max_field_chars: usize,

    /// Maximum fields per embed payload.
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_field_chars: default_max_field_chars(),
            max_fields: default_max_fields(),
        }
    }
}

fn default_max_field_chars() -> usize {
    1024
}
fn default_max_fields() -> usize {
    25
}

/// `[snapshot]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Path of the persisted snapshot document.
    #[serde(default = "default_snapshot_path")]
    pub path: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
        }
    }
}

fn default_snapshot_path() -> String {
    "~/.rosterboard/snapshot.json".into()
}

// ---------------------------------------------------------------------------
// Runtime views (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime embed budgets — merged from config file + CLI flags.
///
/// Owned by the transport's external limits, so these are configuration
/// constants rather than hardcoded assumptions.
#[derive(Debug, Clone, Copy)]
pub struct EmbedLimits {
    /// Maximum characters per embed field value.
    pub max_field_chars: usize,
    /// Maximum fields per embed payload.
    pub max_fields: usize,
}

impl From<&AppConfig> for EmbedLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_field_chars: config.limits.max_field_chars,
            max_fields: config.limits.max_fields,
        }
    }
}

impl AppConfig {
    /// Resolve the `[worlds]` table into typed display names. Keys that do
    /// not parse as world ids are skipped with a warning.
    pub fn world_names(&self) -> WorldNames {
        let mut names = BTreeMap::new();
        for (key, name) in &self.worlds {
            match key.parse::<WorldId>() {
                Ok(world_id) => {
                    names.insert(world_id, name.clone());
                }
                Err(_) => {
                    tracing::warn!(key, "ignoring non-numeric world id in [worlds]");
                }
            }
        }
        WorldNames::new(names)
    }

    /// Expand a leading `~/` in the snapshot path against the home directory.
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        expand_home(&self.snapshot.path)
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RosterboardError::config("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rosterboard/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RosterboardError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rosterboard/rosterboard.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| RosterboardError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        RosterboardError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RosterboardError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RosterboardError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RosterboardError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read and parse the webhook URL from the configured env var.
pub fn resolve_webhook_url(config: &AppConfig) -> Result<Url> {
    let var_name = &config.webhook.url_env;
    let raw = match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => val,
        _ => {
            return Err(RosterboardError::config(format!(
                "webhook URL not found. Set the {var_name} environment variable to the \
                 channel webhook URL."
            )));
        }
    };

    Url::parse(&raw)
        .map_err(|e| RosterboardError::config(format!("invalid webhook URL in {var_name}: {e}")))
}
