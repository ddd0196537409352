//! Application configuration for Leadpipe.
//!
//! User config lives at `~/.leadpipe/leadpipe.toml`.
//! CLI flags override config file values, which override defaults.
//! Credentials are never stored in the file; each provider section names the
//! environment variable that holds its secret.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadpipeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadpipe";

// ---------------------------------------------------------------------------
// Config structs (matching leadpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Per-call timeouts for external capabilities.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Search / content classifier provider.
    #[serde(default)]
    pub search: SearchConfig,

    /// Structured store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Source-control provider.
    #[serde(default)]
    pub source_control: SourceControlConfig,

    /// Hosting provider.
    #[serde(default)]
    pub hosting: HostingConfig,

    /// Notification channel.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// HTTP boundary.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Workflows run concurrently inside one batch window.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause between batch windows, in ms.
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// Pause between provisioning strategies, in ms.
    #[serde(default = "default_strategy_pacing")]
    pub strategy_pacing_ms: u64,

    /// Whether workflows continue into provisioning by default.
    #[serde(default)]
    pub provision: bool,

    /// Number of workflow results retained in memory.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_delay_ms: default_batch_delay(),
            strategy_pacing_ms: default_strategy_pacing(),
            provision: false,
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_concurrency() -> usize {
    3
}
fn default_batch_delay() -> u64 {
    2_000
}
fn default_strategy_pacing() -> u64 {
    1_000
}
fn default_history_capacity() -> usize {
    500
}

/// `[timeouts]` section, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_search_timeout")]
    pub search_secs: u64,
    #[serde(default = "default_store_timeout")]
    pub store_secs: u64,
    #[serde(default = "default_provider_timeout")]
    pub provider_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            search_secs: default_search_timeout(),
            store_secs: default_store_timeout(),
            provider_secs: default_provider_timeout(),
        }
    }
}

fn default_search_timeout() -> u64 {
    20
}
fn default_store_timeout() -> u64 {
    10
}
fn default_provider_timeout() -> u64 {
    30
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Base URL of the search API.
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// Maximum results requested per search.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            base_url: default_search_url(),
            max_results: default_max_results(),
        }
    }
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_search_url() -> String {
    "https://api.tavily.com".into()
}
fn default_max_results() -> u32 {
    5
}

/// `[store]` section. Without a path, persistence always falls back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the libSQL lead database (`~` is expanded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `[source_control]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceControlConfig {
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    #[serde(default = "default_github_url")]
    pub base_url: String,

    /// Account or organization that owns created repositories.
    #[serde(default)]
    pub owner: String,

    /// Existing repository reused when creation fails.
    #[serde(default = "default_template_repo")]
    pub template_repo: String,
}

impl Default for SourceControlConfig {
    fn default() -> Self {
        Self {
            token_env: default_github_token_env(),
            base_url: default_github_url(),
            owner: String::new(),
            template_repo: default_template_repo(),
        }
    }
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_github_url() -> String {
    "https://api.github.com".into()
}
fn default_template_repo() -> String {
    "practice-site-template".into()
}

/// `[hosting]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    #[serde(default = "default_render_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_render_url")]
    pub base_url: String,

    /// Hosting account that owns created services.
    #[serde(default)]
    pub owner_id: String,

    /// Prebuilt image deployed when no repository is available.
    #[serde(default = "default_fallback_image")]
    pub fallback_image: String,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_render_key_env(),
            base_url: default_render_url(),
            owner_id: String::new(),
            fallback_image: default_fallback_image(),
        }
    }
}

fn default_render_key_env() -> String {
    "RENDER_API_KEY".into()
}
fn default_render_url() -> String {
    "https://api.render.com/v1".into()
}
fn default_fallback_image() -> String {
    "ghcr.io/leadpipe/practice-site:latest".into()
}

/// `[notify]` section. Without a chat id, notifications are off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    #[serde(default = "default_telegram_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            base_url: default_telegram_url(),
            chat_id: None,
        }
    }
}

fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".into()
}
fn default_telegram_url() -> String {
    "https://api.telegram.org".into()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration: merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Batch window size.
    pub concurrency: usize,
    /// Pause between batch windows.
    pub batch_delay: Duration,
    /// Pause between provisioning strategies.
    pub strategy_pacing: Duration,
    /// Whether workflows run the provisioning cascade.
    pub provision: bool,
    /// History ring buffer capacity.
    pub history_capacity: usize,
    pub search_timeout: Duration,
    pub store_timeout: Duration,
    pub provider_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.concurrency.max(1),
            batch_delay: Duration::from_millis(config.defaults.batch_delay_ms),
            strategy_pacing: Duration::from_millis(config.defaults.strategy_pacing_ms),
            provision: config.defaults.provision,
            history_capacity: config.defaults.history_capacity.max(1),
            search_timeout: Duration::from_secs(config.timeouts.search_secs),
            store_timeout: Duration::from_secs(config.timeouts.store_secs),
            provider_timeout: Duration::from_secs(config.timeouts.provider_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadpipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadpipe/leadpipe.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LeadpipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadpipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadpipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadpipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadpipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the named env var. Empty values count as missing.
pub fn resolve_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
