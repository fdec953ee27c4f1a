//! Application configuration for the enhancer.
//!
//! User config lives at `~/.enhancer/enhancer.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnhancerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "enhancer.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".enhancer";

// ---------------------------------------------------------------------------
// Config structs (matching enhancer.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub encyclopedia: EncyclopediaConfig,

    #[serde(default)]
    pub video: VideoConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub queue: QueueConfig,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API root.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Model used for both content versions.
    #[serde(default = "default_model")]
    pub model: String,

    /// Word ceiling given to the model for the concise version.
    #[serde(default = "default_concise_max_words")]
    pub concise_max_words: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_llm_api_key_env(),
            model: default_model(),
            concise_max_words: default_concise_max_words(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_llm_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_concise_max_words() -> u32 {
    250
}

/// `[search]` section (web search grounding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,

    /// Env var holding the custom search engine id.
    #[serde(default = "default_search_engine_env")]
    pub engine_id_env: String,

    /// Upper bound on web searches issued per content stage.
    #[serde(default = "default_queries_per_stage")]
    pub queries_per_stage: usize,

    /// Snippets kept from each search.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            api_key_env: default_search_api_key_env(),
            engine_id_env: default_search_engine_env(),
            queries_per_stage: default_queries_per_stage(),
            results_per_query: default_results_per_query(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_search_api_key_env() -> String {
    "GOOGLE_SEARCH_API_KEY".into()
}
fn default_search_engine_env() -> String {
    "GOOGLE_SEARCH_ENGINE_ID".into()
}
fn default_queries_per_stage() -> usize {
    3
}
fn default_results_per_query() -> usize {
    3
}

/// `[encyclopedia]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncyclopediaConfig {
    #[serde(default = "default_wiki_base_url")]
    pub base_url: String,

    /// Cap on lookups per linking call.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Pause between consecutive lookups.
    #[serde(default = "default_lookup_delay")]
    pub lookup_delay_ms: u64,
}

impl Default for EncyclopediaConfig {
    fn default() -> Self {
        Self {
            base_url: default_wiki_base_url(),
            max_keywords: default_max_keywords(),
            lookup_delay_ms: default_lookup_delay(),
        }
    }
}

fn default_wiki_base_url() -> String {
    "https://hu.wikipedia.org".into()
}
fn default_max_keywords() -> usize {
    10
}
fn default_lookup_delay() -> u64 {
    300
}

/// `[video]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_video_base_url")]
    pub base_url: String,

    #[serde(default = "default_video_api_key_env")]
    pub api_key_env: String,

    /// Videos kept per concept.
    #[serde(default = "default_videos_per_concept")]
    pub results_per_concept: usize,

    /// Concepts that get a video search at all.
    #[serde(default = "default_max_concepts")]
    pub max_concepts: usize,

    /// Pause between consecutive searches.
    #[serde(default = "default_video_delay")]
    pub search_delay_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            base_url: default_video_base_url(),
            api_key_env: default_video_api_key_env(),
            results_per_concept: default_videos_per_concept(),
            max_concepts: default_max_concepts(),
            search_delay_ms: default_video_delay(),
        }
    }
}

fn default_video_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".into()
}
fn default_video_api_key_env() -> String {
    "YOUTUBE_API_KEY".into()
}
fn default_videos_per_concept() -> usize {
    2
}
fn default_max_concepts() -> usize {
    8
}
fn default_video_delay() -> u64 {
    500
}

/// Retry settings for one external call type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; grows linearly after that.
    pub base_delay_ms: u64,
    /// Hard per-attempt time budget.
    pub timeout_secs: u64,
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[retry.*]` sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_llm_retry")]
    pub llm: RetrySettings,
    #[serde(default = "default_search_retry")]
    pub search: RetrySettings,
    #[serde(default = "default_encyclopedia_retry")]
    pub encyclopedia: RetrySettings,
    #[serde(default = "default_video_retry")]
    pub video: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            llm: default_llm_retry(),
            search: default_search_retry(),
            encyclopedia: default_encyclopedia_retry(),
            video: default_video_retry(),
        }
    }
}

fn default_llm_retry() -> RetrySettings {
    RetrySettings {
        attempts: 3,
        base_delay_ms: 2_000,
        timeout_secs: 90,
    }
}
fn default_search_retry() -> RetrySettings {
    RetrySettings {
        attempts: 3,
        base_delay_ms: 1_000,
        timeout_secs: 15,
    }
}
fn default_encyclopedia_retry() -> RetrySettings {
    RetrySettings {
        attempts: 3,
        base_delay_ms: 250,
        timeout_secs: 10,
    }
}
fn default_video_retry() -> RetrySettings {
    RetrySettings {
        attempts: 3,
        base_delay_ms: 1_000,
        timeout_secs: 15,
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path; `None` means `~/.enhancer/enhancer.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl StorageConfig {
    /// Resolve the database path, falling back to the config directory.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(config_dir()?.join("enhancer.db")),
        }
    }
}

/// `[queue]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Finished tasks kept for status display.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime tuning for the enhancement pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub concise_max_words: u32,
    pub queries_per_stage: usize,
    pub max_keywords: usize,
    pub lookup_delay: Duration,
    pub videos_per_concept: usize,
    pub max_concepts: usize,
    pub video_delay: Duration,
    pub retry: RetryConfig,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concise_max_words: config.llm.concise_max_words,
            queries_per_stage: config.search.queries_per_stage,
            max_keywords: config.encyclopedia.max_keywords,
            lookup_delay: Duration::from_millis(config.encyclopedia.lookup_delay_ms),
            videos_per_concept: config.video.results_per_concept,
            max_concepts: config.video.max_concepts,
            video_delay: Duration::from_millis(config.video.search_delay_ms),
            retry: config.retry.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.enhancer/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnhancerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.enhancer/enhancer.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| EnhancerError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| EnhancerError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnhancerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnhancerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnhancerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that every API key env var is set and non-empty.
///
/// All missing variables are reported at once.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    let required = [
        &config.llm.api_key_env,
        &config.search.api_key_env,
        &config.search.engine_id_env,
        &config.video.api_key_env,
    ];

    let missing: Vec<&str> = required
        .iter()
        .filter(|name| !matches!(std::env::var(name.as_str()), Ok(v) if !v.is_empty()))
        .map(|name| name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EnhancerError::config(format!(
            "API credentials not found. Set these environment variables: {}",
            missing.join(", ")
        )))
    }
}

/// Read a secret from the env var named in the config.
pub fn read_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(EnhancerError::config(format!(
            "environment variable {var_name} is not set"
        ))),
    }
}
