//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::{DEFAULT_EXCLUDES, DEFAULT_MAX_FILE_SIZE};

/// Main repoquery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Response cache configuration
    pub cache: CacheConfig,

    /// File selection defaults
    pub selection: SelectionConfig,

    /// Output layout
    pub output: OutputConfig,

    /// Concurrency limits
    pub concurrency: ConcurrencyConfig,

    /// Log level override (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key environment variable for the configured
    /// model's provider is set. Call this early in startup to fail fast
    /// with a clear error message.
    pub fn validate(&self) -> Result<()> {
        let (provider, _) = crate::llm::split_model(&self.llm.model);
        let env_var = self.llm.api_key_env(provider);
        if std::env::var(env_var).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                env_var
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .repoquery.yml
        let local_config = PathBuf::from(".repoquery.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/repoquery/repoquery.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("repoquery").join("repoquery.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier, `provider/name` or a bare OpenAI model name
    pub model: String,

    /// System prompt sent with every query
    #[serde(rename = "system-prompt")]
    pub system_prompt: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Largest bundle (in tokens) submitted to a provider
    #[serde(rename = "token-limit")]
    pub token_limit: usize,

    /// Retries after the first attempt on transient failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles per retry
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Environment variable containing the OpenAI API key
    #[serde(rename = "openai-api-key-env")]
    pub openai_api_key_env: String,

    /// Environment variable containing the Anthropic API key
    #[serde(rename = "anthropic-api-key-env")]
    pub anthropic_api_key_env: String,

    #[serde(rename = "openai-base-url")]
    pub openai_base_url: String,

    #[serde(rename = "anthropic-base-url")]
    pub anthropic_base_url: String,
}

impl LlmConfig {
    /// API key environment variable for a provider name
    pub fn api_key_env(&self, provider: &str) -> &str {
        match provider {
            "anthropic" => &self.anthropic_api_key_env,
            _ => &self.openai_api_key_env,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            system_prompt: "You are a helpful AI assistant.".to_string(),
            max_tokens: 4000,
            token_limit: 128_000,
            max_retries: 3,
            initial_backoff_ms: 1000,
            timeout_ms: 120_000,
            openai_api_key_env: "OPENAI_API_KEY".to_string(),
            anthropic_api_key_env: "ANTHROPIC_API_KEY".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, skip the remote probe and cache in-process only
    pub enabled: bool,

    pub host: String,

    pub port: u16,

    pub password: Option<String>,

    /// Entry lifetime in seconds
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,

    /// Probe timeout for the remote backend
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            ttl_secs: crate::cache::DEFAULT_TTL_SECS,
            connect_timeout_ms: 2000,
        }
    }
}

/// File selection defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Include patterns; empty selects everything
    pub include: Vec<String>,

    /// Extra exclude patterns, appended to the built-in set
    pub exclude: Vec<String>,

    /// When false, only explicit exclude patterns apply
    #[serde(rename = "use-default-excludes")]
    pub use_default_excludes: bool,

    /// Directory depth limit below the selection root
    #[serde(rename = "max-depth")]
    pub max_depth: Option<usize>,

    /// Per-file size cap in bytes
    #[serde(rename = "max-file-size")]
    pub max_file_size: u64,

    /// Fail on undecodable files instead of skipping them
    pub strict: bool,
}

impl SelectionConfig {
    /// Exclusion patterns in effect: the built-in set (unless disabled),
    /// then config extras, then `extra` from the command line
    pub fn effective_excludes(&self, extra: &[String]) -> Vec<String> {
        let mut patterns = Vec::new();
        if self.use_default_excludes {
            patterns.extend(DEFAULT_EXCLUDES.iter().map(|s| s.to_string()));
        }
        patterns.extend(self.exclude.iter().cloned());
        patterns.extend(extra.iter().cloned());
        patterns
    }

    /// Include patterns in effect: config entries plus `extra` from the
    /// command line
    pub fn effective_includes(&self, extra: &[String]) -> Vec<String> {
        let mut patterns = self.include.clone();
        patterns.extend(extra.iter().cloned());
        patterns
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            use_default_excludes: true,
            max_depth: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            strict: false,
        }
    }
}

/// Output layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for per-directory results
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

/// Concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum directory analyses in flight at once
    #[serde(rename = "max-parallel-dirs")]
    pub max_parallel_dirs: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_parallel_dirs: 4 }
    }
}
