/*!
 * Configuration for the translation core.
 *
 * One JSON file holds the provider list and priority order, retry and timeout
 * settings, pivot routing knobs, cache tiers and tone data. Missing fields take
 * their defaults, and `validate` runs on every load.
 */

use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use url::Url;

/// Top-level configuration file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Cascade, concurrency and provider settings
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Pivot routing settings
    #[serde(default)]
    pub pivot: PivotConfig,

    /// Cache tiers and the SQLite location
    #[serde(default)]
    pub cache: CacheConfig,

    /// Tone tables
    #[serde(default)]
    pub tonal: TonalConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider back-end
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions
    OpenAI,
    /// LibreTranslate `/translate`
    LibreTranslate,
    /// Local Ollama server
    #[default]
    Ollama,
    /// Deterministic echo, no network
    Mock,
}

impl ProviderKind {
    /// Name for logs and the CLI
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::LibreTranslate => "LibreTranslate",
            Self::Ollama => "Ollama",
            Self::Mock => "Mock",
        }
    }

    /// Identifier as written in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::LibreTranslate => "libretranslate",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "libretranslate" => Ok(Self::LibreTranslate),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider kind: {}", s)),
        }
    }
}

/// One entry of the provider cascade
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Identifier referenced by `provider_priority_order`
    pub id: String,

    /// Back-end type
    #[serde(default)]
    pub kind: ProviderKind,

    /// Model name, where the back-end has one
    #[serde(default = "String::new")]
    pub model: String,

    /// Base URL; empty means the back-end's default
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// API key inline
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Environment variable to read the API key from when `api_key` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Create a provider config with defaults for everything but id and kind
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            model: String::new(),
            endpoint: String::new(),
            api_key: String::new(),
            api_key_env: None,
            timeout_secs: default_provider_timeout_secs(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Inline key, else the named environment variable, else empty
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }
}

/// Cascade and concurrency settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslationConfig {
    /// Segments translated at once
    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    /// Attempts per provider before the cascade moves on
    #[serde(default = "default_max_retries_per_provider")]
    pub max_retries_per_provider: u32,

    /// First retry delay
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Retry delay ceiling
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Limit for one provider call
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Limit for one segment, all hops and retries included
    #[serde(default = "default_segment_timeout_secs")]
    pub segment_timeout_secs: u64,

    /// Provider ids in cascade order
    #[serde(default = "default_provider_priority_order")]
    pub provider_priority_order: Vec<String>,

    /// Every configured provider
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl TranslationConfig {
    /// Look up a provider by id
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_segments: default_max_concurrent_segments(),
            max_retries_per_provider: default_max_retries_per_provider(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            segment_timeout_secs: default_segment_timeout_secs(),
            provider_priority_order: default_provider_priority_order(),
            providers: default_providers(),
        }
    }
}

/// Pivot routing settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PivotConfig {
    /// Score subtracted per intermediate language
    #[serde(default = "default_pivot_penalty")]
    pub pivot_penalty: f64,

    /// Paths scoring below this are not routed
    #[serde(default = "default_min_viable_score")]
    pub min_viable_score: f64,

    /// Intermediate languages allowed on one path (at most 2)
    #[serde(default = "default_max_pivots")]
    pub max_pivots: usize,

    /// JSON quality matrix replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_matrix_path: Option<PathBuf>,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            pivot_penalty: default_pivot_penalty(),
            min_viable_score: default_min_viable_score(),
            max_pivots: default_max_pivots(),
            quality_matrix_path: None,
        }
    }
}

/// Cache settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CacheConfig {
    /// Whether to cache at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lifetime of a cached translation
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Entries held by the in-memory tier
    #[serde(default = "default_fast_tier_capacity")]
    pub fast_tier_capacity: usize,

    /// Whether to keep a SQLite tier behind the in-memory one
    #[serde(default = "default_true")]
    pub durable: bool,

    /// SQLite file shared by the cache and the glossary; defaults to the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            fast_tier_capacity: default_fast_tier_capacity(),
            durable: default_true(),
            database_path: None,
        }
    }
}

/// Tone table settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TonalConfig {
    /// Directory of `<lang>.json` tone tables loaded over the built-in ones.
    /// Spelling tables in its `orthography/` subdirectory are loaded the same way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Log level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_max_concurrent_segments() -> usize {
    4
}

fn default_max_retries_per_provider() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8000
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_segment_timeout_secs() -> u64 {
    120
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_provider_priority_order() -> Vec<String> {
    vec!["ollama".to_string(), "libretranslate".to_string()]
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("ollama", ProviderKind::Ollama)
            .with_endpoint("http://localhost:11434")
            .with_model("llama3.2:3b"),
        ProviderConfig::new("libretranslate", ProviderKind::LibreTranslate).with_endpoint("http://localhost:5000"),
    ]
}

fn default_pivot_penalty() -> f64 {
    0.05
}

fn default_min_viable_score() -> f64 {
    0.2
}

fn default_max_pivots() -> usize {
    2
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_fast_tier_capacity() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

/// Parse an endpoint, assuming plain http when no scheme is given
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };
    if url.host_str().is_none() {
        return Err(anyhow!("Invalid host in endpoint: {}", endpoint));
    }
    Ok(url)
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let t = &self.translation;
        if t.max_concurrent_segments == 0 {
            return Err(anyhow!("max_concurrent_segments must be at least 1"));
        }
        if t.backoff_base_ms > t.backoff_max_ms {
            return Err(anyhow!(
                "backoff_base_ms ({}) must not exceed backoff_max_ms ({})",
                t.backoff_base_ms,
                t.backoff_max_ms
            ));
        }

        let mut ids = HashSet::new();
        for provider in &t.providers {
            if provider.id.trim().is_empty() {
                return Err(anyhow!("Provider ids must not be empty"));
            }
            if !ids.insert(provider.id.as_str()) {
                return Err(anyhow!("Duplicate provider id: {}", provider.id));
            }
            if !provider.endpoint.is_empty() {
                parse_endpoint(&provider.endpoint)
                    .with_context(|| format!("Invalid endpoint for provider '{}'", provider.id))?;
            }
        }

        if t.provider_priority_order.is_empty() {
            return Err(anyhow!("provider_priority_order must name at least one provider"));
        }
        let mut ordered = HashSet::new();
        for id in &t.provider_priority_order {
            if !ids.contains(id.as_str()) {
                return Err(anyhow!("Unknown provider id in provider_priority_order: {}", id));
            }
            if !ordered.insert(id.as_str()) {
                return Err(anyhow!("Duplicate provider id in provider_priority_order: {}", id));
            }
        }

        let p = &self.pivot;
        if !(0.0..=1.0).contains(&p.pivot_penalty) {
            return Err(anyhow!("pivot_penalty must be within [0, 1], got {}", p.pivot_penalty));
        }
        if !(0.0..=1.0).contains(&p.min_viable_score) {
            return Err(anyhow!("min_viable_score must be within [0, 1], got {}", p.min_viable_score));
        }
        if p.max_pivots > 2 {
            return Err(anyhow!("max_pivots must be 0, 1 or 2, got {}", p.max_pivots));
        }

        Ok(())
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Write this configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Load `path`, or write and return the default configuration when it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::from_file(path);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            translation: TranslationConfig::default(),
            pivot: PivotConfig::default(),
            cache: CacheConfig::default(),
            tonal: TonalConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
