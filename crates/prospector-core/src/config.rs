//! Pipeline configuration.
//!
//! [`PipelineConfig`] is what the orchestrator is built from. [`Settings`] is
//! the on-disk JSON file (`prospector.json` by default); every section is
//! optional and falls back to defaults, so a file that only sets API keys is
//! valid.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Dependency name the website extraction stage is rate-limited under.
pub const DEFAULT_EXTRACTOR_DEPENDENCY: &str = "DataExtractor";

/// Enrichment sources enabled when nothing else is configured.
pub const DEFAULT_ENRICHMENT_SOURCES: [&str; 3] = ["crunchbase", "linkedin", "news"];

/// Sliding-window budget shared by every dependency name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub time_window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        Self {
            max_requests,
            time_window,
        }
    }
}

impl Default for RateLimitConfig {
    /// 10 requests per minute per dependency.
    fn default() -> Self {
        Self {
            max_requests: 10,
            time_window: Duration::from_secs(60),
        }
    }
}

/// Linear backoff: attempt `n` failing waits `base_delay * n` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extractor_dependency: String,
    /// Enrichment source names, in merge order (later sources win on collision).
    pub enrichment_sources: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    /// Overall deadline for one invocation. `None` disables it.
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extractor_dependency: DEFAULT_EXTRACTOR_DEPENDENCY.to_string(),
            enrichment_sources: DEFAULT_ENRICHMENT_SOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PipelineConfig {
    pub fn with_enrichment_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enrichment_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject budgets of zero and empty or duplicated dependency names.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rate_limit.max_requests == 0 {
            return Err(AppError::ConfigError(
                "max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.time_window.is_zero() {
            return Err(AppError::ConfigError(
                "time_window must be greater than zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "retry max_attempts must be at least 1".into(),
            ));
        }
        if self.extractor_dependency.trim().is_empty() {
            return Err(AppError::ConfigError(
                "extractor dependency name must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        seen.insert(self.extractor_dependency.as_str());
        for source in &self.enrichment_sources {
            if source.trim().is_empty() {
                return Err(AppError::ConfigError(
                    "enrichment source names must not be empty".into(),
                ));
            }
            if !seen.insert(source.as_str()) {
                return Err(AppError::ConfigError(format!(
                    "dependency name '{source}' is used more than once"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Top-level settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Keys by provider name (`openai`, `crunchbase`, `linkedin`, ...).
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    #[serde(default)]
    pub paths: PathsSettings,

    #[serde(default)]
    pub settings: RuntimeSettings,

    /// Enrichment sources in merge order.
    #[serde(default = "default_enrichment")]
    pub enrichment: Vec<EnrichmentSourceSettings>,

    #[serde(default)]
    pub crm: CrmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            paths: PathsSettings::default(),
            settings: RuntimeSettings::default(),
            enrichment: default_enrichment(),
            crm: CrmSettings::default(),
        }
    }
}

/// `paths` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSettings {
    #[serde(default = "default_reports_dir")]
    pub reports: PathBuf,
}

impl Default for PathsSettings {
    fn default() -> Self {
        Self {
            reports: default_reports_dir(),
        }
    }
}

/// `settings` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Overall per-company deadline in seconds; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Rate-limit window in seconds.
    #[serde(default = "default_time_window_secs")]
    pub time_window: u64,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout: default_timeout_secs(),
            max_requests: default_max_requests(),
            time_window: default_time_window_secs(),
            cache_enabled: default_true(),
            cache_ttl: default_cache_ttl_secs(),
        }
    }
}

/// One entry of the `enrichment` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSourceSettings {
    pub name: String,
    /// HTTP endpoint queried with `?company=<name>`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Overrides `api_keys[name]`.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// `crm` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmSettings {
    /// When unset, CRM updates are acknowledged without being sent anywhere.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_enrichment() -> Vec<EnrichmentSourceSettings> {
    DEFAULT_ENRICHMENT_SOURCES
        .iter()
        .map(|name| EnrichmentSourceSettings {
            name: name.to_string(),
            endpoint: None,
            api_key: None,
        })
        .collect()
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_requests() -> usize {
    10
}
fn default_time_window_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid settings in {}: {e}", path.display())))
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.pipeline_config().validate()?;
        Ok(settings)
    }

    /// Derive the orchestrator configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let timeout = match self.settings.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        PipelineConfig {
            extractor_dependency: DEFAULT_EXTRACTOR_DEPENDENCY.to_string(),
            enrichment_sources: self.enrichment.iter().map(|s| s.name.clone()).collect(),
            rate_limit: RateLimitConfig::new(
                self.settings.max_requests,
                Duration::from_secs(self.settings.time_window),
            ),
            retry: RetryConfig::new(
                self.settings.retry_attempts,
                Duration::from_millis(self.settings.retry_delay_ms),
            ),
            timeout,
        }
    }

    /// The OpenAI key is the one key the tool cannot run without.
    pub fn openai_key(&self) -> Result<&str, AppError> {
        self.api_key("openai")
            .ok_or_else(|| AppError::ConfigError("Missing required API keys: openai".into()))
    }

    /// Non-empty key for `provider`, if any.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys
            .get(provider)
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }

    /// Key for an enrichment source: its own `api_key`, else `api_keys[name]`.
    pub fn enrichment_key(&self, source: &EnrichmentSourceSettings) -> Option<String> {
        source
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key(&source.name).map(str::to_string))
    }
}
