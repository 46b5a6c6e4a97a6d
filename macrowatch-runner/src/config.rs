//! Monitor configuration: a TOML file plus secrets from the environment.
//!
//! Every section is optional; a missing file is the all-defaults config.
//!
//! ```toml
//! [cache]
//! dir = ".macrowatch/cache"
//! ttl_minutes = 60
//!
//! [fetch]
//! workers = 4
//! lookback_years = 5
//!
//! [http]
//! timeout_secs = 20
//!
//! [freshness.by_frequency]
//! weekly = { fresh_days = 7, stale_days = 21 }
//!
//! [registry]
//! path = "indicators.toml"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use macrowatch_core::data::{HttpSettings, MAX_RETRIES};
use macrowatch_core::freshness::FreshnessRules;
use macrowatch_core::registry::{Registry, RegistryError};

pub const FRED_API_KEY_VAR: &str = "FRED_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("{FRED_API_KEY_VAR} is not set but the registry has FRED indicators")]
    MissingFredKey,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Snapshots younger than this are served without refetching.
    pub ttl_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".macrowatch/cache"),
            ttl_minutes: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ttl_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Size of the private fetch thread pool.
    pub workers: usize,
    /// History requested from each upstream.
    pub lookback_years: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            lookback_years: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Deployment-time registry file replacing the built-in catalog.
    pub path: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub http: HttpSettings,
    pub freshness: FreshnessRules,
    pub registry: RegistryConfig,
}

impl MonitorConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.workers == 0 {
            return Err(ConfigError::Invalid("fetch.workers must be at least 1".into()));
        }
        if self.cache.ttl_minutes < 0 {
            return Err(ConfigError::Invalid("cache.ttl_minutes must not be negative".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be at least 1".into()));
        }
        if self.http.max_retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!("http.max_retries must be at most {MAX_RETRIES}")));
        }
        let all = self
            .freshness
            .by_frequency
            .iter()
            .map(|(f, t)| (f.to_string(), t))
            .chain(self.freshness.overrides.iter().map(|(n, t)| (n.clone(), t)));
        for (key, t) in all {
            if t.fresh_days < 0 || t.fresh_days > t.stale_days {
                return Err(ConfigError::Invalid(format!(
                    "freshness thresholds for {key}: need 0 <= fresh_days <= stale_days"
                )));
            }
        }
        Ok(())
    }

    /// The configured registry file, or the built-in catalog.
    pub fn load_registry(&self) -> Result<Registry, ConfigError> {
        match &self.registry.path {
            Some(path) => Ok(Registry::from_file(path)?),
            None => Ok(Registry::builtin()),
        }
    }

    pub fn live_log_path(&self) -> PathBuf {
        self.cache.dir.join("live_fetch_log.json")
    }
}

/// Secrets read from `.env` and the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub fred: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Self {
            fred: std::env::var(FRED_API_KEY_VAR).ok().filter(|k| !k.trim().is_empty()),
        }
    }

    /// The FRED key, required only when the registry has FRED indicators.
    pub fn require_fred(&self, registry: &Registry) -> Result<Option<&str>, ConfigError> {
        let needs_fred = !registry.by_source(macrowatch_core::registry::Source::Fred).is_empty();
        match (&self.fred, needs_fred) {
            (Some(key), _) => Ok(Some(key.as_str())),
            (None, false) => Ok(None),
            (None, true) => Err(ConfigError::MissingFredKey),
        }
    }
}
