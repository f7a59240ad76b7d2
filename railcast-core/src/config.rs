use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{
    model::{Location, WeatherFeature},
    predict::{DEFAULT_TIMEOUT, EndpointCandidate, PayloadFormat, default_endpoints},
};

pub const NS_KEY_ENV: &str = "NS_APP_PRIMARY";
pub const SERVING_TOKEN_ENV: &str = "DATABRICKS_TOKEN";

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// latitude = 52.3116485
/// longitude = 4.9451244
/// ns_api_key = "..."
///
/// [[endpoints]]
/// name = "loopback"
/// url = "http://127.0.0.1:8000/predict_prepped_data"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub latitude: f64,
    pub longitude: f64,

    /// Subscription key for the NS disruptions API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns_api_key: Option<String>,

    /// Per-request timeout for outbound calls.
    pub timeout_secs: u64,

    /// How long fetched forecasts and disruption lists are reused.
    pub cache_ttl_secs: u64,

    /// Features shown by `forecast` and `history` when none are given.
    pub weather_features: Vec<WeatherFeature>,

    /// Prediction service candidates, in the order they are tried.
    pub endpoints: Vec<EndpointCandidate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latitude: 52.3116485,
            longitude: 4.9451244,
            ns_api_key: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            cache_ttl_secs: 60,
            weather_features: WeatherFeature::model_inputs().to_vec(),
            endpoints: default_endpoints(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    /// Environment overrides are applied in both cases.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_env(|name| std::env::var(name).ok());
        Ok(cfg)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "railcast", "railcast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// `NS_APP_PRIMARY` wins over the stored key; `DATABRICKS_TOKEN` fills in
    /// serving endpoints that have no token of their own.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(NS_KEY_ENV).filter(|k| !k.is_empty()) {
            self.ns_api_key = Some(key);
        }

        if let Some(token) = lookup(SERVING_TOKEN_ENV).filter(|t| !t.is_empty()) {
            for endpoint in &mut self.endpoints {
                if endpoint.format == PayloadFormat::DataframeSplit && endpoint.bearer_token.is_none() {
                    endpoint.bearer_token = Some(token.clone());
                }
            }
        }
    }

    /// Reject values every later request would trip over.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1 second");
        }
        self.location()?;
        Ok(())
    }

    pub fn location(&self) -> Result<Location> {
        Location::new(self.latitude, self.longitude).context("Invalid default location")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
