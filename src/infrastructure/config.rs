//! Configuration infrastructure
//!
//! Contains configuration loading and management for catalog harvesting.
//!
//! Every section deserializes with `#[serde(default)]`, so a config file only
//! needs the keys it overrides. Validation is separate from loading: an
//! invalid configuration is a fatal error for the run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use super::parsing::ParsingConfig;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub transport: TransportConfig,
    pub pipeline: PipelineConfig,
    pub parsing: ParsingConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub enrichment: EnrichmentConfig,
}

/// Upstream catalog origin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Origin every locator is resolved against
    pub base_url: String,

    /// Search path plus the fixed sort / page size / layout parameters
    pub search_options: String,

    /// Listing pages to discover when the CLI does not say otherwise
    pub page_count: u32,
}

/// Transport session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Idle connections kept per host; should cover the batch size
    pub pool_size: usize,

    /// Attempts per request including the first one
    pub max_attempts: u32,

    /// First backoff delay, doubled on every further retry
    pub initial_backoff_ms: u64,

    pub max_backoff_ms: u64,

    /// Statuses that trigger a retry
    pub retry_statuses: Vec<u16>,

    /// 0 disables the limiter
    pub max_requests_per_second: u32,
}

/// Detail pipeline sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detail URLs fetched concurrently per producer round
    pub batch_size: usize,

    /// Parallel parse workers
    pub parse_workers: usize,

    /// Bound of the fetch → parse queue; must be at least `parse_workers`
    pub queue_capacity: usize,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted console logs
    pub json_format: bool,

    pub console_output: bool,

    /// Write a daily rolling log file under `log_dir`
    pub file_output: bool,

    /// Defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

/// Audio-feature enrichment API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub api_base: String,

    /// Largest id batch the API accepts per request
    pub batch_size: usize,

    /// How many 429 responses to wait out before giving up on a batch
    pub max_rate_limit_retries: u32,
}

/// Configuration rejected by [`AppConfig::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than 0")]
    Zero { field: &'static str },

    #[error("queue_capacity ({capacity}) must be at least parse_workers ({workers})")]
    QueueTooSmall { capacity: usize, workers: usize },

    #[error("invalid catalog base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: catalog::BASE_URL.to_string(),
            search_options: catalog::SEARCH_OPTIONS.to_string(),
            page_count: defaults::PAGE_COUNT,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            pool_size: defaults::POOL_SIZE,
            max_attempts: defaults::MAX_ATTEMPTS,
            initial_backoff_ms: defaults::INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
            retry_statuses: defaults::RETRY_STATUSES.to_vec(),
            max_requests_per_second: 0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            parse_workers: defaults::PARSE_WORKERS,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("reqwest".to_string(), "info".to_string());
        module_filters.insert("hyper".to_string(), "warn".to_string());
        module_filters.insert("html5ever".to_string(), "warn".to_string());
        module_filters.insert("selectors".to_string(), "warn".to_string());

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            module_filters,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
            max_connections: 5,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::ENRICHMENT_API_BASE.to_string(),
            batch_size: defaults::ENRICHMENT_BATCH_SIZE,
            max_rate_limit_retries: 3,
        }
    }
}

impl AppConfig {
    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pipeline = &self.pipeline;
        if pipeline.batch_size == 0 {
            return Err(ConfigError::Zero { field: "pipeline.batch_size" });
        }
        if pipeline.parse_workers == 0 {
            return Err(ConfigError::Zero { field: "pipeline.parse_workers" });
        }
        // The consumer waits for `parse_workers` queued items, so a smaller
        // bound would park the producer forever.
        if pipeline.queue_capacity < pipeline.parse_workers {
            return Err(ConfigError::QueueTooSmall {
                capacity: pipeline.queue_capacity,
                workers: pipeline.parse_workers,
            });
        }
        if self.transport.max_attempts == 0 {
            return Err(ConfigError::Zero { field: "transport.max_attempts" });
        }
        if self.enrichment.batch_size == 0 {
            return Err(ConfigError::Zero { field: "enrichment.batch_size" });
        }
        url::Url::parse(&self.catalog.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.catalog.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("catalog-harvester");

        Ok(config_dir)
    }

    /// Manager for the default per-user configuration file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;

        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration file {:?}", self.config_path))?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}

/// Catalog origin constants
pub mod catalog {
    pub const BASE_URL: &str = "https://www.discogs.com";

    /// Masters sorted by "have" count, compact text-only card layout
    pub const SEARCH_OPTIONS: &str =
        "/search/?limit=100&sort=have%2Cdesc&ev=em_rs&type=master&layout=sm";

    pub const PAGE_PARAM: &str = "page";
    pub const YEAR_PARAM: &str = "year";
}

/// Default configuration values
pub mod defaults {
    pub const PAGE_COUNT: u32 = 3;

    pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) catalog-harvester/0.2";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Matches the largest batch a deployment is expected to run
    pub const POOL_SIZE: usize = 250;
    pub const MAX_ATTEMPTS: u32 = 5;
    pub const INITIAL_BACKOFF_MS: u64 = 200;
    pub const MAX_BACKOFF_MS: u64 = 10_000;
    pub const RETRY_STATUSES: &[u16] = &[500, 502, 503, 504];

    pub const BATCH_SIZE: usize = 100;
    pub const PARSE_WORKERS: usize = 4;
    pub const QUEUE_CAPACITY: usize = 64;

    pub const LOG_LEVEL: &str = "info";

    pub const DATABASE_URL: &str = "sqlite:catalog-harvest.db";

    pub const ENRICHMENT_API_BASE: &str = "https://api.spotify.com/v1/";
    pub const ENRICHMENT_BATCH_SIZE: usize = 100;
}

/// URL building helper functions
pub mod utils {
    use super::CatalogConfig;
    use super::catalog::{PAGE_PARAM, YEAR_PARAM};

    /// Listing URL for a 1-based page, with the optional release-year filter
    pub fn listing_page_url(catalog: &CatalogConfig, page: u32, year: Option<i32>) -> String {
        let base = format!(
            "{}{}",
            catalog.base_url.trim_end_matches('/'),
            catalog.search_options
        );
        let separator = if base.contains('?') { '&' } else { '?' };
        let mut url = format!("{base}{separator}{PAGE_PARAM}={page}");
        if let Some(year) = year {
            url.push_str(&format!("&{YEAR_PARAM}={year}"));
        }
        url
    }
}
