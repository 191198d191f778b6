// crates/fieldsync-config/src/config.rs
// ============================================================================
// Module: FieldSync Configuration
// Description: Configuration loading and validation for FieldSync.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: chrono-tz, cron, fieldsync crates, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits and
//! validated section by section before anything runs. Cron expressions and
//! timezone names are parsed at load time so a scheduler misconfiguration
//! surfaces immediately, not at the first fire time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;
use cron::Schedule;
use fieldsync_export::UploadConfig;
use fieldsync_store_sqlite::SqliteStoreConfig;
use fieldsync_upstream::UpstreamConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "fieldsync.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "FIELDSYNC_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum upstream page size accepted by configuration.
pub(crate) const MAX_PAGE_SIZE: u32 = 10_000;
/// Maximum page ceiling accepted by configuration.
pub(crate) const MAX_MAX_PAGES: u64 = 1_000_000;
/// Default cron expression for the observation refresh (daily 03:00).
const DEFAULT_REFRESH_CRON: &str = "0 0 3 * * *";
/// Default cron expression for the geodata export (daily 03:30).
const DEFAULT_EXPORT_CRON: &str = "0 30 3 * * *";
/// Default scheduler timezone.
const DEFAULT_TIMEZONE: &str = "UTC";
/// Default database filename used when the store section is omitted.
const DEFAULT_STORE_PATH: &str = "fieldsync.db";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// FieldSync configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldsyncConfig {
    /// Upstream pager configuration.
    pub upstream: UpstreamConfig,
    /// Local store configuration.
    #[serde(default = "default_store")]
    pub store: SqliteStoreConfig,
    /// Export destination; the geodata pipeline is disabled when absent.
    #[serde(default)]
    pub export: Option<UploadConfig>,
    /// Pipeline policy knobs.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Scheduler configuration.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Returns the default store configuration.
fn default_store() -> SqliteStoreConfig {
    SqliteStoreConfig {
        path: PathBuf::from(DEFAULT_STORE_PATH),
        busy_timeout_ms: 5_000,
        journal_mode: fieldsync_store_sqlite::SqliteJournalMode::default(),
        sync_mode: fieldsync_store_sqlite::SqliteSyncMode::default(),
    }
}

/// Pipeline policy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    /// Whether a completed refresh deletes rows absent upstream.
    #[serde(default)]
    pub prune_stale: bool,
    /// Optional overall run deadline in milliseconds.
    #[serde(default)]
    pub run_deadline_ms: Option<u64>,
}

/// Scheduler configuration.
///
/// # Invariants
/// - Cron expressions use the six-field seconds-first form.
/// - `timezone` is an IANA timezone name.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression for the observation refresh.
    #[serde(default = "default_refresh_cron")]
    pub refresh_cron: String,
    /// Cron expression for the geodata export.
    #[serde(default = "default_export_cron")]
    pub export_cron: String,
    /// IANA timezone for interpreting fire times.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_cron: default_refresh_cron(),
            export_cron: default_export_cron(),
            timezone: default_timezone(),
        }
    }
}

/// Returns the default refresh cron expression.
fn default_refresh_cron() -> String {
    DEFAULT_REFRESH_CRON.to_string()
}

/// Returns the default export cron expression.
fn default_export_cron() -> String {
    DEFAULT_EXPORT_CRON.to_string()
}

/// Returns the default scheduler timezone.
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl FieldsyncConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_upstream(&self.upstream)?;
        validate_store(&self.store)?;
        if let Some(export) = &self.export {
            validate_export(export)?;
        }
        validate_pipeline(&self.pipeline)?;
        validate_schedule(&self.schedule)?;
        Ok(())
    }

    /// Returns the parsed scheduler timezone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the timezone name is unknown.
    pub fn scheduler_timezone(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(&self.schedule.timezone).map_err(|_| {
            ConfigError::Invalid(format!("unknown timezone: {}", self.schedule.timezone))
        })
    }
}

// ============================================================================
// SECTION: Section Validators
// ============================================================================

/// Validates the upstream pager section.
fn validate_upstream(upstream: &UpstreamConfig) -> Result<(), ConfigError> {
    Url::parse(&upstream.base_url)
        .map_err(|err| ConfigError::Invalid(format!("upstream.base_url invalid: {err}")))?;
    if upstream.resource.trim().is_empty() {
        return Err(ConfigError::Invalid("upstream.resource must be non-empty".to_string()));
    }
    if upstream.auth_token.trim().is_empty() {
        return Err(ConfigError::Invalid("upstream.auth_token must be non-empty".to_string()));
    }
    if upstream.page_size == 0 || upstream.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Invalid(format!(
            "upstream.page_size out of range: {} (max {MAX_PAGE_SIZE})",
            upstream.page_size
        )));
    }
    if upstream.max_pages == 0 || upstream.max_pages > MAX_MAX_PAGES {
        return Err(ConfigError::Invalid(format!(
            "upstream.max_pages out of range: {} (max {MAX_MAX_PAGES})",
            upstream.max_pages
        )));
    }
    if upstream.timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "upstream.timeout_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Validates the store section.
fn validate_store(store: &SqliteStoreConfig) -> Result<(), ConfigError> {
    if store.path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("store.path must be non-empty".to_string()));
    }
    if store.busy_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "store.busy_timeout_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Validates the export destination section.
fn validate_export(export: &UploadConfig) -> Result<(), ConfigError> {
    Url::parse(&export.endpoint)
        .map_err(|err| ConfigError::Invalid(format!("export.endpoint invalid: {err}")))?;
    if export.bucket.trim().is_empty() {
        return Err(ConfigError::Invalid("export.bucket must be non-empty".to_string()));
    }
    if export.access_key.trim().is_empty() {
        return Err(ConfigError::Invalid("export.access_key must be non-empty".to_string()));
    }
    if export.secret_key.trim().is_empty() {
        return Err(ConfigError::Invalid("export.secret_key must be non-empty".to_string()));
    }
    Ok(())
}

/// Validates the pipeline policy section.
fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.run_deadline_ms == Some(0) {
        return Err(ConfigError::Invalid(
            "pipeline.run_deadline_ms must be greater than zero when set".to_string(),
        ));
    }
    Ok(())
}

/// Validates the scheduler section.
fn validate_schedule(schedule: &ScheduleConfig) -> Result<(), ConfigError> {
    Schedule::from_str(&schedule.refresh_cron)
        .map_err(|err| ConfigError::Invalid(format!("schedule.refresh_cron invalid: {err}")))?;
    Schedule::from_str(&schedule.export_cron)
        .map_err(|err| ConfigError::Invalid(format!("schedule.export_cron invalid: {err}")))?;
    Tz::from_str(&schedule.timezone).map_err(|_| {
        ConfigError::Invalid(format!("schedule.timezone unknown: {}", schedule.timezone))
    })?;
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}
