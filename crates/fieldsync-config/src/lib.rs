// crates/fieldsync-config/src/lib.rs
// ============================================================================
// Module: FieldSync Config Library
// Description: TOML configuration loading and validation for the pipelines.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: chrono-tz, cron, fieldsync crates, serde, thiserror, toml, url
// ============================================================================

//! ## Overview
//! One TOML file configures both pipelines: the upstream pager, the local
//! store, the optional export destination, scheduling, and pipeline policy.
//! Missing or invalid configuration fails closed; nothing runs on a config
//! the validator rejects.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::FieldsyncConfig;
pub use config::PipelineConfig;
pub use config::ScheduleConfig;
