// crates/fieldsync-core/src/lib.rs
// ============================================================================
// Module: FieldSync Core Library
// Description: Domain types, interfaces, and orchestration for FieldSync.
// Purpose: Define the refresh pipeline contract independent of backends.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! FieldSync Core defines the data model and contract surfaces for the sync
//! pipeline: upstream pages and records, the sync-run ledger, the
//! source/sink seams, and the [`RefreshOrchestrator`] that drives a full
//! refresh from pagination through persistence to a terminal ledger entry.
//! Backends (HTTP pager, `SQLite` store, GeoJSON export) live in sibling
//! crates and plug in through the interfaces defined here.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod interfaces;
pub mod orchestrator;
pub mod record;
pub mod run;
pub mod telemetry;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::LedgerError;
pub use error::PipelineError;
pub use error::SinkError;
pub use error::StoreError;
pub use error::TransformError;
pub use error::UploadError;
pub use error::UpstreamError;
pub use interfaces::BatchWriter;
pub use interfaces::ObservationStore;
pub use interfaces::PageSource;
pub use interfaces::PageStream;
pub use interfaces::RecordSink;
pub use interfaces::SinkReport;
pub use interfaces::SyncLedger;
pub use orchestrator::RefreshOrchestrator;
pub use record::Page;
pub use record::UpstreamRecord;
pub use run::ProcessName;
pub use run::RunOutcome;
pub use run::RunStatus;
pub use run::SyncRun;
pub use telemetry::NoopObserver;
pub use telemetry::SyncEvent;
pub use telemetry::SyncObserver;
pub use time::unix_millis;
