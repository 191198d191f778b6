// crates/fieldsync-store-sqlite/src/lib.rs
// ============================================================================
// Module: FieldSync SQLite Store Library
// Description: SQLite-backed observation store and sync-run ledger.
// Purpose: Provide the durable local half of the sync pipeline.
// Dependencies: fieldsync-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One `SQLite` database holds both pipeline tables: `observations`, keyed by
//! upstream id with replace-on-conflict upserts, and `sync_runs`, the
//! append-only run ledger. [`SqliteStore`] implements both core traits over a
//! single mutex-guarded connection; [`ObservationSink`] adapts the store to
//! the orchestrator's batch-writer seam.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod sink;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use sink::ObservationSink;
pub use store::SqliteJournalMode;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
