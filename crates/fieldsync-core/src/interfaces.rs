// crates/fieldsync-core/src/interfaces.rs
// ============================================================================
// Module: FieldSync Interfaces
// Description: Backend-agnostic seams for pagination, persistence, and ledger.
// Purpose: Define the contract surfaces the orchestrator drives.
// Dependencies: serde_json, crate::error, crate::record, crate::run
// ============================================================================

//! ## Overview
//! The orchestrator only sees traits: a [`PageSource`] producing a finite
//! stream of pages, a [`RecordSink`] consuming them batch by batch, an
//! [`ObservationStore`] with idempotent upsert-by-key semantics, and a
//! [`SyncLedger`] recording run outcomes. Implementations must fail closed
//! and must not emit partial side effects on error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::error::LedgerError;
use crate::error::SinkError;
use crate::error::StoreError;
use crate::error::UpstreamError;
use crate::record::Page;
use crate::record::UpstreamRecord;
use crate::run::ProcessName;
use crate::run::RunStatus;
use crate::run::SyncRun;

// ============================================================================
// SECTION: Page Source
// ============================================================================

/// Produces a fresh, finite stream of upstream pages.
///
/// A source is reusable: each [`PageSource::open`] starts pagination over
/// from the beginning. Streams are not restartable mid-flight.
pub trait PageSource: Send + Sync {
    /// Starts a new pagination pass.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] when the pass cannot be started.
    fn open(&self) -> Result<Box<dyn PageStream + '_>, UpstreamError>;
}

/// One in-flight pagination pass.
///
/// # Invariants
/// - Pages are yielded strictly in upstream order; each page's cursor feeds
///   the next request.
/// - After `Ok(None)` or any error, the stream is exhausted.
pub trait PageStream {
    /// Fetches the next page, or `None` when pagination has terminated.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on a non-success status, transport failure,
    /// malformed page, or breach of the page ceiling.
    fn next_page(&mut self) -> Result<Option<Page>, UpstreamError>;
}

// ============================================================================
// SECTION: Record Sink
// ============================================================================

/// Summary returned by a batch writer once a run's pages are consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    /// Total rows written across the run.
    pub rows_written: u64,
    /// Optional sink detail, such as the uploaded object name.
    pub detail: Option<String>,
}

/// Consumes the pages of one run.
///
/// Sinks are shared across runs; per-run state lives in the
/// [`BatchWriter`] handed out by [`RecordSink::begin`].
pub trait RecordSink: Send + Sync {
    /// Starts consuming a new run.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the sink cannot accept a run.
    fn begin(&self) -> Result<Box<dyn BatchWriter + '_>, SinkError>;
}

/// Per-run consumer of record batches.
///
/// # Invariants
/// - `write_batch` is invoked once per page, in page order.
/// - `finish` is invoked at most once, after the final batch; side effects
///   deferred to completion (upload, pruning) happen there.
pub trait BatchWriter {
    /// Consumes one page worth of records and returns rows written.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the batch cannot be consumed; the batch is
    /// the retry granularity, so a later run repeats it from scratch.
    fn write_batch(&mut self, records: &[UpstreamRecord]) -> Result<u64, SinkError>;

    /// Completes the run and returns the sink summary.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when completion-time side effects fail.
    fn finish(self: Box<Self>) -> Result<SinkReport, SinkError>;
}

// ============================================================================
// SECTION: Observation Store
// ============================================================================

/// Idempotent keyed storage for upstream observation records.
///
/// # Invariants
/// - Upserting an existing id overwrites the payload (last-write-wins) and
///   never creates a duplicate.
/// - Repeated full refreshes with unchanged upstream data converge to the
///   same final state.
pub trait ObservationStore: Send + Sync {
    /// Upserts a batch of records and returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the batch cannot be written; the batch is
    /// atomic, so no partial batch is visible.
    fn upsert_batch(&self, records: &[UpstreamRecord]) -> Result<u64, StoreError>;

    /// Returns the stored payload for an id, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Returns the number of stored observations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count query fails.
    fn count(&self) -> Result<u64, StoreError>;

    /// Deletes rows whose ids are absent from `live_ids`, returning the
    /// number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when pruning fails.
    fn prune_absent(&self, live_ids: &[String]) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Sync Ledger
// ============================================================================

/// Append-only record of orchestrated runs.
///
/// # Invariants
/// - Every run has exactly one entry, finalized at most once.
/// - Entries are never deleted.
pub trait SyncLedger: Send + Sync {
    /// Creates a RUNNING entry for a new run and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the entry cannot be created.
    fn begin_run(
        &self,
        process: ProcessName,
        source_label: &str,
        target_label: &str,
    ) -> Result<i64, LedgerError>;

    /// Finalizes a RUNNING entry with a terminal status, setting the finish
    /// time and final row count.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the run does not exist, is already
    /// terminal, or the update fails.
    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        rows_loaded: u64,
        error_message: Option<&str>,
    ) -> Result<(), LedgerError>;

    /// Returns all runs ordered by finish time descending, RUNNING entries
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the query fails.
    fn list_runs(&self) -> Result<Vec<SyncRun>, LedgerError>;

    /// Returns the finish time of the most recent SUCCESS run for a process,
    /// in unix epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the query fails.
    fn last_success(&self, process: ProcessName) -> Result<Option<i64>, LedgerError>;
}
