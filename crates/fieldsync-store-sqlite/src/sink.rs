// crates/fieldsync-store-sqlite/src/sink.rs
// ============================================================================
// Module: Observation Record Sink
// Description: Adapts the observation store to the batch-writer seam.
// Purpose: Persist upstream pages batch by batch, pruning stale rows at end.
// Dependencies: fieldsync-core
// ============================================================================

//! ## Overview
//! [`ObservationSink`] is the persistence sink for the observation refresh
//! pipeline. Each run upserts every page into the store; when stale pruning
//! is enabled, the ids seen during the run define the live set and rows
//! absent from it are deleted once the final page has landed. Pruning never
//! happens mid-run, so a failed refresh cannot delete rows it has not
//! re-confirmed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use fieldsync_core::BatchWriter;
use fieldsync_core::ObservationStore;
use fieldsync_core::RecordSink;
use fieldsync_core::SinkError;
use fieldsync_core::SinkReport;
use fieldsync_core::UpstreamRecord;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Record sink that upserts pages into an observation store.
pub struct ObservationSink {
    /// Destination store for upserts.
    store: Arc<dyn ObservationStore>,
    /// Whether rows absent from a completed run are deleted.
    prune_stale: bool,
}

impl ObservationSink {
    /// Creates a sink over the given store with pruning disabled.
    #[must_use]
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self {
            store,
            prune_stale: false,
        }
    }

    /// Enables or disables stale-row pruning at run completion.
    #[must_use]
    pub const fn with_prune_stale(mut self, prune_stale: bool) -> Self {
        self.prune_stale = prune_stale;
        self
    }
}

impl RecordSink for ObservationSink {
    fn begin(&self) -> Result<Box<dyn BatchWriter + '_>, SinkError> {
        Ok(Box::new(ObservationWriter {
            sink: self,
            seen_ids: Vec::new(),
            rows_written: 0,
        }))
    }
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Per-run writer tracking the live id set for completion-time pruning.
///
/// # Invariants
/// - `seen_ids` covers exactly the records written during this run.
struct ObservationWriter<'a> {
    /// Owning sink supplying the store and pruning policy.
    sink: &'a ObservationSink,
    /// Ids written during this run, in arrival order.
    seen_ids: Vec<String>,
    /// Rows written so far.
    rows_written: u64,
}

impl BatchWriter for ObservationWriter<'_> {
    fn write_batch(&mut self, records: &[UpstreamRecord]) -> Result<u64, SinkError> {
        let written = self.sink.store.upsert_batch(records)?;
        self.seen_ids.extend(records.iter().map(|record| record.id().to_string()));
        self.rows_written = self.rows_written.saturating_add(written);
        Ok(written)
    }

    fn finish(self: Box<Self>) -> Result<SinkReport, SinkError> {
        let detail = if self.sink.prune_stale {
            let pruned = self.sink.store.prune_absent(&self.seen_ids)?;
            (pruned > 0).then(|| format!("pruned {pruned} stale rows"))
        } else {
            None
        };
        Ok(SinkReport {
            rows_written: self.rows_written,
            detail,
        })
    }
}
