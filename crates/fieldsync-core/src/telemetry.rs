// crates/fieldsync-core/src/telemetry.rs
// ============================================================================
// Module: FieldSync Telemetry
// Description: Observability hooks for the sync pipeline.
// Purpose: Provide typed sync events without hard logging dependencies.
// Dependencies: crate::run
// ============================================================================

//! ## Overview
//! This module exposes a thin observer interface for pipeline events. It is
//! intentionally dependency-light so deployments can plug in their own
//! logging or metrics backend without redesign; the CLI installs a
//! stderr-writing observer. Events must not carry raw upstream payloads or
//! credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::run::ProcessName;
use crate::run::RunStatus;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Pipeline event emitted to observers.
///
/// # Invariants
/// - Variants are stable for downstream labeling.
/// - Events never embed record payloads or secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A run was admitted and its ledger entry created.
    RunStarted {
        /// Pipeline that started.
        process: ProcessName,
        /// Ledger identifier of the run.
        run_id: i64,
    },
    /// One page was fetched and handed to the sink.
    PageFetched {
        /// Pipeline consuming the page.
        process: ProcessName,
        /// Zero-based page index within the run.
        page_index: u64,
        /// Records in the page.
        records: usize,
    },
    /// Pagination ended early: an empty page arrived while a cursor was
    /// still present. Treated as completion, flagged for operators.
    EarlyTermination {
        /// Pipeline that observed the anomaly.
        process: ProcessName,
        /// Records processed before the empty page.
        processed: u64,
        /// Upstream's self-reported total at that point.
        total_count: u64,
    },
    /// A run reached a terminal status.
    RunFinished {
        /// Pipeline that finished.
        process: ProcessName,
        /// Ledger identifier of the run.
        run_id: i64,
        /// Terminal status recorded in the ledger.
        status: RunStatus,
        /// Rows loaded by the run.
        rows_loaded: u64,
        /// Wall-clock run duration in milliseconds.
        duration_ms: u64,
    },
    /// A trigger was rejected because a run of the same pipeline is active.
    RunRejected {
        /// Pipeline that rejected the trigger.
        process: ProcessName,
    },
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Receives pipeline events.
pub trait SyncObserver: Send + Sync {
    /// Records one event. Implementations must not panic or block the run.
    fn record(&self, event: &SyncEvent);
}

/// Observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn record(&self, _event: &SyncEvent) {}
}
