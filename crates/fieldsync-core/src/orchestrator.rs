// crates/fieldsync-core/src/orchestrator.rs
// ============================================================================
// Module: FieldSync Refresh Orchestrator
// Description: Drives one refresh pipeline from pagination to ledger entry.
// Purpose: Coordinate source, sink, and ledger with mutual exclusion.
// Dependencies: crate::error, crate::interfaces, crate::run, crate::telemetry
// ============================================================================

//! ## Overview
//! A [`RefreshOrchestrator`] owns one pipeline: it brackets every run with a
//! ledger entry (RUNNING at start, terminal at end), drives the page stream
//! into the sink strictly in page order, and enforces the two hardenings the
//! bare cron-plus-loop pattern lacks: an atomic in-flight guard rejecting
//! overlapping triggers, and an optional overall run deadline. Errors from
//! any stage are recorded as FAILURE and propagated, never swallowed; a
//! failed run corrupts nothing, and the next trigger repeats the full
//! refresh from scratch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::error::PipelineError;
use crate::interfaces::PageSource;
use crate::interfaces::RecordSink;
use crate::interfaces::SinkReport;
use crate::interfaces::SyncLedger;
use crate::run::ProcessName;
use crate::run::RunOutcome;
use crate::run::RunStatus;
use crate::telemetry::NoopObserver;
use crate::telemetry::SyncEvent;
use crate::telemetry::SyncObserver;

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Coordinates one refresh pipeline end to end.
///
/// # Invariants
/// - At most one run of this orchestrator is in flight at a time; an
///   overlapping trigger fails fast with [`PipelineError::Conflict`] and
///   does not touch the active run's ledger entry.
/// - Every admitted run produces exactly one ledger entry, finalized with a
///   terminal status before `run` returns.
pub struct RefreshOrchestrator {
    /// Pipeline identity recorded in the ledger.
    process: ProcessName,
    /// Upstream page producer.
    source: Arc<dyn PageSource>,
    /// Per-run record consumer.
    sink: Arc<dyn RecordSink>,
    /// Run ledger.
    ledger: Arc<dyn SyncLedger>,
    /// Event observer.
    observer: Arc<dyn SyncObserver>,
    /// Ledger label describing the upstream source.
    source_label: String,
    /// Ledger label describing the persistence or export target.
    target_label: String,
    /// Optional overall run deadline.
    run_deadline: Option<Duration>,
    /// In-flight guard; true while a run is active.
    in_flight: AtomicBool,
}

impl RefreshOrchestrator {
    /// Creates an orchestrator for one pipeline.
    #[must_use]
    pub fn new(
        process: ProcessName,
        source: Arc<dyn PageSource>,
        sink: Arc<dyn RecordSink>,
        ledger: Arc<dyn SyncLedger>,
    ) -> Self {
        Self {
            process,
            source,
            sink,
            ledger,
            observer: Arc::new(NoopObserver),
            source_label: "upstream".to_string(),
            target_label: "store".to_string(),
            run_deadline: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Replaces the event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the ledger source and target labels.
    #[must_use]
    pub fn with_labels(mut self, source_label: &str, target_label: &str) -> Self {
        self.source_label = source_label.to_string();
        self.target_label = target_label.to_string();
        self
    }

    /// Sets an overall run deadline; expiry fails the run as FAILURE instead
    /// of hanging.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    /// Returns the pipeline identity.
    #[must_use]
    pub const fn process(&self) -> ProcessName {
        self.process
    }

    /// Executes one full refresh run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Conflict`] when a run is already in flight,
    /// or the failure that aborted an admitted run after it has been
    /// recorded as a terminal FAILURE ledger entry.
    pub fn run(&self) -> Result<RunOutcome, PipelineError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.observer.record(&SyncEvent::RunRejected {
                process: self.process,
            });
            return Err(PipelineError::Conflict {
                process: self.process,
            });
        }
        let result = self.run_exclusive();
        self.in_flight.store(false, Ordering::Release);
        result
    }

    /// Executes a run while the in-flight guard is held.
    fn run_exclusive(&self) -> Result<RunOutcome, PipelineError> {
        let run_id =
            self.ledger.begin_run(self.process, &self.source_label, &self.target_label)?;
        self.observer.record(&SyncEvent::RunStarted {
            process: self.process,
            run_id,
        });
        let started = Instant::now();
        let mut rows_loaded = 0_u64;
        let drive_result = self.drive(started, &mut rows_loaded);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match drive_result {
            Ok(report) => {
                self.ledger.finish_run(run_id, RunStatus::Success, report.rows_written, None)?;
                self.observer.record(&SyncEvent::RunFinished {
                    process: self.process,
                    run_id,
                    status: RunStatus::Success,
                    rows_loaded: report.rows_written,
                    duration_ms,
                });
                Ok(RunOutcome {
                    run_id,
                    rows_loaded: report.rows_written,
                    detail: report.detail,
                })
            }
            Err(error) => {
                // A ledger write failure must not mask the error that aborted
                // the run; a stale RUNNING row is finalized on next store open.
                let message = error.to_string();
                let _ = self.ledger.finish_run(
                    run_id,
                    RunStatus::Failure,
                    rows_loaded,
                    Some(&message),
                );
                self.observer.record(&SyncEvent::RunFinished {
                    process: self.process,
                    run_id,
                    status: RunStatus::Failure,
                    rows_loaded,
                    duration_ms,
                });
                Err(error)
            }
        }
    }

    /// Streams pages into the sink, accumulating rows written so far.
    ///
    /// `rows_loaded` is updated after every batch so a mid-run failure
    /// reports exactly the rows persisted before the abort.
    fn drive(&self, started: Instant, rows_loaded: &mut u64) -> Result<SinkReport, PipelineError> {
        let mut stream = self.source.open()?;
        let mut writer = self.sink.begin()?;
        let mut page_index = 0_u64;
        while let Some(page) = stream.next_page()? {
            self.check_deadline(started)?;
            let written = writer.write_batch(&page.entries)?;
            *rows_loaded = rows_loaded.saturating_add(written);
            self.observer.record(&SyncEvent::PageFetched {
                process: self.process,
                page_index,
                records: page.entries.len(),
            });
            page_index = page_index.saturating_add(1);
        }
        self.check_deadline(started)?;
        let report = writer.finish()?;
        Ok(report)
    }

    /// Fails the run when the configured deadline has expired.
    fn check_deadline(&self, started: Instant) -> Result<(), PipelineError> {
        let Some(deadline) = self.run_deadline else {
            return Ok(());
        };
        let elapsed = started.elapsed();
        if elapsed > deadline {
            return Err(PipelineError::Deadline {
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }
}
