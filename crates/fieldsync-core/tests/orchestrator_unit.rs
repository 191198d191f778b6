// crates/fieldsync-core/tests/orchestrator_unit.rs
// ============================================================================
// Module: Refresh Orchestrator Unit Tests
// Description: Ledger bracketing, failure accounting, and overlap rejection.
// ============================================================================

//! ## Overview
//! Exercises the orchestrator against in-memory fakes: terminal ledger
//! entries on success and failure, rows-loaded accounting across partial
//! runs, deadline expiry, and the in-flight guard rejecting overlapping
//! triggers without touching the active run's ledger entry.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use fieldsync_core::BatchWriter;
use fieldsync_core::LedgerError;
use fieldsync_core::Page;
use fieldsync_core::PageSource;
use fieldsync_core::PageStream;
use fieldsync_core::PipelineError;
use fieldsync_core::ProcessName;
use fieldsync_core::RecordSink;
use fieldsync_core::RefreshOrchestrator;
use fieldsync_core::RunStatus;
use fieldsync_core::SinkError;
use fieldsync_core::SinkReport;
use fieldsync_core::StoreError;
use fieldsync_core::SyncLedger;
use fieldsync_core::SyncRun;
use fieldsync_core::UpstreamError;
use fieldsync_core::UpstreamRecord;
use fieldsync_core::unix_millis;
use serde_json::json;

// ============================================================================
// SECTION: Fakes
// ============================================================================

/// Builds a page of numbered records starting at `offset`.
fn page_of(offset: u64, len: u64, cursor: Option<&str>, total: u64) -> Page {
    let entries = (offset .. offset + len)
        .map(|index| {
            UpstreamRecord::from_value(json!({"id": format!("obs-{index}"), "seq": index}))
                .expect("record")
        })
        .collect();
    Page {
        entries,
        cursor: cursor.map(str::to_string),
        total_count: total,
    }
}

/// Page source replaying a fixed script of page results.
struct ScriptedSource {
    script: Vec<Result<Page, UpstreamError>>,
}

struct ScriptedStream {
    steps: std::vec::IntoIter<Result<Page, UpstreamError>>,
}

impl PageSource for ScriptedSource {
    fn open(&self) -> Result<Box<dyn PageStream + '_>, UpstreamError> {
        Ok(Box::new(ScriptedStream {
            steps: self.script.clone().into_iter(),
        }))
    }
}

impl PageStream for ScriptedStream {
    fn next_page(&mut self) -> Result<Option<Page>, UpstreamError> {
        self.steps.next().transpose()
    }
}

/// Sink that counts rows and optionally fails at a given batch index.
struct CountingSink {
    fail_on_batch: Option<u64>,
    block_first_batch: Option<Mutex<mpsc::Receiver<()>>>,
}

impl CountingSink {
    fn new() -> Self {
        Self {
            fail_on_batch: None,
            block_first_batch: None,
        }
    }
}

struct CountingWriter<'a> {
    sink: &'a CountingSink,
    batches: u64,
    rows: u64,
}

impl RecordSink for CountingSink {
    fn begin(&self) -> Result<Box<dyn BatchWriter + '_>, SinkError> {
        Ok(Box::new(CountingWriter {
            sink: self,
            batches: 0,
            rows: 0,
        }))
    }
}

impl BatchWriter for CountingWriter<'_> {
    fn write_batch(&mut self, records: &[UpstreamRecord]) -> Result<u64, SinkError> {
        if self.batches == 0
            && let Some(gate) = &self.sink.block_first_batch
        {
            gate.lock().unwrap().recv().unwrap();
        }
        if Some(self.batches) == self.sink.fail_on_batch {
            return Err(SinkError::Store(StoreError::Db("batch write failed".to_string())));
        }
        self.batches += 1;
        let written = u64::try_from(records.len()).unwrap();
        self.rows += written;
        Ok(written)
    }

    fn finish(self: Box<Self>) -> Result<SinkReport, SinkError> {
        Ok(SinkReport {
            rows_written: self.rows,
            detail: None,
        })
    }
}

/// In-memory append-only ledger.
#[derive(Default)]
struct MemoryLedger {
    runs: Mutex<Vec<SyncRun>>,
}

impl MemoryLedger {
    fn snapshot(&self) -> Vec<SyncRun> {
        self.runs.lock().unwrap().clone()
    }
}

impl SyncLedger for MemoryLedger {
    fn begin_run(
        &self,
        process: ProcessName,
        source_label: &str,
        target_label: &str,
    ) -> Result<i64, LedgerError> {
        let mut runs = self.runs.lock().unwrap();
        let id = i64::try_from(runs.len()).unwrap() + 1;
        runs.push(SyncRun {
            id,
            process,
            start_time: unix_millis(),
            finish_time: None,
            status: RunStatus::Running,
            rows_loaded: 0,
            error_message: None,
            source_label: source_label.to_string(),
            target_label: target_label.to_string(),
        });
        Ok(id)
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        rows_loaded: u64,
        error_message: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or(LedgerError::NotFound { run_id })?;
        assert_eq!(run.status, RunStatus::Running, "finish_run must hit a RUNNING entry");
        run.status = status;
        run.rows_loaded = rows_loaded;
        run.finish_time = Some(unix_millis());
        run.error_message = error_message.map(str::to_string);
        Ok(())
    }

    fn list_runs(&self) -> Result<Vec<SyncRun>, LedgerError> {
        Ok(self.snapshot())
    }

    fn last_success(&self, process: ProcessName) -> Result<Option<i64>, LedgerError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|run| run.process == process && run.status == RunStatus::Success)
            .filter_map(|run| run.finish_time)
            .max())
    }
}

/// Builds an orchestrator over the provided fakes.
fn orchestrator(
    source: ScriptedSource,
    sink: CountingSink,
    ledger: Arc<MemoryLedger>,
) -> RefreshOrchestrator {
    RefreshOrchestrator::new(
        ProcessName::ObservationRefresh,
        Arc::new(source),
        Arc::new(sink),
        ledger,
    )
}

// ============================================================================
// SECTION: Success Path
// ============================================================================

#[test]
fn successful_run_records_success_with_rows() {
    let source = ScriptedSource {
        script: vec![Ok(page_of(0, 3, Some("c1"), 5)), Ok(page_of(3, 2, None, 5))],
    };
    let ledger = Arc::new(MemoryLedger::default());
    let orch = orchestrator(source, CountingSink::new(), Arc::clone(&ledger));

    let outcome = orch.run().expect("run succeeds");
    assert_eq!(outcome.rows_loaded, 5);

    let runs = ledger.snapshot();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].rows_loaded, 5);
    assert!(runs[0].finish_time.is_some());
    assert!(runs[0].error_message.is_none());
}

#[test]
fn empty_upstream_records_success_with_zero_rows() {
    let source = ScriptedSource {
        script: vec![],
    };
    let ledger = Arc::new(MemoryLedger::default());
    let orch = orchestrator(source, CountingSink::new(), Arc::clone(&ledger));

    let outcome = orch.run().expect("run succeeds");
    assert_eq!(outcome.rows_loaded, 0);
    assert_eq!(ledger.snapshot()[0].status, RunStatus::Success);
}

#[test]
fn last_success_advances_only_on_success() {
    let ledger = Arc::new(MemoryLedger::default());
    let failing = orchestrator(
        ScriptedSource {
            script: vec![Err(UpstreamError::Status {
                status: 503,
            })],
        },
        CountingSink::new(),
        Arc::clone(&ledger),
    );
    assert!(failing.run().is_err());
    assert_eq!(ledger.last_success(ProcessName::ObservationRefresh).expect("query"), None);

    let succeeding = orchestrator(
        ScriptedSource {
            script: vec![Ok(page_of(0, 1, None, 1))],
        },
        CountingSink::new(),
        Arc::clone(&ledger),
    );
    succeeding.run().expect("run succeeds");
    assert!(ledger.last_success(ProcessName::ObservationRefresh).expect("query").is_some());
}

// ============================================================================
// SECTION: Failure Accounting
// ============================================================================

#[test]
fn upstream_failure_mid_pagination_records_partial_rows() {
    let source = ScriptedSource {
        script: vec![
            Ok(page_of(0, 3, Some("c1"), 9)),
            Ok(page_of(3, 3, Some("c2"), 9)),
            Err(UpstreamError::Status {
                status: 500,
            }),
        ],
    };
    let ledger = Arc::new(MemoryLedger::default());
    let orch = orchestrator(source, CountingSink::new(), Arc::clone(&ledger));

    let error = orch.run().expect_err("run fails");
    assert!(matches!(error, PipelineError::Upstream(UpstreamError::Status { status: 500 })));

    let runs = ledger.snapshot();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failure);
    assert_eq!(runs[0].rows_loaded, 6, "rows persisted before the abort");
    assert!(runs[0].finish_time.is_some());
    assert!(runs[0].error_message.as_deref().unwrap().contains("500"));
}

#[test]
fn sink_failure_records_rows_from_completed_batches() {
    let source = ScriptedSource {
        script: vec![Ok(page_of(0, 4, Some("c1"), 8)), Ok(page_of(4, 4, None, 8))],
    };
    let sink = CountingSink {
        fail_on_batch: Some(1),
        block_first_batch: None,
    };
    let ledger = Arc::new(MemoryLedger::default());
    let orch = orchestrator(source, sink, Arc::clone(&ledger));

    let error = orch.run().expect_err("run fails");
    assert!(matches!(error, PipelineError::Sink(SinkError::Store(_))));
    let runs = ledger.snapshot();
    assert_eq!(runs[0].status, RunStatus::Failure);
    assert_eq!(runs[0].rows_loaded, 4);
}

#[test]
fn zero_deadline_fails_run_as_deadline_exceeded() {
    let source = ScriptedSource {
        script: vec![Ok(page_of(0, 2, None, 2))],
    };
    let ledger = Arc::new(MemoryLedger::default());
    let orch = orchestrator(source, CountingSink::new(), Arc::clone(&ledger))
        .with_deadline(Duration::ZERO);

    let error = orch.run().expect_err("run fails");
    assert!(matches!(error, PipelineError::Deadline { .. }));
    assert_eq!(ledger.snapshot()[0].status, RunStatus::Failure);
}

// ============================================================================
// SECTION: Overlap Rejection
// ============================================================================

#[test]
fn overlapping_trigger_is_rejected_without_touching_active_run() {
    let (release, gate) = mpsc::channel();
    let source = ScriptedSource {
        script: vec![Ok(page_of(0, 2, None, 2))],
    };
    let sink = CountingSink {
        fail_on_batch: None,
        block_first_batch: Some(Mutex::new(gate)),
    };
    let ledger = Arc::new(MemoryLedger::default());
    let orch = Arc::new(orchestrator(source, sink, Arc::clone(&ledger)));

    let background = Arc::clone(&orch);
    let handle = thread::spawn(move || background.run());

    // Wait for the background run to claim the guard and open its entry.
    let started = Instant::now();
    while ledger.snapshot().is_empty() {
        assert!(started.elapsed() < Duration::from_secs(5), "run never started");
        thread::sleep(Duration::from_millis(5));
    }

    let error = orch.run().expect_err("overlap rejected");
    assert!(matches!(error, PipelineError::Conflict { .. }));
    assert_eq!(ledger.snapshot().len(), 1, "rejected trigger must not open a ledger entry");
    assert_eq!(ledger.snapshot()[0].status, RunStatus::Running);

    release.send(()).expect("release gate");
    handle.join().expect("join").expect("background run succeeds");
    assert_eq!(ledger.snapshot()[0].status, RunStatus::Success);

    // The guard is released; a fresh trigger is admitted again.
    release.send(()).expect("pre-release second run");
    orch.run().expect("second run succeeds");
    assert_eq!(ledger.snapshot().len(), 2);
}
