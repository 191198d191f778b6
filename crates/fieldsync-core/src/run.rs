// crates/fieldsync-core/src/run.rs
// ============================================================================
// Module: FieldSync Run Model
// Description: Sync-run ledger entries and pipeline identities.
// Purpose: Track each orchestrated run start-to-finish with a terminal status.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every orchestrated run is recorded in the sync ledger as a [`SyncRun`]:
//! created with status [`RunStatus::Running`] at start and finalized exactly
//! once with a terminal status. Ledger entries are append-only; failures are
//! recorded, never erased, so a "last successful sync" query gives callers an
//! accurate staleness signal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Process Names
// ============================================================================

/// Identity of a refresh pipeline tracked by the ledger.
///
/// # Invariants
/// - Labels are stable wire forms; the ledger stores them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessName {
    /// Full refresh of the observation table.
    ObservationRefresh,
    /// GeoJSON export derived from upstream records.
    GeodataExport,
}

impl ProcessName {
    /// Returns the stable ledger label for the process.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObservationRefresh => "observation_refresh",
            Self::GeodataExport => "geodata_export",
        }
    }

    /// Parses a stored ledger label back into a process name.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "observation_refresh" => Some(Self::ObservationRefresh),
            "geodata_export" => Some(Self::GeodataExport),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Lifecycle status of a sync run.
///
/// # Invariants
/// - A run holds exactly one status at a time.
/// - `Running` transitions once to `Success` or `Failure`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is in progress.
    Running,
    /// Run completed and all pages were processed.
    Success,
    /// Run aborted; the error message records why.
    Failure,
}

impl RunStatus {
    /// Returns the stable ledger label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Parses a stored ledger label back into a status.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }

    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Sync Run
// ============================================================================

/// One ledger entry for an orchestrated run.
///
/// # Invariants
/// - `finish_time` is `Some` exactly when `status` is terminal.
/// - `error_message` is `Some` only for failed runs.
/// - Entries are created at run start, finalized once, and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Ledger row identifier.
    pub id: i64,
    /// Pipeline that produced this run.
    pub process: ProcessName,
    /// Run start time in unix epoch milliseconds.
    pub start_time: i64,
    /// Run finish time in unix epoch milliseconds, set on terminal transition.
    pub finish_time: Option<i64>,
    /// Current run status.
    pub status: RunStatus,
    /// Rows loaded before the run ended (terminal or so far).
    pub rows_loaded: u64,
    /// Failure description for failed runs.
    pub error_message: Option<String>,
    /// Label describing the upstream source.
    pub source_label: String,
    /// Label describing the persistence or export target.
    pub target_label: String,
}

// ============================================================================
// SECTION: Run Outcome
// ============================================================================

/// Result summary returned to the caller after a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Ledger identifier of the completed run.
    pub run_id: i64,
    /// Total rows loaded by the run.
    pub rows_loaded: u64,
    /// Optional sink detail, such as the uploaded object name.
    pub detail: Option<String>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    //! Test-only lint relaxations for panic-based assertions.
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::ProcessName;
    use super::RunStatus;

    #[test]
    fn process_labels_round_trip() {
        for process in [ProcessName::ObservationRefresh, ProcessName::GeodataExport] {
            assert_eq!(ProcessName::from_label(process.as_str()), Some(process));
        }
        assert_eq!(ProcessName::from_label("unknown"), None);
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [RunStatus::Running, RunStatus::Success, RunStatus::Failure] {
            assert_eq!(RunStatus::from_label(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::from_label("unknown"), None);
    }

    #[test]
    fn terminal_statuses_exclude_running() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failure.is_terminal());
    }
}
