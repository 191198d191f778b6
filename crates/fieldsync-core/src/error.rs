// crates/fieldsync-core/src/error.rs
// ============================================================================
// Module: FieldSync Error Taxonomy
// Description: Error types for upstream, storage, transform, and upload paths.
// Purpose: Surface every pipeline failure to the orchestrator, never swallow.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Each pipeline concern has its own error enum; the orchestrator folds them
//! into [`PipelineError`] and converts the result into a terminal ledger
//! entry. Errors carry stable, message-oriented variants and avoid embedding
//! raw upstream payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::run::ProcessName;

// ============================================================================
// SECTION: Upstream Errors
// ============================================================================

/// Errors raised while paging the upstream API.
///
/// # Invariants
/// - Any variant aborts the current pagination pass; pagination never
///   silently retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Upstream returned a non-success HTTP status.
    #[error("upstream returned http status {status}")]
    Status {
        /// HTTP status code returned by the upstream.
        status: u16,
    },
    /// Transport-level failure talking to the upstream.
    #[error("upstream request failed: {0}")]
    Transport(String),
    /// Upstream response could not be decoded as a page.
    #[error("upstream page malformed: {0}")]
    Malformed(String),
    /// The pagination safety ceiling was reached.
    #[error("pagination exceeded {max_pages} pages without terminating")]
    PageLimit {
        /// Configured page ceiling.
        max_pages: u64,
    },
    /// The HTTP client could not be constructed.
    #[error("upstream client build failed: {0}")]
    Client(String),
}

// ============================================================================
// SECTION: Storage Errors
// ============================================================================

/// Errors raised by the observation store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O failure.
    #[error("observation store io error: {0}")]
    Io(String),
    /// Database engine failure.
    #[error("observation store db error: {0}")]
    Db(String),
    /// Invalid record or query input.
    #[error("observation store invalid data: {0}")]
    Invalid(String),
}

/// Errors raised by the sync-run ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Database engine failure.
    #[error("sync ledger db error: {0}")]
    Db(String),
    /// Invalid ledger data or transition.
    #[error("sync ledger invalid data: {0}")]
    Invalid(String),
    /// No ledger entry exists for the requested run.
    #[error("sync ledger has no run {run_id}")]
    NotFound {
        /// Requested run identifier.
        run_id: i64,
    },
}

// ============================================================================
// SECTION: Export Errors
// ============================================================================

/// Errors raised while transforming records into a geospatial export.
///
/// # Invariants
/// - Any variant aborts file production; no partial file is emitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A record could not be mapped into a feature.
    #[error("record {id} could not be transformed: {message}")]
    Record {
        /// Identifier of the offending record.
        id: String,
        /// Description of the mapping failure.
        message: String,
    },
    /// The feature collection could not be serialized.
    #[error("feature collection serialization failed: {0}")]
    Serialize(String),
}

/// Errors raised while uploading an export file.
///
/// # Invariants
/// - Uploads are never retried internally; retry policy belongs to the
///   scheduling driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The destination description is unusable.
    #[error("upload destination invalid: {0}")]
    Destination(String),
    /// Signing material could not be applied.
    #[error("upload signing failed: {0}")]
    Signing(String),
    /// Transport-level failure during the PUT.
    #[error("upload request failed: {0}")]
    Transport(String),
    /// Object store returned a non-2xx response.
    #[error("upload rejected with http status {status}")]
    Status {
        /// HTTP status code returned by the object store.
        status: u16,
    },
}

// ============================================================================
// SECTION: Sink Errors
// ============================================================================

/// Errors raised by a record sink while consuming pages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Persistence failure in the observation path.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Transformation failure in the geodata path.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// Upload failure in the geodata path.
    #[error(transparent)]
    Upload(#[from] UploadError),
}

// ============================================================================
// SECTION: Pipeline Errors
// ============================================================================

/// Errors surfaced by the orchestrator to its caller.
///
/// # Invariants
/// - Every variant except `Conflict` corresponds to a ledger entry finalized
///   as FAILURE; `Conflict` never alters the active run's ledger state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Pagination failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Sink consumption failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// Ledger bookkeeping failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// A run was triggered while another run of the same pipeline is active.
    #[error("pipeline {process} already has a run in progress")]
    Conflict {
        /// Pipeline that rejected the trigger.
        process: ProcessName,
    },
    /// The run exceeded its configured deadline.
    #[error("run exceeded deadline after {elapsed_ms} ms")]
    Deadline {
        /// Elapsed run time in milliseconds when the deadline was detected.
        elapsed_ms: u64,
    },
}
