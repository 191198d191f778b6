// crates/fieldsync-export/src/sink.rs
// ============================================================================
// Module: Geodata Export Sink
// Description: Buffers a run's records, then transforms and uploads at end.
// Purpose: Drive the geodata pipeline through the batch-writer seam.
// Dependencies: fieldsync-core, crate::geo, crate::upload
// ============================================================================

//! ## Overview
//! The geodata pipeline defers all side effects to run completion: pages are
//! buffered as they arrive and the feature collection is built and uploaded
//! only once the final page has landed. A failure anywhere leaves the bucket
//! untouched, so a partial export is never visible downstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use fieldsync_core::BatchWriter;
use fieldsync_core::RecordSink;
use fieldsync_core::SinkError;
use fieldsync_core::SinkReport;
use fieldsync_core::UpstreamRecord;

use crate::geo::transform_records;
use crate::upload::SignedUploader;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Record sink producing one uploaded GeoJSON artifact per run.
pub struct GeoExportSink {
    /// Uploader for the produced artifact.
    uploader: SignedUploader,
}

impl GeoExportSink {
    /// Creates a sink that uploads through the given uploader.
    #[must_use]
    pub const fn new(uploader: SignedUploader) -> Self {
        Self {
            uploader,
        }
    }
}

impl RecordSink for GeoExportSink {
    fn begin(&self) -> Result<Box<dyn BatchWriter + '_>, SinkError> {
        Ok(Box::new(ExportWriter {
            sink: self,
            records: Vec::new(),
        }))
    }
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Per-run writer buffering records until completion.
struct ExportWriter<'a> {
    /// Owning sink supplying the uploader.
    sink: &'a GeoExportSink,
    /// Records buffered across the run's pages.
    records: Vec<UpstreamRecord>,
}

impl BatchWriter for ExportWriter<'_> {
    fn write_batch(&mut self, records: &[UpstreamRecord]) -> Result<u64, SinkError> {
        self.records.extend_from_slice(records);
        Ok(u64::try_from(records.len()).unwrap_or(u64::MAX))
    }

    fn finish(self: Box<Self>) -> Result<SinkReport, SinkError> {
        let file = transform_records(&self.records)?;
        self.sink.uploader.upload(&file)?;
        Ok(SinkReport {
            rows_written: u64::try_from(self.records.len()).unwrap_or(u64::MAX),
            detail: Some(file.name),
        })
    }
}
