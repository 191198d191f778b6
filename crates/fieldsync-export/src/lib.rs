// crates/fieldsync-export/src/lib.rs
// ============================================================================
// Module: FieldSync Export Library
// Description: GeoJSON transform and signed upload for the geodata pipeline.
// Purpose: Turn upstream records into an uploaded geospatial artifact.
// Dependencies: fieldsync-core, base64, hmac, reqwest, serde_json, sha1, time
// ============================================================================

//! ## Overview
//! The geodata pipeline ends here: [`transform_records`] maps a run's records
//! into one GeoJSON `FeatureCollection` artifact, and [`SignedUploader`] PUTs
//! it to an S3-compatible object store with a manually computed AWS-style
//! HMAC authorization header. [`GeoExportSink`] stitches both behind the
//! batch-writer seam so the orchestrator drives this pipeline exactly like
//! the observation refresh.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod geo;
pub mod sink;
pub mod upload;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use geo::EXPORT_MIME_TYPE;
pub use geo::ExportFile;
pub use geo::transform_records;
pub use geo::transform_records_at;
pub use sink::GeoExportSink;
pub use upload::SignedUploader;
pub use upload::UploadConfig;
pub use upload::sign_upload;
