// crates/fieldsync-core/src/time.rs
// ============================================================================
// Module: FieldSync Time Helpers
// Description: Wall-clock helpers shared by ledger writers.
// Purpose: Provide a single definition of ledger timestamps.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Ledger timestamps are unix epoch milliseconds. Times before the epoch
//! clamp to zero rather than failing; the ledger is observability data, not a
//! correctness input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current wall-clock time in unix epoch milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
}
