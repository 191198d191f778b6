// crates/fieldsync-core/src/record.rs
// ============================================================================
// Module: FieldSync Record Model
// Description: Upstream records and pagination pages.
// Purpose: Model loosely-typed upstream payloads as opaque blobs with a key.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Upstream payloads are arbitrary nested JSON. FieldSync models them as an
//! opaque [`UpstreamRecord`] carrying the upstream `id` plus the verbatim
//! payload; field projections (coordinates, extended attributes) happen only
//! where fields are actually consumed. A [`Page`] is one pagination step:
//! an ordered batch of records, the next opaque cursor, and the upstream's
//! self-reported total.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Upstream Record
// ============================================================================

/// One upstream record: an opaque JSON payload keyed by the upstream `id`.
///
/// # Invariants
/// - `id` equals the `id` field inside `payload`.
/// - The payload is stored verbatim; no schema projection is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRecord {
    /// Upstream identifier, used as the persisted primary key.
    id: String,
    /// Verbatim upstream payload.
    payload: Value,
}

impl UpstreamRecord {
    /// Builds a record from a raw upstream JSON value.
    ///
    /// The `id` field must be present as a string or an integer; integers are
    /// canonicalized to their decimal string form.
    ///
    /// # Errors
    ///
    /// Returns a message describing the malformed value when `id` is missing
    /// or has an unsupported type.
    pub fn from_value(payload: Value) -> Result<Self, String> {
        let id = match payload.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::String(_)) => return Err("record id is empty".to_string()),
            Some(Value::Number(id)) => id.to_string(),
            Some(_) => return Err("record id must be a string or number".to_string()),
            None => return Err("record is missing an id field".to_string()),
        };
        Ok(Self {
            id,
            payload,
        })
    }

    /// Returns the upstream identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the verbatim upstream payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consumes the record and returns the payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }
}

// ============================================================================
// SECTION: Page
// ============================================================================

/// One page of upstream records.
///
/// # Invariants
/// - `entries` preserves upstream order.
/// - `cursor` is `None` when the upstream signalled the end of data.
/// - `total_count` is the upstream's self-reported total and may disagree
///   with the entries actually observed; callers must tolerate this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Ordered records in this page.
    pub entries: Vec<UpstreamRecord>,
    /// Opaque cursor for the next page, absent at end of data.
    pub cursor: Option<String>,
    /// Upstream's self-reported total record count.
    pub total_count: u64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
