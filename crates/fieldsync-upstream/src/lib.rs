// crates/fieldsync-upstream/src/lib.rs
// ============================================================================
// Module: FieldSync Upstream Library
// Description: Cursor-paginated client for the upstream observation API.
// Purpose: Produce finite page streams from an unbounded upstream dataset.
// Dependencies: fieldsync-core, reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! This crate implements [`CursorPager`], the upstream side of the sync
//! pipeline: repeated bounded GET requests following an opaque
//! server-supplied cursor until one of the termination conditions holds.
//! Pathological upstream behavior (non-advancing cursors, inconsistent
//! totals) is bounded by a hard page ceiling.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod pager;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use pager::CursorPager;
pub use pager::UpstreamConfig;
