//! Core business logic for `PantryTracker` - ledger, caches and the
//! ingestion pipeline, all framework-agnostic.

/// Purchase cadence estimation and product status rules
pub mod cadence;
/// Normalization of raw extraction-service responses into parsed receipts
pub mod extraction;
/// Receipt ingestion state machine, from image upload to applied receipt
pub mod ingestion;
/// The authoritative purchase ledger - products, entries, receipts
pub mod ledger;
/// Pluggable type-label similarity matching
pub mod matcher;
/// Monthly spend and calorie aggregation cache
pub mod monthly_cache;
/// Event-driven cache refresh and family-wide recomputation
pub mod orchestrator;
/// Per-type pooled cadence cache
pub mod type_cache;
