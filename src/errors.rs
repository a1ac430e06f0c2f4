//! Unified error types for `PantryTracker`.
//!
//! All fallible operations in the crate return [`Result`], built on one
//! crate-wide [`Error`] enum. The extraction variants mirror the two failure
//! modes of the receipt normalizer: text from which no JSON object can be
//! recovered at all, and JSON that parses but carries no usable item list.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration problem (missing file, bad value, missing argument).
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Underlying database error from `SeaORM`.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error (config file reads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error outside the extraction path.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The extraction response contained no recoverable JSON object.
    #[error("Extraction response is not valid JSON: {message}")]
    ExtractionMalformed {
        /// Parser diagnostics for the failed recovery attempts
        message: String,
    },

    /// The extraction response parsed as JSON but `items` is missing or not an array.
    #[error("Extraction response has no usable item list: {message}")]
    ExtractionSchemaInvalid {
        /// Description of the schema violation
        message: String,
    },

    /// A receipt could not be applied to the ledger as one unit.
    #[error("Ledger write failed: {message}")]
    LedgerWriteFailed {
        /// Underlying write failure
        message: String,
    },

    /// No product with the given id exists.
    #[error("Product not found: {id}")]
    ProductNotFound {
        /// Product id that was looked up
        id: i64,
    },

    /// No receipt with the given id exists.
    #[error("Receipt not found: {id}")]
    ReceiptNotFound {
        /// Receipt id that was looked up
        id: i64,
    },

    /// No pending receipt with the given id exists.
    #[error("Pending receipt not found: {id}")]
    PendingReceiptNotFound {
        /// Pending receipt id that was looked up
        id: i64,
    },

    /// The pending receipt is in a state that does not permit (re)processing.
    #[error("Pending receipt {id} is not retryable in status '{status}'")]
    PendingReceiptNotRetryable {
        /// Pending receipt id
        id: i64,
        /// Its current status
        status: String,
    },

    /// No product in the family carries the given type label.
    #[error("Unknown product type '{label}' for family '{family_id}'")]
    TypeNotFound {
        /// Family the lookup was scoped to
        family_id: String,
        /// The type label that matched no product
        label: String,
    },
}

/// Convenience `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
