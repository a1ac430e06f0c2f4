//! Shared test utilities for `PantryTracker`.
//!
//! This module provides common helper functions for setting up test databases
//! and building parsed receipt items with sensible defaults.

use crate::{
    core::{
        extraction::ParsedItem,
        ingestion::ReceiptExtractor,
        matcher::TokenOverlapMatcher,
        orchestrator,
    },
    entities::receipt,
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;

/// Family id used by tests that only need one tenant.
pub const FAMILY: &str = "test-family";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a `NaiveDate`; test dates are always valid.
#[allow(clippy::unwrap_used)]
pub fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// The matcher used throughout the tests.
pub fn matcher() -> TokenOverlapMatcher {
    TokenOverlapMatcher::default()
}

/// A parsed line item with no type label and no calories.
pub fn item(name: &str, quantity: f64, price: f64) -> ParsedItem {
    ParsedItem {
        name: name.to_string(),
        original_name: name.to_string(),
        quantity,
        unit: "piece".to_string(),
        price,
        calories: 0.0,
        product_type: None,
    }
}

/// A parsed line item carrying an explicit type label.
pub fn typed_item(name: &str, label: &str) -> ParsedItem {
    ParsedItem {
        product_type: Some(label.to_string()),
        ..item(name, 1.0, 1.0)
    }
}

/// A parsed line item carrying a calorie value.
pub fn caloric_item(name: &str, quantity: f64, price: f64, calories: f64) -> ParsedItem {
    ParsedItem {
        calories,
        ..item(name, quantity, price)
    }
}

/// Applies a receipt for [`FAMILY`] with the default matcher and refreshes
/// the affected caches, the way production callers do.
pub async fn apply_test_receipt(
    db: &DatabaseConnection,
    date: NaiveDate,
    items: &[ParsedItem],
) -> Result<receipt::Model> {
    orchestrator::apply_receipt(db, FAMILY, date, items, &matcher()).await
}

/// Extractor returning a fixed response body for every image.
pub struct FixedExtractor {
    body: String,
}

impl FixedExtractor {
    /// Wraps a canned response body.
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }
}

impl ReceiptExtractor for FixedExtractor {
    async fn extract(&self, _image_ref: &str) -> Result<String> {
        Ok(self.body.clone())
    }
}

/// Extractor that always fails, for exercising the retry path.
pub struct FailingExtractor;

impl ReceiptExtractor for FailingExtractor {
    async fn extract(&self, _image_ref: &str) -> Result<String> {
        Err(Error::Config {
            message: "extraction service unreachable".to_string(),
        })
    }
}
