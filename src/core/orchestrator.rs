//! Recalculation orchestration - Keeps the derived caches consistent.
//!
//! A pure event-to-refresh-set mapping, applied synchronously after the
//! triggering ledger mutation commits: the caller is not told a mutation
//! succeeded until the caches it invalidated have been rebuilt. There are no
//! timers or settle delays anywhere; consistency comes from the call chain.
//!
//! Refresh order within one event is always cadence per product, then type
//! cache per label, then monthly cache per month. Every refresh is an
//! idempotent pure function of the ledger state, so overlapping refreshes
//! for the same type or month converge without locking.

use crate::{
    core::{
        extraction::ParsedItem,
        ledger::{self, ProductPatch},
        matcher::TypeMatcher,
        monthly_cache, type_cache,
    },
    entities::{product, receipt},
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Description of one committed ledger mutation: which entities changed and
/// therefore which caches must be refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// A receipt's items were applied to the ledger
    ReceiptApplied {
        /// Family the receipt belongs to
        family_id: String,
        /// Products created or updated by the receipt
        product_ids: Vec<i64>,
        /// Type labels carried by the affected products
        type_labels: Vec<String>,
        /// Receipt year
        year: i32,
        /// Receipt month
        month: u32,
    },
    /// A product's calorie value was edited
    CaloriesEdited {
        /// Family the product belongs to
        family_id: String,
        /// The edited product
        product_id: i64,
    },
    /// A product moved between type groups
    TypeReassigned {
        /// Family the product belongs to
        family_id: String,
        /// The reassigned product
        product_id: i64,
        /// Label before the edit
        old_type: Option<String>,
        /// Label after the edit
        new_type: Option<String>,
    },
    /// A receipt and its entries were deleted
    ReceiptDeleted {
        /// Family the receipt belonged to
        family_id: String,
        /// Affected products that still exist after the cascade
        product_ids: Vec<i64>,
        /// Type labels of all affected products, including deleted ones
        type_labels: Vec<String>,
        /// Receipt year
        year: i32,
        /// Receipt month
        month: u32,
    },
    /// A receipt's date was corrected
    ReceiptDateChanged {
        /// Family the receipt belongs to
        family_id: String,
        /// Products whose entries were re-dated
        product_ids: Vec<i64>,
        /// Type labels of the affected products
        type_labels: Vec<String>,
        /// Year before the correction
        old_year: i32,
        /// Month before the correction
        old_month: u32,
        /// Year after the correction
        new_year: i32,
        /// Month after the correction
        new_month: u32,
    },
    /// A type was manually marked as restocked (synthetic purchases inserted)
    TypeRestocked {
        /// Family the type belongs to
        family_id: String,
        /// The restocked type label
        type_label: String,
    },
    /// A type was manually marked as depleted early
    TypeDepletedEarly {
        /// Family the type belongs to
        family_id: String,
        /// The depleted type label
        type_label: String,
    },
}

/// Outcome of a bulk recompute sweep. Per-entity failures are collected, not
/// propagated: one broken type or month must never block the others.
#[derive(Debug, Clone, Default)]
pub struct RecomputeReport {
    /// Products whose cadence cache was refreshed
    pub products_refreshed: usize,
    /// Type cache rows recomputed
    pub types_refreshed: usize,
    /// Monthly cache rows recomputed
    pub months_refreshed: usize,
    /// `(entity description, error message)` per failed refresh
    pub failures: Vec<(String, String)>,
}

/// Performs the refresh set for one mutation event.
///
/// # Errors
/// Returns the first refresh error; the triggering mutation is already
/// committed, so a failed refresh leaves the caches stale but correctable
/// by [`recompute_family`].
pub async fn refresh(db: &DatabaseConnection, event: MutationEvent) -> Result<()> {
    let today = Utc::now().date_naive();
    match event {
        MutationEvent::ReceiptApplied {
            family_id,
            product_ids,
            type_labels,
            year,
            month,
        }
        | MutationEvent::ReceiptDeleted {
            family_id,
            product_ids,
            type_labels,
            year,
            month,
        } => {
            for product_id in product_ids {
                type_cache::refresh_product_cadence(db, product_id, today).await?;
            }
            for label in type_labels {
                type_cache::recompute_type(db, &family_id, &label, today).await?;
            }
            monthly_cache::recompute_month(db, &family_id, year, month).await?;
        }
        MutationEvent::CaloriesEdited {
            family_id,
            product_id,
        } => {
            for (year, month) in monthly_cache::months_for_product(db, product_id).await? {
                monthly_cache::recompute_month(db, &family_id, year, month).await?;
            }
        }
        MutationEvent::TypeReassigned {
            family_id,
            product_id,
            old_type,
            new_type,
        } => {
            type_cache::refresh_product_cadence(db, product_id, today).await?;
            let labels: BTreeSet<String> = old_type.into_iter().chain(new_type).collect();
            for label in labels {
                type_cache::recompute_type(db, &family_id, &label, today).await?;
            }
        }
        MutationEvent::ReceiptDateChanged {
            family_id,
            product_ids,
            type_labels,
            old_year,
            old_month,
            new_year,
            new_month,
        } => {
            for product_id in product_ids {
                type_cache::refresh_product_cadence(db, product_id, today).await?;
            }
            for label in type_labels {
                type_cache::recompute_type(db, &family_id, &label, today).await?;
            }
            monthly_cache::recompute_month(db, &family_id, old_year, old_month).await?;
            if (new_year, new_month) != (old_year, old_month) {
                monthly_cache::recompute_month(db, &family_id, new_year, new_month).await?;
            }
        }
        MutationEvent::TypeRestocked {
            family_id,
            type_label,
        } => {
            type_cache::recompute_type(db, &family_id, &type_label, today).await?;
        }
        MutationEvent::TypeDepletedEarly {
            family_id,
            type_label,
        } => {
            type_cache::mark_depleted_early(db, &family_id, &type_label).await?;
        }
    }
    Ok(())
}

/// Applies a receipt to the ledger and refreshes the affected caches before
/// returning.
///
/// # Errors
/// Returns an error if the ledger write or any refresh fails.
pub async fn apply_receipt<M: TypeMatcher>(
    db: &DatabaseConnection,
    family_id: &str,
    date: NaiveDate,
    items: &[ParsedItem],
    matcher: &M,
) -> Result<receipt::Model> {
    let (receipt_row, event) = ledger::apply_receipt(db, family_id, date, items, matcher).await?;
    refresh(db, event).await?;
    Ok(receipt_row)
}

/// Applies a manual product edit and refreshes the affected caches.
///
/// # Errors
/// Returns an error if the edit or any refresh fails.
pub async fn update_product(
    db: &DatabaseConnection,
    product_id: i64,
    patch: ProductPatch,
) -> Result<product::Model> {
    let (product_row, events) = ledger::update_product(db, product_id, patch).await?;
    for event in events {
        refresh(db, event).await?;
    }
    Ok(product_row)
}

/// Deletes a receipt (cascading) and refreshes the affected caches.
///
/// # Errors
/// Returns an error if the delete or any refresh fails.
pub async fn delete_receipt(db: &DatabaseConnection, receipt_id: i64) -> Result<()> {
    let event = ledger::delete_receipt(db, receipt_id).await?;
    refresh(db, event).await
}

/// Corrects a receipt's date and refreshes both affected months.
///
/// # Errors
/// Returns an error if the correction or any refresh fails.
pub async fn update_receipt_date(
    db: &DatabaseConnection,
    receipt_id: i64,
    new_date: NaiveDate,
) -> Result<()> {
    let event = ledger::update_receipt_date(db, receipt_id, new_date).await?;
    refresh(db, event).await
}

/// Marks every product of a type as restocked today and refreshes the type.
///
/// # Errors
/// Returns an error if the label is unknown or a write/refresh fails.
pub async fn mark_type_restocked(
    db: &DatabaseConnection,
    family_id: &str,
    label: &str,
) -> Result<()> {
    let today = Utc::now().date_naive();
    let event = ledger::mark_type_restocked(db, family_id, label, today).await?;
    refresh(db, event).await
}

/// Forces a type's cached status to `ending-soon` until the next real
/// purchase resets it via the normal path.
///
/// # Errors
/// Returns an error if the label is unknown or the write fails.
pub async fn mark_type_depleted_early(
    db: &DatabaseConnection,
    family_id: &str,
    label: &str,
) -> Result<()> {
    refresh(
        db,
        MutationEvent::TypeDepletedEarly {
            family_id: family_id.to_string(),
            type_label: label.to_string(),
        },
    )
    .await
}

/// Rebuilds every derived cache for one family: every product's cadence,
/// every type row, every month with at least one receipt.
///
/// The sweep is idempotent and safe to run concurrently with itself; a
/// failed entity is recorded in the report and skipped, never fatal.
///
/// # Errors
/// Returns an error only if the initial entity listing fails.
pub async fn recompute_family(db: &DatabaseConnection, family_id: &str) -> Result<RecomputeReport> {
    let today = Utc::now().date_naive();
    let mut report = RecomputeReport::default();

    for product_row in ledger::products_for_family(db, family_id).await? {
        match type_cache::refresh_product_cadence(db, product_row.id, today).await {
            Ok(_) => report.products_refreshed += 1,
            Err(e) => {
                warn!(product_id = product_row.id, error = %e, "product cadence refresh failed");
                report
                    .failures
                    .push((format!("product {}", product_row.id), e.to_string()));
            }
        }
    }

    for label in type_cache::labels_for_family(db, family_id).await? {
        match type_cache::recompute_type(db, family_id, &label, today).await {
            Ok(_) => report.types_refreshed += 1,
            Err(e) => {
                warn!(label = %label, error = %e, "type cache recompute failed");
                report.failures.push((format!("type {label}"), e.to_string()));
            }
        }
    }

    for (year, month) in monthly_cache::months_with_receipts(db, family_id).await? {
        match monthly_cache::recompute_month(db, family_id, year, month).await {
            Ok(_) => report.months_refreshed += 1,
            Err(e) => {
                warn!(year, month, error = %e, "monthly cache recompute failed");
                report
                    .failures
                    .push((format!("month {year}-{month:02}"), e.to_string()));
            }
        }
    }

    info!(
        family_id,
        products = report.products_refreshed,
        types = report.types_refreshed,
        months = report.months_refreshed,
        failures = report.failures.len(),
        "family recompute finished"
    );
    Ok(report)
}
