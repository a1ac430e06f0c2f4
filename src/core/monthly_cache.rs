//! Monthly aggregation cache - Spend and calorie totals per calendar month.
//!
//! Each row summarizes one (family, year, month): total spend over the
//! month's receipts, total calories over its purchase entries, average
//! calories per day and the receipt count. Calories are joined to each
//! product's *current* calorie value, deliberately not a historical
//! snapshot, so editing a product's calories retroactively changes past
//! months' totals. Rows are always derivable from the ledger; readers must
//! treat a missing row and an all-zero row identically, which
//! [`month_summary`] guarantees.

use crate::{
    entities::{
        MonthlyAggregate, Product, PurchaseEntry, Receipt, monthly_aggregate, product,
        purchase_entry, receipt,
    },
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, Set, prelude::*};
use std::collections::{BTreeSet, HashMap};

/// Plain-data view of one month's aggregate, zero-filled for missing rows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonthSummary {
    /// Sum of receipt totals in the month
    pub total_spent: f64,
    /// Sum of `product.calories * entry.quantity` over the month's entries
    pub total_calories: f64,
    /// `round(total_calories / days in month)`
    pub avg_calories_per_day: i32,
    /// Number of receipts dated in the month
    pub receipts_count: i32,
}

/// First day of the month and first day of the following month.
fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| Error::Config {
        message: format!("Invalid year/month: {year}-{month}"),
    })?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| Error::Config {
        message: format!("Invalid year/month: {year}-{month}"),
    })?;
    Ok((start, end))
}

/// Recomputes and upserts the aggregate row for one (family, year, month).
///
/// # Errors
/// Returns an error for an invalid month or a failed query/write.
pub async fn recompute_month(
    db: &DatabaseConnection,
    family_id: &str,
    year: i32,
    month: u32,
) -> Result<monthly_aggregate::Model> {
    let (start, end) = month_bounds(year, month)?;

    let receipts = Receipt::find()
        .filter(receipt::Column::FamilyId.eq(family_id))
        .filter(receipt::Column::Date.gte(start))
        .filter(receipt::Column::Date.lt(end))
        .all(db)
        .await?;
    let total_spent: f64 = receipts.iter().map(|r| r.total_amount).sum();

    let entries = PurchaseEntry::find()
        .filter(purchase_entry::Column::FamilyId.eq(family_id))
        .filter(purchase_entry::Column::Date.gte(start))
        .filter(purchase_entry::Column::Date.lt(end))
        .all(db)
        .await?;

    // Join against the products' current calorie values.
    let product_ids: BTreeSet<i64> = entries.iter().map(|e| e.product_id).collect();
    let calories_by_product: HashMap<i64, f64> = Product::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p.calories))
        .collect();

    let total_calories: f64 = entries
        .iter()
        .map(|entry| {
            calories_by_product.get(&entry.product_id).copied().unwrap_or(0.0) * entry.quantity
        })
        .sum();

    let days_in_month = (end - start).num_days();
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let avg_calories_per_day = (total_calories / days_in_month as f64).round() as i32;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let receipts_count = receipts.len() as i32;
    upsert_month_row(
        db,
        family_id,
        year,
        month,
        total_spent,
        total_calories,
        avg_calories_per_day,
        receipts_count,
    )
    .await
}

/// Reads one month's aggregate, returning zeros when no row exists. Callers
/// never need to distinguish "no row" from "all-zero row".
///
/// # Errors
/// Returns an error if the query fails.
pub async fn month_summary(
    db: &DatabaseConnection,
    family_id: &str,
    year: i32,
    month: u32,
) -> Result<MonthSummary> {
    #[allow(clippy::cast_possible_wrap)]
    let row = MonthlyAggregate::find()
        .filter(monthly_aggregate::Column::FamilyId.eq(family_id))
        .filter(monthly_aggregate::Column::Year.eq(year))
        .filter(monthly_aggregate::Column::Month.eq(month as i32))
        .one(db)
        .await?;

    Ok(row.map_or_else(MonthSummary::default, |row| MonthSummary {
        total_spent: row.total_spent,
        total_calories: row.total_calories,
        avg_calories_per_day: row.avg_calories_per_day,
        receipts_count: row.receipts_count,
    }))
}

/// Every (year, month) with at least one receipt for the family.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn months_with_receipts(
    db: &DatabaseConnection,
    family_id: &str,
) -> Result<Vec<(i32, u32)>> {
    let months: BTreeSet<(i32, u32)> = Receipt::find()
        .filter(receipt::Column::FamilyId.eq(family_id))
        .all(db)
        .await?
        .into_iter()
        .map(|r| (r.date.year(), r.date.month()))
        .collect();
    Ok(months.into_iter().collect())
}

/// Every (year, month) containing purchase history for one product. Used to
/// refresh the months affected by a retroactive calorie edit.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn months_for_product(
    db: &DatabaseConnection,
    product_id: i64,
) -> Result<Vec<(i32, u32)>> {
    let months: BTreeSet<(i32, u32)> = PurchaseEntry::find()
        .filter(purchase_entry::Column::ProductId.eq(product_id))
        .all(db)
        .await?
        .into_iter()
        .map(|e| (e.date.year(), e.date.month()))
        .collect();
    Ok(months.into_iter().collect())
}

#[allow(clippy::too_many_arguments)]
async fn upsert_month_row(
    db: &DatabaseConnection,
    family_id: &str,
    year: i32,
    month: u32,
    total_spent: f64,
    total_calories: f64,
    avg_calories_per_day: i32,
    receipts_count: i32,
) -> Result<monthly_aggregate::Model> {
    let now = Utc::now().naive_utc();
    #[allow(clippy::cast_possible_wrap)]
    let month = month as i32;

    let existing = MonthlyAggregate::find()
        .filter(monthly_aggregate::Column::FamilyId.eq(family_id))
        .filter(monthly_aggregate::Column::Year.eq(year))
        .filter(monthly_aggregate::Column::Month.eq(month))
        .one(db)
        .await?;

    let row = if let Some(existing) = existing {
        let mut active: monthly_aggregate::ActiveModel = existing.into();
        active.total_spent = Set(total_spent);
        active.total_calories = Set(total_calories);
        active.avg_calories_per_day = Set(avg_calories_per_day);
        active.receipts_count = Set(receipts_count);
        active.updated_at = Set(now);
        active.update(db).await?
    } else {
        monthly_aggregate::ActiveModel {
            family_id: Set(family_id.to_string()),
            year: Set(year),
            month: Set(month),
            total_spent: Set(total_spent),
            total_calories: Set(total_calories),
            avg_calories_per_day: Set(avg_calories_per_day),
            receipts_count: Set(receipts_count),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?
    };
    Ok(row)
}
