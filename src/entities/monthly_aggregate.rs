//! Monthly aggregate entity - Materialized per-month spend/calorie cache.
//!
//! Keyed by (family, year, month). Always derivable by pure recomputation
//! from the month's receipts and purchase entries; a month with no receipts
//! is represented by an all-zero row or no row at all, and readers must
//! treat both identically. Owned by the recalculation orchestrator.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Monthly aggregate database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monthly_aggregates")]
pub struct Model {
    /// Unique identifier for the cache row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tenant boundary - all queries must filter on this
    pub family_id: String,
    /// Calendar year this row summarizes
    pub year: i32,
    /// Calendar month (1-12) this row summarizes
    pub month: i32,
    /// Sum of receipt totals in the month
    pub total_spent: f64,
    /// Sum of `product.calories * entry.quantity` over the month's entries
    pub total_calories: f64,
    /// `round(total_calories / days in month)`
    pub avg_calories_per_day: i32,
    /// Number of receipts dated in the month
    pub receipts_count: i32,
    /// When the row was last recomputed
    pub updated_at: DateTime,
}

/// Cache rows reference no other table
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
