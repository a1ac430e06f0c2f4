//! Product entity - One tracked grocery item per family.
//!
//! A product is created on the first purchase of a new name and mutated on
//! every subsequent purchase of the same name (matched case-insensitively).
//! The `avg_days`, `predicted_end` and `status` columns are a cadence cache
//! derived from the product's purchase history; they are owned by the
//! recalculation orchestrator, never edited by hand.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Unique identifier for the product
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tenant boundary - all queries must filter on this
    pub family_id: String,
    /// Display name of the product (e.g., "Milk", "Greek Yogurt")
    pub name: String,
    /// Name exactly as printed on the receipt
    pub original_name: String,
    /// Optional lowercase type label used for grouping (e.g., "milk", "bread")
    pub product_type: Option<String>,
    /// Date of the most recent purchase
    pub last_purchase: Date,
    /// Unit price from the most recent purchase
    pub unit_price: f64,
    /// Calories for the last purchased quantity (not per 100g/100ml)
    pub calories: f64,
    /// Number of recorded purchases
    pub purchase_count: i32,
    /// Cached average days between purchases (None until computable)
    pub avg_days: Option<i32>,
    /// Cached predicted depletion date (None until computable)
    pub predicted_end: Option<Date>,
    /// Cached status: `"ok"`, `"ending-soon"` or `"calculating"`
    pub status: String,
    /// When the product was created
    pub created_at: DateTime,
    /// When the product was last modified
    pub updated_at: DateTime,
}

/// Defines relationships between Product and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One product has many purchase entries
    #[sea_orm(has_many = "super::purchase_entry::Entity")]
    PurchaseEntries,
}

impl Related<super::purchase_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
