//! Purchase entry entity - One item on one receipt.
//!
//! Entries are immutable except for their date, which is rewritten when the
//! owning receipt's date is corrected. The date is the sole input to cadence
//! calculation. Entries created by "mark as restocked" carry no receipt
//! reference; real entries cascade-delete with their receipt.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Purchase entry database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_entries")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tenant boundary - all queries must filter on this
    pub family_id: String,
    /// ID of the product this entry belongs to
    pub product_id: i64,
    /// ID of the receipt that produced this entry; None for synthetic entries
    pub receipt_id: Option<i64>,
    /// Purchase date
    pub date: Date,
    /// Quantity in the item's stated unit (count, kilograms, liters, ...)
    pub quantity: f64,
    /// Unit the quantity is expressed in (e.g., "piece", "kg", "l")
    pub unit: String,
    /// Total paid for this line, never a recomputed unit price
    pub total_price: f64,
    /// Derived unit price: `total_price / quantity`, or `total_price` if the quantity is invalid
    pub unit_price: f64,
    /// When the entry was created
    pub created_at: DateTime,
}

/// Defines relationships between `PurchaseEntry` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    /// Each real entry belongs to one receipt
    #[sea_orm(
        belongs_to = "super::receipt::Entity",
        from = "Column::ReceiptId",
        to = "super::receipt::Column::Id"
    )]
    Receipt,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::receipt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receipt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
