//! Receipt entity - One successfully ingested shopping receipt.
//!
//! Created only when ingestion succeeds. The date may be corrected post-hoc,
//! which cascades to every purchase entry the receipt produced.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Receipt database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receipts")]
pub struct Model {
    /// Unique identifier for the receipt
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tenant boundary - all queries must filter on this
    pub family_id: String,
    /// Purchase date printed on the receipt (correctable)
    pub date: Date,
    /// Number of line items applied to the ledger
    pub item_count: i32,
    /// Sum of the line items' total prices
    pub total_amount: f64,
    /// Lifecycle status, `"processed"` for ledger-applied receipts
    pub status: String,
    /// When the receipt was created
    pub created_at: DateTime,
}

/// Defines relationships between Receipt and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One receipt has many purchase entries
    #[sea_orm(has_many = "super::purchase_entry::Entity")]
    PurchaseEntries,
}

impl Related<super::purchase_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
