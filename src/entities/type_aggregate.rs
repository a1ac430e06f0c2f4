//! Type aggregate entity - Materialized per-type status cache.
//!
//! Keyed by (family, product type). Always derivable by pure recomputation
//! from the products sharing the type; never the source of truth. Owned by
//! the recalculation orchestrator.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Type aggregate database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "type_aggregates")]
pub struct Model {
    /// Unique identifier for the cache row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tenant boundary - all queries must filter on this
    pub family_id: String,
    /// Lowercase type label this row summarizes
    pub product_type: String,
    /// Pooled status: `"ok"`, `"ending-soon"` or `"calculating"`
    pub status: String,
    /// Number of products carrying this type label
    pub member_count: i32,
    /// When the row was last recomputed
    pub updated_at: DateTime,
}

/// Cache rows reference no other table
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
