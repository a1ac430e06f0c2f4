//! Pending receipt entity - The ingestion state-machine instance.
//!
//! One row per uploaded image, never merged with [`super::receipt`] until
//! extraction succeeds. Status transitions are
//! `pending -> processing -> completed | failed`, with `failed` retryable and
//! `permanently-failed` terminal once the attempt ceiling is reached.
//! `updated_at` doubles as the staleness signal for crashes mid-extraction.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Pending receipt database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_receipts")]
pub struct Model {
    /// Unique identifier for the pending receipt
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tenant boundary - all queries must filter on this
    pub family_id: String,
    /// Opaque reference to the uploaded receipt image
    pub image_ref: String,
    /// Who uploaded the image, if known
    pub uploader_id: Option<String>,
    /// `"pending"`, `"processing"`, `"completed"`, `"failed"` or `"permanently-failed"`
    pub status: String,
    /// How many processing attempts have been started
    pub attempts: i32,
    /// Message of the most recent failure, if any
    pub last_error: Option<String>,
    /// Normalized extraction payload (JSON), stored on success for audit and backfill
    pub payload: Option<String>,
    /// When the image was submitted
    pub created_at: DateTime,
    /// When the status last changed
    pub updated_at: DateTime,
}

/// Pending receipts reference no other table
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
