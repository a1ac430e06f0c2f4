//! Receipt ingestion pipeline - From uploaded image to applied ledger receipt.
//!
//! Every upload becomes a pending receipt row that walks a strict state
//! machine: `pending -> processing -> completed | failed`, where `failed` is
//! retryable until the attempt ceiling turns it into the terminal
//! `permanently-failed`. The attempt counter is bumped *before* the
//! extraction call, so a crash mid-extraction still counts against the
//! ceiling; rows stuck in `processing` past the configured timeout are
//! reset to `failed` by [`reset_stale`].
//!
//! The extraction service itself sits behind [`ReceiptExtractor`]: the
//! pipeline only ever sees raw response text and pushes it through
//! [`normalize`](crate::core::extraction::normalize).

use crate::{
    config::ingestion::IngestionConfig,
    core::{extraction, ledger, matcher::TypeMatcher, orchestrator},
    entities::{PendingReceipt, pending_receipt},
    errors::{Error, Result},
};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{DatabaseConnection, QueryOrder, Set, prelude::*};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Lifecycle states of a pending receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    /// Submitted, not yet picked up
    Pending,
    /// An extraction attempt is in flight
    Processing,
    /// Extraction succeeded and the receipt was applied to the ledger
    Completed,
    /// The last attempt failed; eligible for retry
    Failed,
    /// The attempt ceiling was reached; terminal
    PermanentlyFailed,
}

impl PendingStatus {
    /// Database representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PermanentlyFailed => "permanently-failed",
        }
    }

    /// Parses a stored status string; unknown strings are treated as
    /// retryable failures rather than rejected.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "permanently-failed" => Self::PermanentlyFailed,
            _ => Self::Failed,
        }
    }
}

/// Abstraction over the receipt-image extraction service. Implementations
/// return the raw response text; normalization and validation happen in the
/// pipeline, not in the extractor.
pub trait ReceiptExtractor {
    /// Runs extraction for one image and returns the raw response text.
    fn extract(&self, image_ref: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Records a newly uploaded receipt image as a pending receipt.
///
/// # Errors
/// Returns an error if the insert fails.
pub async fn submit_receipt_image(
    db: &DatabaseConnection,
    family_id: &str,
    image_ref: &str,
    uploader_id: Option<&str>,
) -> Result<pending_receipt::Model> {
    let now = Utc::now().naive_utc();
    let row = pending_receipt::ActiveModel {
        family_id: Set(family_id.to_string()),
        image_ref: Set(image_ref.to_string()),
        uploader_id: Set(uploader_id.map(ToString::to_string)),
        status: Set(PendingStatus::Pending.as_str().to_string()),
        attempts: Set(0),
        last_error: Set(None),
        payload: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(pending_id = row.id, family_id, "receipt image submitted");
    Ok(row)
}

/// Runs one extraction attempt for a pending receipt.
///
/// Only `pending` and `failed` rows are eligible, and the claim is a guarded
/// conditional update, so two concurrent calls for the same row cannot both
/// start an attempt. A row that already spent its attempt budget is moved to
/// `permanently-failed` without calling the extractor. Extraction,
/// normalization and ledger failures mark the row `failed` and return `Ok`
/// with the updated row; the failure is state, not an error of the pipeline
/// itself. Once the ledger write commits the row is marked `completed`
/// before the cache refresh runs: a retryable status at that point would
/// re-apply the receipt on the next attempt and duplicate its entries, so a
/// refresh failure is only logged and left for `recompute_family` to repair.
///
/// # Errors
/// Returns an error for an unknown id, a non-retryable status, or a
/// database failure.
pub async fn process_pending<E, M>(
    db: &DatabaseConnection,
    pending_id: i64,
    extractor: &E,
    matcher: &M,
    config: &IngestionConfig,
) -> Result<pending_receipt::Model>
where
    E: ReceiptExtractor,
    M: TypeMatcher,
{
    use sea_orm::sea_query::Expr;

    let row = PendingReceipt::find_by_id(pending_id)
        .one(db)
        .await?
        .ok_or(Error::PendingReceiptNotFound { id: pending_id })?;

    match PendingStatus::parse(&row.status) {
        PendingStatus::Pending | PendingStatus::Failed => {}
        _ => {
            return Err(Error::PendingReceiptNotRetryable {
                id: pending_id,
                status: row.status,
            });
        }
    }

    if row.attempts >= config.max_attempts {
        warn!(
            pending_id,
            attempts = row.attempts,
            "attempt ceiling reached, marking permanently failed"
        );
        return set_status(db, row, PendingStatus::PermanentlyFailed, None, None).await;
    }

    // Claim the row before calling out: attempts counts *started* attempts,
    // so a crash between here and the extractor still burns one. The status
    // filter makes the claim conditional; zero rows affected means another
    // call claimed it first.
    let claimed = PendingReceipt::update_many()
        .col_expr(
            pending_receipt::Column::Status,
            Expr::value(PendingStatus::Processing.as_str()),
        )
        .col_expr(
            pending_receipt::Column::Attempts,
            Expr::col(pending_receipt::Column::Attempts).add(1),
        )
        .col_expr(
            pending_receipt::Column::UpdatedAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(pending_receipt::Column::Id.eq(pending_id))
        .filter(pending_receipt::Column::Status.eq(row.status))
        .exec(db)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(Error::PendingReceiptNotRetryable {
            id: pending_id,
            status: PendingStatus::Processing.as_str().to_string(),
        });
    }
    let row = PendingReceipt::find_by_id(pending_id)
        .one(db)
        .await?
        .ok_or(Error::PendingReceiptNotFound { id: pending_id })?;

    let parsed = match fetch_and_normalize(extractor, &row).await {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(pending_id, attempt = row.attempts, error = %e, "extraction attempt failed");
            let message = e.to_string();
            return set_status(db, row, PendingStatus::Failed, Some(message), None).await;
        }
    };
    let payload = serde_json::to_string(&parsed)?;
    let date = parsed.date.unwrap_or_else(|| Utc::now().date_naive());

    let event = match ledger::apply_receipt(db, &row.family_id, date, &parsed.items, matcher).await
    {
        Ok((_, event)) => event,
        Err(e) => {
            warn!(pending_id, attempt = row.attempts, error = %e, "receipt could not be applied");
            let message = e.to_string();
            return set_status(db, row, PendingStatus::Failed, Some(message), None).await;
        }
    };

    // The ledger write is committed; the row must read completed from here
    // on, whatever happens to the caches.
    let row = set_status(db, row, PendingStatus::Completed, None, Some(payload)).await?;
    info!(pending_id, family_id = %row.family_id, "receipt ingested");

    if let Err(e) = orchestrator::refresh(db, event).await {
        warn!(pending_id, error = %e, "cache refresh failed after ingest; caches stay repairable");
    }
    Ok(row)
}

/// The pre-ledger half of an attempt: call the extractor and normalize its
/// response. Failures here are retryable, nothing has been written yet.
async fn fetch_and_normalize<E: ReceiptExtractor>(
    extractor: &E,
    row: &pending_receipt::Model,
) -> Result<extraction::ParsedReceipt> {
    let raw = extractor.extract(&row.image_ref).await?;
    extraction::normalize(&raw)
}

/// Backfills type labels onto products from a completed receipt's stored
/// payload, without re-applying any purchases. Products that already carry
/// a type are left alone.
///
/// # Errors
/// Returns an error for an unknown id, a non-completed row, a missing
/// payload, or a database failure.
pub async fn reprocess_completed(
    db: &DatabaseConnection,
    pending_id: i64,
) -> Result<usize> {
    let row = PendingReceipt::find_by_id(pending_id)
        .one(db)
        .await?
        .ok_or(Error::PendingReceiptNotFound { id: pending_id })?;

    if PendingStatus::parse(&row.status) != PendingStatus::Completed {
        return Err(Error::PendingReceiptNotRetryable {
            id: pending_id,
            status: row.status,
        });
    }
    let payload = row.payload.as_deref().ok_or(Error::PendingReceiptNotRetryable {
        id: pending_id,
        status: "completed without payload".to_string(),
    })?;
    let parsed: extraction::ParsedReceipt = serde_json::from_str(payload)?;

    let mut backfilled = 0usize;
    let mut touched: BTreeSet<String> = BTreeSet::new();
    for item in &parsed.items {
        let Some(label) = item.product_type.as_deref() else {
            continue;
        };
        let Some(product_row) =
            ledger::get_product_by_name(db, &row.family_id, &item.name).await?
        else {
            continue;
        };
        if product_row.product_type.is_some() {
            continue;
        }
        orchestrator::update_product(
            db,
            product_row.id,
            ledger::ProductPatch {
                product_type: Some(Some(label.to_string())),
                ..Default::default()
            },
        )
        .await?;
        touched.insert(label.to_string());
        backfilled += 1;
    }

    info!(pending_id, backfilled, types = touched.len(), "payload backfill finished");
    Ok(backfilled)
}

/// Rows stuck in `processing` whose last status change predates `cutoff`.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn stale_processing(
    db: &DatabaseConnection,
    cutoff: NaiveDateTime,
) -> Result<Vec<pending_receipt::Model>> {
    let rows = PendingReceipt::find()
        .filter(pending_receipt::Column::Status.eq(PendingStatus::Processing.as_str()))
        .filter(pending_receipt::Column::UpdatedAt.lt(cutoff))
        .all(db)
        .await?;
    Ok(rows)
}

/// Moves stale `processing` rows back to `failed` so they become retryable
/// again. The attempt they burned stays counted.
///
/// # Errors
/// Returns an error if a query or write fails.
pub async fn reset_stale(db: &DatabaseConnection, cutoff: NaiveDateTime) -> Result<usize> {
    let rows = stale_processing(db, cutoff).await?;
    let count = rows.len();
    for row in rows {
        warn!(pending_id = row.id, attempts = row.attempts, "resetting stale processing row");
        set_status(
            db,
            row,
            PendingStatus::Failed,
            Some("Processing timed out".to_string()),
            None,
        )
        .await?;
    }
    Ok(count)
}

/// All pending receipts of one family, most recently updated first.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn pending_receipts_for_family(
    db: &DatabaseConnection,
    family_id: &str,
) -> Result<Vec<pending_receipt::Model>> {
    let rows = PendingReceipt::find()
        .filter(pending_receipt::Column::FamilyId.eq(family_id))
        .order_by_desc(pending_receipt::Column::UpdatedAt)
        .all(db)
        .await?;
    Ok(rows)
}

/// Pending receipts of one family whose status changed after `since`. Lets
/// pollers fetch deltas instead of the full list.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn changed_since(
    db: &DatabaseConnection,
    family_id: &str,
    since: NaiveDateTime,
) -> Result<Vec<pending_receipt::Model>> {
    let rows = PendingReceipt::find()
        .filter(pending_receipt::Column::FamilyId.eq(family_id))
        .filter(pending_receipt::Column::UpdatedAt.gt(since))
        .order_by_desc(pending_receipt::Column::UpdatedAt)
        .all(db)
        .await?;
    Ok(rows)
}

async fn set_status(
    db: &DatabaseConnection,
    row: pending_receipt::Model,
    status: PendingStatus,
    last_error: Option<String>,
    payload: Option<String>,
) -> Result<pending_receipt::Model> {
    let mut active: pending_receipt::ActiveModel = row.into();
    active.status = Set(status.as_str().to_string());
    if status == PendingStatus::Completed {
        // A completed row must not carry the message of an earlier attempt.
        active.last_error = Set(None);
    } else if last_error.is_some() {
        active.last_error = Set(last_error);
    }
    if payload.is_some() {
        active.payload = Set(payload);
    }
    active.updated_at = Set(Utc::now().naive_utc());
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::{ledger::get_product_by_name, monthly_cache::month_summary};
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_submit_starts_pending_with_zero_attempts() -> Result<()> {
        let db = setup_test_db().await?;
        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", Some("user-7")).await?;
        assert_eq!(row.status, "pending");
        assert_eq!(row.attempts, 0);
        assert!(row.payload.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_attempt_applies_receipt_and_stores_payload() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig::default();
        let extractor = FixedExtractor::new(
            r#"<thinking>scanning the photo</thinking>
```json
{"items": [{"name": "Whole Milk", "quantity": "1", "price": "1,50",
            "calories": 640, "productType": "Milk"}],
 "total": 1.50, "date": "2024-10-05"}
```"#,
        );

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let row = process_pending(&db, row.id, &extractor, &matcher(), &config).await?;

        assert_eq!(row.status, "completed");
        assert_eq!(row.attempts, 1);
        assert!(row.payload.as_deref().unwrap().contains("Whole Milk"));

        // The ledger and the caches already reflect the receipt.
        let milk = get_product_by_name(&db, FAMILY, "whole milk").await?.unwrap();
        assert_eq!(milk.product_type.as_deref(), Some("milk"));
        assert_eq!(milk.unit_price, 1.50);
        let october = month_summary(&db, FAMILY, 2024, 10).await?;
        assert_eq!(october.receipts_count, 1);
        assert_eq!(october.total_calories, 640.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_attempt_is_marked_not_raised() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig::default();

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let row = process_pending(&db, row.id, &FailingExtractor, &matcher(), &config).await?;

        assert_eq!(row.status, "failed");
        assert_eq!(row.attempts, 1);
        assert!(row.last_error.as_deref().unwrap().contains("unreachable"));
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_after_failure_applies_receipt_once() -> Result<()> {
        use crate::entities::{PurchaseEntry, Receipt};

        let db = setup_test_db().await?;
        let config = IngestionConfig::default();
        let body = r#"{"items": [{"name": "Milk", "price": 1.5}], "total": 1.5, "date": "2024-10-05"}"#;

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let row = process_pending(&db, row.id, &FailingExtractor, &matcher(), &config).await?;
        assert_eq!(row.status, "failed");
        assert!(row.last_error.is_some());

        let row = process_pending(&db, row.id, &FixedExtractor::new(body), &matcher(), &config)
            .await?;
        assert_eq!(row.status, "completed");
        assert_eq!(row.attempts, 2);
        // The earlier attempt's message is gone along with its status.
        assert_eq!(row.last_error, None);

        // Exactly one application of the receipt made it to the ledger.
        assert_eq!(Receipt::find().count(&db).await?, 1);
        assert_eq!(PurchaseEntry::find().count(&db).await?, 1);
        let milk = get_product_by_name(&db, FAMILY, "milk").await?.unwrap();
        assert_eq!(milk.purchase_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_processing_rows_cannot_be_claimed_again() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig::default();

        // Another worker holds the claim.
        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let mut active: pending_receipt::ActiveModel = row.into();
        active.status = Set("processing".to_string());
        active.attempts = Set(1);
        let row = active.update(&db).await?;

        let err = process_pending(&db, row.id, &FailingExtractor, &matcher(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PendingReceiptNotRetryable { .. }));

        // The losing call burned nothing.
        let row = PendingReceipt::find_by_id(row.id).one(&db).await?.unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.status, "processing");
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_response_is_a_failed_attempt() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig::default();
        let extractor = FixedExtractor::new("sorry, I could not read the image");

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let row = process_pending(&db, row.id, &extractor, &matcher(), &config).await?;

        assert_eq!(row.status, "failed");
        assert!(row.last_error.as_deref().unwrap().contains("not valid JSON"));
        Ok(())
    }

    #[tokio::test]
    async fn test_attempt_ceiling_turns_terminal() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig {
            max_attempts: 2,
            ..Default::default()
        };

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let row = process_pending(&db, row.id, &FailingExtractor, &matcher(), &config).await?;
        let row = process_pending(&db, row.id, &FailingExtractor, &matcher(), &config).await?;
        assert_eq!(row.attempts, 2);
        assert_eq!(row.status, "failed");

        // Third call hits the ceiling before the extractor is consulted.
        let row = process_pending(&db, row.id, &FailingExtractor, &matcher(), &config).await?;
        assert_eq!(row.status, "permanently-failed");
        assert_eq!(row.attempts, 2);

        // Terminal means terminal.
        let err = process_pending(&db, row.id, &FailingExtractor, &matcher(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PendingReceiptNotRetryable { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_rows_are_not_reprocessable() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig::default();
        let extractor = FixedExtractor::new(
            r#"{"items": [{"name": "Milk", "price": 1.5}], "total": 1.5, "date": "2024-10-05"}"#,
        );

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let row = process_pending(&db, row.id, &extractor, &matcher(), &config).await?;
        assert_eq!(row.status, "completed");

        let err = process_pending(&db, row.id, &extractor, &matcher(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PendingReceiptNotRetryable { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_date_falls_back_to_today() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig::default();
        let extractor = FixedExtractor::new(
            r#"{"items": [{"name": "Milk", "price": 1.5}], "total": 1.5}"#,
        );

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        process_pending(&db, row.id, &extractor, &matcher(), &config).await?;

        let milk = get_product_by_name(&db, FAMILY, "milk").await?.unwrap();
        assert_eq!(milk.last_purchase, Utc::now().date_naive());
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_stale_returns_rows_to_failed() -> Result<()> {
        let db = setup_test_db().await?;

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let mut active: pending_receipt::ActiveModel = row.into();
        active.status = Set("processing".to_string());
        active.attempts = Set(1);
        active.updated_at = Set(Utc::now().naive_utc() - chrono::Duration::minutes(30));
        let row = active.update(&db).await?;

        let cutoff = Utc::now().naive_utc() - chrono::Duration::minutes(10);
        assert_eq!(stale_processing(&db, cutoff).await?.len(), 1);
        assert_eq!(reset_stale(&db, cutoff).await?, 1);

        let row = PendingReceipt::find_by_id(row.id).one(&db).await?.unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.attempts, 1);
        assert_eq!(row.last_error.as_deref(), Some("Processing timed out"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_processing_rows_are_not_reset() -> Result<()> {
        let db = setup_test_db().await?;

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let mut active: pending_receipt::ActiveModel = row.into();
        active.status = Set("processing".to_string());
        active.updated_at = Set(Utc::now().naive_utc());
        active.update(&db).await?;

        let cutoff = Utc::now().naive_utc() - chrono::Duration::minutes(10);
        assert_eq!(reset_stale(&db, cutoff).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_reprocess_backfills_types_without_duplicating_entries() -> Result<()> {
        let db = setup_test_db().await?;
        let config = IngestionConfig::default();
        // First ingestion ran before the extractor reported types; simulate
        // by completing with a payload that carries a type the product lacks.
        let extractor = FixedExtractor::new(
            r#"{"items": [{"name": "Brie", "price": 4.0, "productType": "cheese"}],
                "total": 4.0, "date": "2024-10-05"}"#,
        );

        let row = submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let row = process_pending(&db, row.id, &extractor, &matcher(), &config).await?;

        // Strip the type to model a legacy pre-type product.
        let brie = get_product_by_name(&db, FAMILY, "brie").await?.unwrap();
        orchestrator::update_product(
            &db,
            brie.id,
            ledger::ProductPatch {
                product_type: Some(None),
                ..Default::default()
            },
        )
        .await?;

        let backfilled = reprocess_completed(&db, row.id).await?;
        assert_eq!(backfilled, 1);

        let brie = get_product_by_name(&db, FAMILY, "brie").await?.unwrap();
        assert_eq!(brie.product_type.as_deref(), Some("cheese"));
        assert_eq!(brie.purchase_count, 1);

        // Idempotent: a second pass finds nothing left to backfill.
        assert_eq!(reprocess_completed(&db, row.id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_changed_since_returns_only_newer_rows() -> Result<()> {
        let db = setup_test_db().await?;

        submit_receipt_image(&db, FAMILY, "images/r1.jpg", None).await?;
        let mark = Utc::now().naive_utc() + chrono::Duration::seconds(1);
        assert!(changed_since(&db, FAMILY, mark).await?.is_empty());

        let early = Utc::now().naive_utc() - chrono::Duration::seconds(60);
        assert_eq!(changed_since(&db, FAMILY, early).await?.len(), 1);
        Ok(())
    }
}
