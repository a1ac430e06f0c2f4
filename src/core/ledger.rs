//! Ledger business logic - The canonical purchase store.
//!
//! The ledger exclusively owns products, purchase entries and receipts. Every
//! mutation here returns a [`MutationEvent`] describing what changed; callers
//! hand that event to the orchestrator, which refreshes the derived caches
//! synchronously before the mutation is reported as done. The ledger itself
//! performs no derived computation.
//!
//! Receipt application is all-or-nothing: one database transaction covers the
//! receipt row, every product create/update and every purchase entry, so a
//! failed line item can never leave the receipt's item count inconsistent
//! with its recorded entries. The same transaction serializes concurrent
//! read-modify-writes of `purchase_count`/`last_purchase` for a shared
//! product name.

use crate::{
    core::{extraction::ParsedItem, matcher::TypeMatcher, orchestrator::MutationEvent},
    entities::{Product, PurchaseEntry, Receipt, product, purchase_entry, receipt},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::{BTreeSet, HashMap};

/// Status of a receipt that has been applied to the ledger.
pub const RECEIPT_STATUS_PROCESSED: &str = "processed";

fn ledger_write(e: DbErr) -> Error {
    Error::LedgerWriteFailed {
        message: e.to_string(),
    }
}

/// Derived unit price: `price / quantity`, falling back to the total price
/// when the quantity is zero or invalid.
#[must_use]
pub fn unit_price_for(price: f64, quantity: f64) -> f64 {
    if quantity > 0.0 && quantity.is_finite() {
        price / quantity
    } else {
        price
    }
}

/// Fields of a product that may be edited manually.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    /// New calorie value for the last purchased quantity
    pub calories: Option<f64>,
    /// New type label; `Some(None)` clears the label
    pub product_type: Option<Option<String>>,
}

/// Applies a parsed receipt to the ledger as one unit.
///
/// Each item is matched to an existing product by case-insensitive exact
/// name within the family. A match bumps the product's purchase count and,
/// when the receipt is not older than the product's history, refreshes its
/// last-purchase date, unit price and calories. No match creates a new
/// product with status `calculating`; an item without a type label gets one
/// inferred from the family's labeled products via `matcher`.
///
/// # Errors
/// Returns [`Error::LedgerWriteFailed`] if any write fails; nothing is
/// applied in that case.
pub async fn apply_receipt<M: TypeMatcher>(
    db: &DatabaseConnection,
    family_id: &str,
    date: NaiveDate,
    items: &[ParsedItem],
    matcher: &M,
) -> Result<(receipt::Model, MutationEvent)> {
    let txn = db.begin().await?;
    let now = Utc::now().naive_utc();

    let total_amount: f64 = items.iter().map(|item| item.price).sum();
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let receipt_row = receipt::ActiveModel {
        family_id: Set(family_id.to_string()),
        date: Set(date),
        item_count: Set(items.len() as i32),
        total_amount: Set(total_amount),
        status: Set(RECEIPT_STATUS_PROCESSED.to_string()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(ledger_write)?;

    // One lookup for the whole receipt; the map is kept current so a second
    // line with the same name matches the product the first line created.
    let existing = Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .all(&txn)
        .await?;
    let mut by_name: HashMap<String, product::Model> = existing
        .iter()
        .map(|p| (p.name.to_lowercase(), p.clone()))
        .collect();
    let mut labeled: Vec<(String, String)> = existing
        .iter()
        .filter_map(|p| p.product_type.clone().map(|label| (p.name.clone(), label)))
        .collect();

    let mut product_ids = Vec::new();
    let mut type_labels = BTreeSet::new();

    for item in items {
        let key = item.name.to_lowercase();
        let unit_price = unit_price_for(item.price, item.quantity);

        let model = if let Some(found) = by_name.get(&key) {
            record_repeat_purchase(&txn, found, date, unit_price, item.calories, now).await?
        } else {
            let product_type = item
                .product_type
                .clone()
                .or_else(|| matcher.infer_type(&item.name, &labeled));

            let created = product::ActiveModel {
                family_id: Set(family_id.to_string()),
                name: Set(item.name.clone()),
                original_name: Set(item.original_name.clone()),
                product_type: Set(product_type),
                last_purchase: Set(date),
                unit_price: Set(unit_price),
                calories: Set(item.calories),
                purchase_count: Set(1),
                avg_days: Set(None),
                predicted_end: Set(None),
                status: Set("calculating".to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ledger_write)?;

            if let Some(label) = &created.product_type {
                labeled.push((created.name.clone(), label.clone()));
            }
            created
        };

        purchase_entry::ActiveModel {
            family_id: Set(family_id.to_string()),
            product_id: Set(model.id),
            receipt_id: Set(Some(receipt_row.id)),
            date: Set(date),
            quantity: Set(item.quantity),
            unit: Set(item.unit.clone()),
            total_price: Set(item.price),
            unit_price: Set(unit_price),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ledger_write)?;

        if !product_ids.contains(&model.id) {
            product_ids.push(model.id);
        }
        if let Some(label) = &model.product_type {
            type_labels.insert(label.clone());
        }
        by_name.insert(key, model);
    }

    txn.commit().await?;

    let event = MutationEvent::ReceiptApplied {
        family_id: family_id.to_string(),
        product_ids,
        type_labels: type_labels.into_iter().collect(),
        year: date.year(),
        month: date.month(),
    };
    Ok((receipt_row, event))
}

/// Bumps the purchase counter and, unless the receipt is older than the
/// product's recorded history, moves last-purchase/price/calories forward.
/// Both writes are value-relative so they compose under concurrent applies.
async fn record_repeat_purchase<C: ConnectionTrait>(
    txn: &C,
    found: &product::Model,
    date: NaiveDate,
    unit_price: f64,
    calories: f64,
    now: chrono::NaiveDateTime,
) -> Result<product::Model> {
    use sea_orm::sea_query::Expr;

    Product::update_many()
        .col_expr(
            product::Column::PurchaseCount,
            Expr::col(product::Column::PurchaseCount).add(1),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(now))
        .filter(product::Column::Id.eq(found.id))
        .exec(txn)
        .await
        .map_err(ledger_write)?;

    Product::update_many()
        .col_expr(product::Column::LastPurchase, Expr::value(date))
        .col_expr(product::Column::UnitPrice, Expr::value(unit_price))
        .col_expr(product::Column::Calories, Expr::value(calories))
        .filter(product::Column::Id.eq(found.id))
        .filter(product::Column::LastPurchase.lte(date))
        .exec(txn)
        .await
        .map_err(ledger_write)?;

    Product::find_by_id(found.id)
        .one(txn)
        .await?
        .ok_or(Error::ProductNotFound { id: found.id })
}

/// Applies a manual edit to a product and reports the resulting events
/// (calorie edits and type reassignments refresh different caches).
///
/// # Errors
/// Returns an error if the product does not exist or the update fails.
pub async fn update_product(
    db: &DatabaseConnection,
    product_id: i64,
    patch: ProductPatch,
) -> Result<(product::Model, Vec<MutationEvent>)> {
    let existing = Product::find_by_id(product_id)
        .one(db)
        .await?
        .ok_or(Error::ProductNotFound { id: product_id })?;

    let mut events = Vec::new();
    let mut active: product::ActiveModel = existing.clone().into();

    if let Some(calories) = patch.calories {
        active.calories = Set(calories);
        events.push(MutationEvent::CaloriesEdited {
            family_id: existing.family_id.clone(),
            product_id,
        });
    }

    if let Some(new_type) = patch.product_type {
        let normalized = new_type
            .map(|label| label.trim().to_lowercase())
            .filter(|label| !label.is_empty());
        if normalized != existing.product_type {
            active.product_type = Set(normalized.clone());
            events.push(MutationEvent::TypeReassigned {
                family_id: existing.family_id.clone(),
                product_id,
                old_type: existing.product_type.clone(),
                new_type: normalized,
            });
        }
    }

    if events.is_empty() {
        return Ok((existing, events));
    }

    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(db).await?;
    Ok((updated, events))
}

/// Deletes a receipt, cascading to its purchase entries and removing any
/// product left with zero remaining entries (no orphan products).
///
/// # Errors
/// Returns an error if the receipt does not exist or a delete fails.
pub async fn delete_receipt(db: &DatabaseConnection, receipt_id: i64) -> Result<MutationEvent> {
    let receipt_row = Receipt::find_by_id(receipt_id)
        .one(db)
        .await?
        .ok_or(Error::ReceiptNotFound { id: receipt_id })?;

    let txn = db.begin().await?;

    let entries = PurchaseEntry::find()
        .filter(purchase_entry::Column::ReceiptId.eq(receipt_id))
        .all(&txn)
        .await?;
    let affected: BTreeSet<i64> = entries.iter().map(|entry| entry.product_id).collect();

    PurchaseEntry::delete_many()
        .filter(purchase_entry::Column::ReceiptId.eq(receipt_id))
        .exec(&txn)
        .await
        .map_err(ledger_write)?;

    let mut surviving_ids = Vec::new();
    let mut type_labels = BTreeSet::new();
    for product_id in affected {
        let Some(product_row) = Product::find_by_id(product_id).one(&txn).await? else {
            continue;
        };
        if let Some(label) = &product_row.product_type {
            type_labels.insert(label.clone());
        }

        let remaining = PurchaseEntry::find()
            .filter(purchase_entry::Column::ProductId.eq(product_id))
            .count(&txn)
            .await?;
        if remaining == 0 {
            product_row.delete(&txn).await.map_err(ledger_write)?;
        } else {
            surviving_ids.push(product_id);
        }
    }

    Receipt::delete_by_id(receipt_id)
        .exec(&txn)
        .await
        .map_err(ledger_write)?;
    txn.commit().await?;

    Ok(MutationEvent::ReceiptDeleted {
        family_id: receipt_row.family_id,
        product_ids: surviving_ids,
        type_labels: type_labels.into_iter().collect(),
        year: receipt_row.date.year(),
        month: receipt_row.date.month(),
    })
}

/// Corrects a receipt's date, rewriting the date on every entry it produced
/// and recomputing each affected product's last-purchase from its *remaining*
/// full history rather than blindly setting it to the new date.
///
/// # Errors
/// Returns an error if the receipt does not exist or a write fails.
pub async fn update_receipt_date(
    db: &DatabaseConnection,
    receipt_id: i64,
    new_date: NaiveDate,
) -> Result<MutationEvent> {
    use sea_orm::sea_query::Expr;

    let receipt_row = Receipt::find_by_id(receipt_id)
        .one(db)
        .await?
        .ok_or(Error::ReceiptNotFound { id: receipt_id })?;
    let old_date = receipt_row.date;

    let txn = db.begin().await?;
    let now = Utc::now().naive_utc();

    let mut active: receipt::ActiveModel = receipt_row.clone().into();
    active.date = Set(new_date);
    active.update(&txn).await.map_err(ledger_write)?;

    let entries = PurchaseEntry::find()
        .filter(purchase_entry::Column::ReceiptId.eq(receipt_id))
        .all(&txn)
        .await?;
    let affected: BTreeSet<i64> = entries.iter().map(|entry| entry.product_id).collect();

    PurchaseEntry::update_many()
        .col_expr(purchase_entry::Column::Date, Expr::value(new_date))
        .filter(purchase_entry::Column::ReceiptId.eq(receipt_id))
        .exec(&txn)
        .await
        .map_err(ledger_write)?;

    let mut product_ids = Vec::new();
    let mut type_labels = BTreeSet::new();
    for product_id in affected {
        let Some(product_row) = Product::find_by_id(product_id).one(&txn).await? else {
            continue;
        };

        // Last purchase comes from the rewritten history, not the new date.
        let latest = PurchaseEntry::find()
            .filter(purchase_entry::Column::ProductId.eq(product_id))
            .order_by_desc(purchase_entry::Column::Date)
            .one(&txn)
            .await?;

        if let Some(label) = &product_row.product_type {
            type_labels.insert(label.clone());
        }
        product_ids.push(product_id);

        if let Some(latest) = latest {
            let mut product_active: product::ActiveModel = product_row.into();
            product_active.last_purchase = Set(latest.date);
            product_active.updated_at = Set(now);
            product_active.update(&txn).await.map_err(ledger_write)?;
        }
    }

    txn.commit().await?;

    Ok(MutationEvent::ReceiptDateChanged {
        family_id: receipt_row.family_id,
        product_ids,
        type_labels: type_labels.into_iter().collect(),
        old_year: old_date.year(),
        old_month: old_date.month(),
        new_year: new_date.year(),
        new_month: new_date.month(),
    })
}

/// Records a manual "mark as restocked": one synthetic purchase entry dated
/// `today` for every product carrying the type label, quantity 1 in each
/// product's most recently used unit. Synthetic entries have no receipt.
///
/// # Errors
/// Returns [`Error::TypeNotFound`] if no product carries the label.
pub async fn mark_type_restocked(
    db: &DatabaseConnection,
    family_id: &str,
    label: &str,
    today: NaiveDate,
) -> Result<MutationEvent> {
    use sea_orm::sea_query::Expr;

    let label = label.trim().to_lowercase();
    let members = Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .filter(product::Column::ProductType.eq(label.clone()))
        .all(db)
        .await?;
    if members.is_empty() {
        return Err(Error::TypeNotFound {
            family_id: family_id.to_string(),
            label,
        });
    }

    let txn = db.begin().await?;
    let now = Utc::now().naive_utc();

    for member in &members {
        let unit = PurchaseEntry::find()
            .filter(purchase_entry::Column::ProductId.eq(member.id))
            .order_by_desc(purchase_entry::Column::Date)
            .order_by_desc(purchase_entry::Column::Id)
            .one(&txn)
            .await?
            .map_or_else(|| "piece".to_string(), |entry| entry.unit);

        purchase_entry::ActiveModel {
            family_id: Set(family_id.to_string()),
            product_id: Set(member.id),
            receipt_id: Set(None),
            date: Set(today),
            quantity: Set(1.0),
            unit: Set(unit),
            total_price: Set(0.0),
            unit_price: Set(0.0),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ledger_write)?;

        Product::update_many()
            .col_expr(
                product::Column::PurchaseCount,
                Expr::col(product::Column::PurchaseCount).add(1),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::Id.eq(member.id))
            .exec(&txn)
            .await
            .map_err(ledger_write)?;

        Product::update_many()
            .col_expr(product::Column::LastPurchase, Expr::value(today))
            .filter(product::Column::Id.eq(member.id))
            .filter(product::Column::LastPurchase.lte(today))
            .exec(&txn)
            .await
            .map_err(ledger_write)?;
    }

    txn.commit().await?;

    Ok(MutationEvent::TypeRestocked {
        family_id: family_id.to_string(),
        type_label: label,
    })
}

/// Retrieves a product by id.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn get_product(db: &DatabaseConnection, product_id: i64) -> Result<Option<product::Model>> {
    Product::find_by_id(product_id).one(db).await.map_err(Into::into)
}

/// Finds a family's product by case-insensitive exact name.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn get_product_by_name(
    db: &DatabaseConnection,
    family_id: &str,
    name: &str,
) -> Result<Option<product::Model>> {
    let needle = name.to_lowercase();
    let products = Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .all(db)
        .await?;
    Ok(products.into_iter().find(|p| p.name.to_lowercase() == needle))
}

/// Retrieves all products of a family, ordered alphabetically by name.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn products_for_family(
    db: &DatabaseConnection,
    family_id: &str,
) -> Result<Vec<product::Model>> {
    Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .order_by_asc(product::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a receipt by id.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn get_receipt(db: &DatabaseConnection, receipt_id: i64) -> Result<Option<receipt::Model>> {
    Receipt::find_by_id(receipt_id).one(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_unit_price_for() {
        assert_eq!(unit_price_for(3.0, 2.0), 1.5);
        assert_eq!(unit_price_for(3.0, 0.0), 3.0);
        assert_eq!(unit_price_for(3.0, f64::NAN), 3.0);
    }

    #[tokio::test]
    async fn test_new_product_starts_calculating() -> Result<()> {
        let db = setup_test_db().await?;

        let (receipt_row, _) = apply_receipt(
            &db,
            FAMILY,
            d(2024, 10, 1),
            &[item("Whole Milk", 2.0, 3.0)],
            &matcher(),
        )
        .await?;
        assert_eq!(receipt_row.item_count, 1);
        assert_eq!(receipt_row.total_amount, 3.0);
        assert_eq!(receipt_row.status, RECEIPT_STATUS_PROCESSED);

        let milk = get_product_by_name(&db, FAMILY, "Whole Milk").await?.unwrap();
        assert_eq!(milk.status, "calculating");
        assert_eq!(milk.purchase_count, 1);
        assert_eq!(milk.unit_price, 1.5);
        assert!(milk.product_type.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_repeat_purchase_matches_case_insensitively() -> Result<()> {
        let db = setup_test_db().await?;

        apply_receipt(&db, FAMILY, d(2024, 10, 1), &[item("Whole Milk", 1.0, 1.50)], &matcher())
            .await?;
        apply_receipt(&db, FAMILY, d(2024, 10, 15), &[item("WHOLE MILK", 1.0, 1.60)], &matcher())
            .await?;

        let products = products_for_family(&db, FAMILY).await?;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].purchase_count, 2);
        assert_eq!(products[0].last_purchase, d(2024, 10, 15));
        assert_eq!(products[0].unit_price, 1.60);
        Ok(())
    }

    #[tokio::test]
    async fn test_backdated_receipt_keeps_newer_history() -> Result<()> {
        let db = setup_test_db().await?;

        apply_receipt(&db, FAMILY, d(2024, 10, 15), &[item("Milk", 1.0, 1.60)], &matcher())
            .await?;
        // A receipt entered late, dated before the existing history.
        apply_receipt(&db, FAMILY, d(2024, 10, 1), &[item("Milk", 1.0, 1.50)], &matcher())
            .await?;

        let milk = get_product_by_name(&db, FAMILY, "milk").await?.unwrap();
        assert_eq!(milk.purchase_count, 2);
        assert_eq!(milk.last_purchase, d(2024, 10, 15));
        assert_eq!(milk.unit_price, 1.60);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_line_items_share_one_product() -> Result<()> {
        let db = setup_test_db().await?;

        let (receipt_row, event) = apply_receipt(
            &db,
            FAMILY,
            d(2024, 10, 1),
            &[item("Milk", 1.0, 1.50), item("milk", 1.0, 1.50)],
            &matcher(),
        )
        .await?;
        assert_eq!(receipt_row.item_count, 2);

        let milk = get_product_by_name(&db, FAMILY, "milk").await?.unwrap();
        assert_eq!(milk.purchase_count, 2);

        let MutationEvent::ReceiptApplied { product_ids, .. } = event else {
            panic!("wrong event");
        };
        assert_eq!(product_ids, vec![milk.id]);
        Ok(())
    }

    #[tokio::test]
    async fn test_untyped_item_infers_type_from_family() -> Result<()> {
        let db = setup_test_db().await?;

        apply_receipt(&db, FAMILY, d(2024, 10, 1), &[typed_item("Oat Milk Barista", "milk")], &matcher())
            .await?;
        apply_receipt(&db, FAMILY, d(2024, 10, 8), &[item("Oatly Oat Milk", 1.0, 2.0)], &matcher())
            .await?;

        let oatly = get_product_by_name(&db, FAMILY, "oatly oat milk").await?.unwrap();
        assert_eq!(oatly.product_type.as_deref(), Some("milk"));
        Ok(())
    }

    #[tokio::test]
    async fn test_type_labels_do_not_cross_families() -> Result<()> {
        let db = setup_test_db().await?;

        apply_receipt(&db, "family-a", d(2024, 10, 1), &[typed_item("Oat Milk", "milk")], &matcher())
            .await?;
        apply_receipt(&db, "family-b", d(2024, 10, 1), &[item("Oat Milk", 1.0, 2.0)], &matcher())
            .await?;

        let other = get_product_by_name(&db, "family-b", "oat milk").await?.unwrap();
        assert!(other.product_type.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_product_noop_patch_emits_no_events() -> Result<()> {
        let db = setup_test_db().await?;

        apply_receipt(&db, FAMILY, d(2024, 10, 1), &[typed_item("Brie", "cheese")], &matcher())
            .await?;
        let brie = get_product_by_name(&db, FAMILY, "brie").await?.unwrap();

        let (_, events) = update_product(&db, brie.id, ProductPatch::default()).await?;
        assert!(events.is_empty());

        // Re-assigning the same label is also a no-op.
        let (_, events) = update_product(
            &db,
            brie.id,
            ProductPatch {
                product_type: Some(Some("  Cheese ".to_string())),
                ..Default::default()
            },
        )
        .await?;
        assert!(events.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_product_unknown_id() -> Result<()> {
        let db = setup_test_db().await?;
        let err = update_product(&db, 999, ProductPatch::default()).await.unwrap_err();
        assert!(matches!(err, Error::ProductNotFound { id: 999 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_receipt_keeps_products_with_other_history() -> Result<()> {
        let db = setup_test_db().await?;

        apply_receipt(&db, FAMILY, d(2024, 10, 1), &[item("Milk", 1.0, 1.50)], &matcher())
            .await?;
        let (second, _) = apply_receipt(
            &db,
            FAMILY,
            d(2024, 10, 15),
            &[item("Milk", 1.0, 1.60), item("Rice", 1.0, 2.50)],
            &matcher(),
        )
        .await?;

        let event = delete_receipt(&db, second.id).await?;

        // Milk survives on its older entry; rice had nothing else and is gone.
        let milk = get_product_by_name(&db, FAMILY, "milk").await?.unwrap();
        assert!(get_product_by_name(&db, FAMILY, "rice").await?.is_none());

        let MutationEvent::ReceiptDeleted { product_ids, .. } = event else {
            panic!("wrong event");
        };
        assert_eq!(product_ids, vec![milk.id]);
        assert!(get_receipt(&db, second.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_restock_reuses_most_recent_unit() -> Result<()> {
        let db = setup_test_db().await?;

        let mut litre = item("Milk", 1.0, 1.50);
        litre.unit = "litre".to_string();
        apply_receipt(&db, FAMILY, d(2024, 10, 1), &[ParsedItem {
            product_type: Some("milk".to_string()),
            ..litre
        }], &matcher())
        .await?;

        mark_type_restocked(&db, FAMILY, "milk", d(2024, 10, 20)).await?;

        let milk = get_product_by_name(&db, FAMILY, "milk").await?.unwrap();
        let entries = PurchaseEntry::find()
            .filter(purchase_entry::Column::ProductId.eq(milk.id))
            .order_by_desc(purchase_entry::Column::Date)
            .all(&db)
            .await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].unit, "litre");
        assert_eq!(entries[0].quantity, 1.0);
        assert_eq!(entries[0].total_price, 0.0);
        assert!(entries[0].receipt_id.is_none());
        assert_eq!(milk.last_purchase, d(2024, 10, 20));
        Ok(())
    }

    #[tokio::test]
    async fn test_restock_unknown_label() -> Result<()> {
        let db = setup_test_db().await?;
        let err = mark_type_restocked(&db, FAMILY, "cheese", d(2024, 10, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TypeNotFound { .. }));
        Ok(())
    }
}
