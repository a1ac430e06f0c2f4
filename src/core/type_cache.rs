//! Type aggregation cache - Pooled cadence status per product type.
//!
//! Products sharing a type label pool their purchase-entry dates into one
//! series, and the cadence estimator runs once on the pooled series to
//! produce one status for the whole type; the same pass also refreshes each
//! member product's own cached cadence columns from its individual history.
//! Cache rows are always derivable from the ledger and are rebuilt in place,
//! never hand-edited - except for the explicit "mark as depleted early"
//! override, which forces the cached status until the next real recompute.

use crate::{
    core::cadence::{self, ProductStatus},
    entities::{Product, PurchaseEntry, TypeAggregate, product, purchase_entry, type_aggregate},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{DatabaseConnection, Set, prelude::*};
use std::collections::BTreeSet;

/// Re-runs the cadence estimator on one product's own purchase history and
/// writes the resulting `avg_days`/`predicted_end`/`status` columns.
///
/// # Errors
/// Returns [`Error::ProductNotFound`] if the product does not exist.
pub async fn refresh_product_cadence(
    db: &DatabaseConnection,
    product_id: i64,
    today: NaiveDate,
) -> Result<product::Model> {
    let product_row = Product::find_by_id(product_id)
        .one(db)
        .await?
        .ok_or(Error::ProductNotFound { id: product_id })?;

    let dates: Vec<NaiveDate> = PurchaseEntry::find()
        .filter(purchase_entry::Column::ProductId.eq(product_id))
        .all(db)
        .await?
        .into_iter()
        .map(|entry| entry.date)
        .collect();

    let estimate = cadence::estimate(&dates, product_row.last_purchase, today);

    let mut active: product::ActiveModel = product_row.into();
    active.avg_days = Set(estimate.avg_days);
    active.predicted_end = Set(estimate.predicted_end);
    active.status = Set(estimate.status.as_str().to_string());
    active.updated_at = Set(Utc::now().naive_utc());
    active.update(db).await.map_err(Into::into)
}

/// Recomputes the cache row for one (family, type) pair.
///
/// Refreshes every member product's individual cadence first, then runs the
/// estimator once on the pooled entry dates of all members and upserts
/// `{status, member_count}`. A label with no remaining members has its row
/// deleted and yields `None`.
///
/// # Errors
/// Returns an error if a query or write fails.
pub async fn recompute_type(
    db: &DatabaseConnection,
    family_id: &str,
    label: &str,
    today: NaiveDate,
) -> Result<Option<type_aggregate::Model>> {
    let label = label.trim().to_lowercase();

    let members = Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .filter(product::Column::ProductType.eq(label.clone()))
        .all(db)
        .await?;

    if members.is_empty() {
        delete_cache_row(db, family_id, &label).await?;
        return Ok(None);
    }

    let mut last_purchase = members[0].last_purchase;
    for member in &members {
        refresh_product_cadence(db, member.id, today).await?;
        last_purchase = last_purchase.max(member.last_purchase);
    }

    let member_ids: Vec<i64> = members.iter().map(|m| m.id).collect();
    let pooled: Vec<NaiveDate> = PurchaseEntry::find()
        .filter(purchase_entry::Column::ProductId.is_in(member_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|entry| entry.date)
        .collect();

    if let Some(latest) = pooled.iter().max() {
        last_purchase = last_purchase.max(*latest);
    }

    let estimate = cadence::estimate(&pooled, last_purchase, today);

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let row = upsert_cache_row(
        db,
        family_id,
        &label,
        estimate.status,
        members.len() as i32,
    )
    .await?;
    Ok(Some(row))
}

/// Recomputes the cache for every type label in use by the family.
///
/// # Errors
/// Returns an error if a query or write fails.
pub async fn recompute_all_types(
    db: &DatabaseConnection,
    family_id: &str,
    today: NaiveDate,
) -> Result<Vec<type_aggregate::Model>> {
    let labels = labels_for_family(db, family_id).await?;

    let mut rows = Vec::new();
    for label in labels {
        if let Some(row) = recompute_type(db, family_id, &label, today).await? {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// All distinct type labels carried by a family's products.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn labels_for_family(db: &DatabaseConnection, family_id: &str) -> Result<Vec<String>> {
    let labels: BTreeSet<String> = Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .all(db)
        .await?
        .into_iter()
        .filter_map(|p| p.product_type)
        .collect();
    Ok(labels.into_iter().collect())
}

/// Deletes a type: clears the label from every member product (the products
/// themselves are kept) and removes the cache row. Returns how many products
/// were cleared.
///
/// # Errors
/// Returns an error if a query or write fails.
pub async fn delete_type(db: &DatabaseConnection, family_id: &str, label: &str) -> Result<usize> {
    use sea_orm::TransactionTrait;

    let label = label.trim().to_lowercase();
    let members = Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .filter(product::Column::ProductType.eq(label.clone()))
        .all(db)
        .await?;

    let txn = db.begin().await?;
    let now = Utc::now().naive_utc();
    let cleared = members.len();

    for member in members {
        let mut active: product::ActiveModel = member.into();
        active.product_type = Set(None);
        active.updated_at = Set(now);
        active.update(&txn).await?;
    }

    TypeAggregate::delete_many()
        .filter(type_aggregate::Column::FamilyId.eq(family_id))
        .filter(type_aggregate::Column::ProductType.eq(label))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(cleared)
}

/// Forces the type's cached status to `ending-soon`, independent of the
/// estimator. The next recompute through the normal path resets it.
///
/// # Errors
/// Returns [`Error::TypeNotFound`] if no product carries the label.
pub async fn mark_depleted_early(
    db: &DatabaseConnection,
    family_id: &str,
    label: &str,
) -> Result<type_aggregate::Model> {
    let label = label.trim().to_lowercase();
    let member_count = Product::find()
        .filter(product::Column::FamilyId.eq(family_id))
        .filter(product::Column::ProductType.eq(label.clone()))
        .count(db)
        .await?;

    if member_count == 0 {
        return Err(Error::TypeNotFound {
            family_id: family_id.to_string(),
            label,
        });
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let member_count = member_count as i32;
    upsert_cache_row(db, family_id, &label, ProductStatus::EndingSoon, member_count).await
}

/// Retrieves the cache row for one (family, type) pair.
///
/// # Errors
/// Returns an error if the query fails.
pub async fn get_type_aggregate(
    db: &DatabaseConnection,
    family_id: &str,
    label: &str,
) -> Result<Option<type_aggregate::Model>> {
    TypeAggregate::find()
        .filter(type_aggregate::Column::FamilyId.eq(family_id))
        .filter(type_aggregate::Column::ProductType.eq(label.trim().to_lowercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn upsert_cache_row(
    db: &DatabaseConnection,
    family_id: &str,
    label: &str,
    status: ProductStatus,
    member_count: i32,
) -> Result<type_aggregate::Model> {
    let now = Utc::now().naive_utc();
    let existing = TypeAggregate::find()
        .filter(type_aggregate::Column::FamilyId.eq(family_id))
        .filter(type_aggregate::Column::ProductType.eq(label))
        .one(db)
        .await?;

    let row = if let Some(existing) = existing {
        let mut active: type_aggregate::ActiveModel = existing.into();
        active.status = Set(status.as_str().to_string());
        active.member_count = Set(member_count);
        active.updated_at = Set(now);
        active.update(db).await?
    } else {
        type_aggregate::ActiveModel {
            family_id: Set(family_id.to_string()),
            product_type: Set(label.to_string()),
            status: Set(status.as_str().to_string()),
            member_count: Set(member_count),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?
    };
    Ok(row)
}

async fn delete_cache_row(db: &DatabaseConnection, family_id: &str, label: &str) -> Result<()> {
    TypeAggregate::delete_many()
        .filter(type_aggregate::Column::FamilyId.eq(family_id))
        .filter(type_aggregate::Column::ProductType.eq(label))
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_recompute_type_pools_member_histories() -> Result<()> {
        let db = setup_test_db().await?;

        // Two milk products, each purchased once a week, offset by half a
        // week: the pooled series has a ~3/4 day cadence.
        apply_test_receipt(&db, d(2024, 10, 1), &[typed_item("Whole Milk", "milk")]).await?;
        apply_test_receipt(&db, d(2024, 10, 4), &[typed_item("Oat Milk", "milk")]).await?;
        apply_test_receipt(&db, d(2024, 10, 8), &[typed_item("Whole Milk", "milk")]).await?;
        apply_test_receipt(&db, d(2024, 10, 11), &[typed_item("Oat Milk", "milk")]).await?;

        let row = recompute_type(&db, FAMILY, "milk", d(2024, 10, 12))
            .await?
            .unwrap();
        assert_eq!(row.member_count, 2);
        // Pooled gaps 3, 4, 3 -> avg 3; last purchase 10-11, predicted end
        // 10-14, today 10-12: days_since = 1 -> recency override -> ok.
        assert_eq!(row.status, "ok");

        // Each product's own cadence cache was refreshed as well.
        let whole = crate::core::ledger::get_product_by_name(&db, FAMILY, "whole milk")
            .await?
            .unwrap();
        assert_eq!(whole.avg_days, Some(7));
        assert_eq!(whole.predicted_end, Some(d(2024, 10, 15)));

        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_type_ending_soon_from_pool() -> Result<()> {
        let db = setup_test_db().await?;

        apply_test_receipt(&db, d(2024, 10, 1), &[typed_item("Rye Bread", "bread")]).await?;
        apply_test_receipt(&db, d(2024, 10, 15), &[typed_item("Rye Bread", "bread")]).await?;

        // avg 14, end 10-29; today 10-28: until = 1, since = 13 -> ending-soon.
        let row = recompute_type(&db, FAMILY, "bread", d(2024, 10, 28))
            .await?
            .unwrap();
        assert_eq!(row.status, "ending-soon");
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_type_with_no_members_deletes_row() -> Result<()> {
        let db = setup_test_db().await?;

        apply_test_receipt(&db, d(2024, 10, 1), &[typed_item("Brie", "cheese")]).await?;
        recompute_type(&db, FAMILY, "cheese", d(2024, 10, 2)).await?;
        assert!(get_type_aggregate(&db, FAMILY, "cheese").await?.is_some());

        // Clear the label, then recompute: the row must disappear.
        let product = crate::core::ledger::get_product_by_name(&db, FAMILY, "brie")
            .await?
            .unwrap();
        crate::core::ledger::update_product(
            &db,
            product.id,
            crate::core::ledger::ProductPatch {
                product_type: Some(None),
                ..Default::default()
            },
        )
        .await?;

        let row = recompute_type(&db, FAMILY, "cheese", d(2024, 10, 2)).await?;
        assert!(row.is_none());
        assert!(get_type_aggregate(&db, FAMILY, "cheese").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_label_matching_is_case_folded() -> Result<()> {
        let db = setup_test_db().await?;

        apply_test_receipt(&db, d(2024, 10, 1), &[typed_item("Brie", "cheese")]).await?;
        let row = recompute_type(&db, FAMILY, "  ChEeSe ", d(2024, 10, 2))
            .await?
            .unwrap();
        assert_eq!(row.product_type, "cheese");
        assert_eq!(row.member_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_type_clears_members_but_keeps_products() -> Result<()> {
        let db = setup_test_db().await?;

        apply_test_receipt(
            &db,
            d(2024, 10, 1),
            &[typed_item("Brie", "cheese"), typed_item("Gouda", "cheese")],
        )
        .await?;
        recompute_type(&db, FAMILY, "cheese", d(2024, 10, 2)).await?;

        let cleared = delete_type(&db, FAMILY, "cheese").await?;
        assert_eq!(cleared, 2);
        assert!(get_type_aggregate(&db, FAMILY, "cheese").await?.is_none());

        let brie = crate::core::ledger::get_product_by_name(&db, FAMILY, "brie")
            .await?
            .unwrap();
        assert_eq!(brie.product_type, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_depleted_early_forces_status() -> Result<()> {
        let db = setup_test_db().await?;

        // One purchase: the estimator alone would say "calculating".
        apply_test_receipt(&db, d(2024, 10, 1), &[typed_item("Butter", "butter")]).await?;
        recompute_type(&db, FAMILY, "butter", d(2024, 10, 2)).await?;
        assert_eq!(
            get_type_aggregate(&db, FAMILY, "butter").await?.unwrap().status,
            "calculating"
        );

        let row = mark_depleted_early(&db, FAMILY, "butter").await?;
        assert_eq!(row.status, "ending-soon");

        // The next real recompute resets it through the normal path.
        recompute_type(&db, FAMILY, "butter", d(2024, 10, 2)).await?;
        assert_eq!(
            get_type_aggregate(&db, FAMILY, "butter").await?.unwrap().status,
            "calculating"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_depleted_early_unknown_type() -> Result<()> {
        let db = setup_test_db().await?;
        let result = mark_depleted_early(&db, FAMILY, "nope").await;
        assert!(matches!(
            result.unwrap_err(),
            crate::errors::Error::TypeNotFound { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_cache_rows_are_family_scoped() -> Result<()> {
        let db = setup_test_db().await?;

        apply_test_receipt(&db, d(2024, 10, 1), &[typed_item("Brie", "cheese")]).await?;
        recompute_type(&db, FAMILY, "cheese", d(2024, 10, 2)).await?;

        assert!(get_type_aggregate(&db, "other-family", "cheese").await?.is_none());
        Ok(())
    }
}
