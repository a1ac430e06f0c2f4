//! Database configuration module for `PantryTracker`.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! It provides functions for establishing database connections and creating all necessary
//! tables based on the entity definitions. The module uses `SeaORM`'s
//! `Schema::create_table_from_entity` method to automatically generate SQL statements from
//! the entity models, ensuring that the database schema matches the Rust struct definitions
//! without requiring manual SQL.

use crate::entities::{
    MonthlyAggregate, PendingReceipt, Product, PurchaseEntry, Receipt, TypeAggregate,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Gets the database URL from environment variable or returns the default `SQLite` path.
///
/// This function looks for `DATABASE_URL` in the environment and falls back to
/// a default local `SQLite` file if not found.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/pantry_tracker.sqlite".to_string())
}

/// Establishes a connection to the `SQLite` database using the `DATABASE_URL` environment variable.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
///
/// # Errors
/// Returns an error if the connection cannot be established.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(get_database_url()).await.map_err(Into::into)
}

/// Creates all necessary database tables using `SeaORM`'s schema generation from entity definitions.
///
/// Table creation is idempotent (`IF NOT EXISTS`), so this is safe to run on
/// every startup. It creates tables for products, purchase entries, receipts,
/// pending receipts and the two materialized caches.
///
/// # Errors
/// Returns an error if any table creation statement fails.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut statements = vec![
        schema.create_table_from_entity(Product),
        schema.create_table_from_entity(PurchaseEntry),
        schema.create_table_from_entity(Receipt),
        schema.create_table_from_entity(PendingReceipt),
        schema.create_table_from_entity(TypeAggregate),
        schema.create_table_from_entity(MonthlyAggregate),
    ];

    for statement in &mut statements {
        statement.if_not_exists();
        db.execute(builder.build(statement)).await?;
    }

    Ok(())
}
