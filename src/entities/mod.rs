//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod monthly_aggregate;
pub mod pending_receipt;
pub mod product;
pub mod purchase_entry;
pub mod receipt;
pub mod type_aggregate;

// Re-export specific types to avoid conflicts
pub use monthly_aggregate::{
    Column as MonthlyAggregateColumn, Entity as MonthlyAggregate, Model as MonthlyAggregateModel,
};
pub use pending_receipt::{
    Column as PendingReceiptColumn, Entity as PendingReceipt, Model as PendingReceiptModel,
};
pub use product::{Column as ProductColumn, Entity as Product, Model as ProductModel};
pub use purchase_entry::{
    Column as PurchaseEntryColumn, Entity as PurchaseEntry, Model as PurchaseEntryModel,
};
pub use receipt::{Column as ReceiptColumn, Entity as Receipt, Model as ReceiptModel};
pub use type_aggregate::{
    Column as TypeAggregateColumn, Entity as TypeAggregate, Model as TypeAggregateModel,
};
