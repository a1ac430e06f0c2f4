/// Database configuration and connection management
pub mod database;

/// Ingestion policy configuration from config.toml
pub mod ingestion;
