//! Maintenance entry point for `PantryTracker`.
//!
//! Runs the recurring upkeep for one family: resets pending receipts stuck
//! in `processing` past the configured timeout, then rebuilds every derived
//! cache from the ledger. Safe to run at any time and as often as wanted.

use chrono::{Duration, Utc};
use dotenvy::dotenv;
use pantry_tracker::{
    config::{database, ingestion},
    core::{ingestion as pipeline, orchestrator},
    errors::{Error, Result},
};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenv().ok();

    let family_id = env::args().nth(1).ok_or_else(|| Error::Config {
        message: "Usage: pantry-tracker <family-id>".to_string(),
    })?;

    let config = ingestion::load_default_config()?;
    let db = database::create_connection().await?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    let cutoff = Utc::now().naive_utc() - Duration::minutes(config.processing_timeout_minutes);
    let reset = pipeline::reset_stale(&db, cutoff).await?;
    if reset > 0 {
        warn!(reset, "stale processing receipts returned to the retry queue");
    }

    let report = orchestrator::recompute_family(&db, &family_id).await?;
    info!(
        products = report.products_refreshed,
        types = report.types_refreshed,
        months = report.months_refreshed,
        "maintenance finished"
    );
    for (entity, message) in &report.failures {
        warn!(entity, message, "refresh failure during maintenance");
    }

    Ok(())
}
