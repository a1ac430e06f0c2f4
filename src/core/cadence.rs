//! Cadence estimation - Predicts when a recurring item will run out.
//!
//! The estimator is a pure function of purchase dates. It computes the
//! average interval between purchases, projects a depletion date from the
//! most recent purchase, and classifies the result into a tri-state status.
//! It runs twice per product type: once on each product's own history and
//! once on the pooled, date-sorted history of every product sharing the type.
//!
//! `today` is taken as a parameter so the arithmetic stays testable; call
//! sites pass `Utc::now().date_naive()`.

use crate::errors::{Error, Result};
use chrono::{Duration, NaiveDate};

/// Days-since-purchase below which a product is never flagged as running out.
/// An item bought yesterday or today is `ok` regardless of the forecast.
const RECENCY_OVERRIDE_DAYS: i64 = 2;

/// Days-until-depletion at or below which a product counts as ending soon.
const ENDING_SOON_THRESHOLD_DAYS: i64 = 2;

/// Tri-state consumption status for a product or a product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStatus {
    /// Enough purchase history, not predicted to run out soon
    Ok,
    /// Predicted to run out within the threshold
    EndingSoon,
    /// Not enough purchase history to make a prediction
    Calculating,
}

impl ProductStatus {
    /// The string stored in status columns.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::EndingSoon => "ending-soon",
            Self::Calculating => "calculating",
        }
    }

    /// Parses a stored status string back into the enum.
    ///
    /// # Errors
    /// Returns a configuration error for unknown status strings.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "ok" => Ok(Self::Ok),
            "ending-soon" => Ok(Self::EndingSoon),
            "calculating" => Ok(Self::Calculating),
            other => Err(Error::Config {
                message: format!("Unknown product status '{other}'"),
            }),
        }
    }
}

/// Result of a cadence estimation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceEstimate {
    /// Rounded mean of the positive day-gaps between consecutive purchases
    pub avg_days: Option<i32>,
    /// `last_purchase + avg_days` days
    pub predicted_end: Option<NaiveDate>,
    /// Status derived from the prediction and the recency override
    pub status: ProductStatus,
}

impl CadenceEstimate {
    /// The estimate returned whenever there is not enough usable history.
    #[must_use]
    pub const fn calculating() -> Self {
        Self {
            avg_days: None,
            predicted_end: None,
            status: ProductStatus::Calculating,
        }
    }
}

/// Estimates purchase cadence from a series of purchase dates.
///
/// Fewer than two dates yield `calculating`. Gaps of zero or negative days
/// between consecutive sorted dates are discarded as data noise (two
/// purchases on the same day); if no positive gap remains the result is
/// `calculating` as well. Otherwise the average gap is the rounded mean of
/// the positive gaps, the predicted depletion date is `last_purchase` plus
/// that many days, and the status follows the rule:
///
/// - fewer than 2 days since the last purchase: `ok`, unconditionally
/// - predicted depletion within 2 days: `ending-soon`
/// - otherwise: `ok`
#[must_use]
pub fn estimate(dates: &[NaiveDate], last_purchase: NaiveDate, today: NaiveDate) -> CadenceEstimate {
    if dates.len() < 2 {
        return CadenceEstimate::calculating();
    }

    let mut sorted = dates.to_vec();
    sorted.sort_unstable();

    let positive_gaps: Vec<i64> = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days())
        .filter(|&gap| gap > 0)
        .collect();

    if positive_gaps.is_empty() {
        return CadenceEstimate::calculating();
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let avg_days =
        (positive_gaps.iter().sum::<i64>() as f64 / positive_gaps.len() as f64).round() as i64;
    let predicted_end = last_purchase + Duration::days(avg_days);

    let days_since_purchase = (today - last_purchase).num_days();
    let days_until_end = (predicted_end - today).num_days();

    // Recency override: a purchase yesterday or today beats any forecast.
    let status = if days_since_purchase < RECENCY_OVERRIDE_DAYS {
        ProductStatus::Ok
    } else if days_until_end <= ENDING_SOON_THRESHOLD_DAYS {
        ProductStatus::EndingSoon
    } else {
        ProductStatus::Ok
    };

    #[allow(clippy::cast_possible_truncation)]
    let avg_days = avg_days as i32;
    CadenceEstimate {
        avg_days: Some(avg_days),
        predicted_end: Some(predicted_end),
        status,
    }
}
