//! Feature extraction for fraud model inference.
//!
//! Turns a transaction into the fixed-order vector the local classifier
//! was trained on. Extraction never fails: every field that cannot be read
//! falls back to a documented default.

use crate::config::FeatureConfig;
use crate::types::transaction::TransactionInput;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use tracing::debug;

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; 7] = [
    "amount",
    "hour",
    "weekday",
    "location_risk",
    "merchant_risk",
    "velocity",
    "amount_deviation",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

pub const IDX_AMOUNT: usize = 0;
pub const IDX_HOUR: usize = 1;
pub const IDX_WEEKDAY: usize = 2;
pub const IDX_LOCATION_RISK: usize = 3;
pub const IDX_MERCHANT_RISK: usize = 4;
pub const IDX_VELOCITY: usize = 5;
pub const IDX_AMOUNT_DEVIATION: usize = 6;

const HIGH_LOCATION_RISK: f32 = 0.9;
const LOW_LOCATION_RISK: f32 = 0.2;
const SUSPICIOUS_MERCHANT_RISK: f32 = 0.95;
const NEUTRAL_MERCHANT_RISK: f32 = 0.5;

/// Ordered numeric features for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `idx`, zero when out of range
    pub fn get(&self, idx: usize) -> f32 {
        self.values.get(idx).copied().unwrap_or(0.0)
    }

    /// Copy sized for a model expecting `expected` inputs: zero-padded or truncated.
    pub fn aligned_to(&self, expected: usize) -> Vec<f32> {
        let mut aligned = self.values.clone();
        if aligned.len() != expected {
            debug!(
                expected = expected,
                actual = aligned.len(),
                "Feature count mismatch, aligning vector"
            );
            aligned.resize(expected, 0.0);
        }
        aligned
    }
}

/// Feature extractor that transforms transactions into model input features.
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Extract features, using the current time when the timestamp is missing.
    pub fn extract(&self, tx: &TransactionInput) -> FeatureVector {
        self.extract_at(tx, Utc::now())
    }

    /// Extract features with an explicit fallback clock.
    ///
    /// Hour and weekday come from the timestamp's own offset.
    pub fn extract_at(&self, tx: &TransactionInput, now: DateTime<Utc>) -> FeatureVector {
        let amount = tx.safe_amount();
        let when = tx
            .parsed_timestamp()
            .unwrap_or_else(|| DateTime::<FixedOffset>::from(now));

        let location_risk = if self.config.is_high_risk_location(&tx.location) {
            HIGH_LOCATION_RISK
        } else {
            LOW_LOCATION_RISK
        };

        let merchant_risk = if self.config.is_suspicious_merchant(&tx.merchant) {
            SUSPICIOUS_MERCHANT_RISK
        } else {
            NEUTRAL_MERCHANT_RISK
        };

        // Share of the spending-spike threshold (4x the customer's average)
        let velocity = if tx.history.user_txn_count > 0 && tx.history.average_amount() > 0.0 {
            (amount / (4.0 * tx.history.average_amount())).clamp(0.0, 1.0) as f32
        } else {
            self.config.default_velocity
        };

        let reference = if self.config.reference_amount > 0.0 {
            self.config.reference_amount
        } else {
            1000.0
        };
        let amount_deviation = ((amount - reference).abs() / reference).min(1.0) as f32;

        FeatureVector::from_values(vec![
            amount as f32,
            when.hour() as f32,
            when.weekday().num_days_from_monday() as f32,
            location_risk,
            merchant_risk,
            velocity,
            amount_deviation,
        ])
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in model order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_NAMES
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}
