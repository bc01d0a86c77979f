//! Transaction input accepted by the risk pipeline

use crate::types::decision::DecisionStatus;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

const UNKNOWN: &str = "Unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn generate_transaction_id() -> String {
    format!("TXN-{}", uuid::Uuid::new_v4().simple())
}

/// Payment channel the transaction arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    CardTransfer,
    MerchantCheckout,
    BalancePayment,
    #[default]
    #[serde(other)]
    Web,
}

/// Historical profile of the customer at decision time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserHistory {
    /// Number of prior transactions
    #[serde(default, deserialize_with = "lenient_u32")]
    pub user_txn_count: u32,

    /// Total amount spent across prior transactions
    #[serde(default, deserialize_with = "lenient_f64")]
    pub user_total_spent: f64,

    /// Risk score assigned on the previous analysis (0-100)
    #[serde(default, deserialize_with = "lenient_f64")]
    pub user_risk_score: f64,

    /// ISO-8601 account creation time
    #[serde(default)]
    pub account_created_at: Option<String>,
}

impl UserHistory {
    /// Average historical amount; zero prior transactions count as one.
    pub fn average_amount(&self) -> f64 {
        self.user_total_spent / f64::from(self.user_txn_count.max(1))
    }

    /// Account age in hours, if the creation timestamp parses.
    pub fn account_age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        let created = self.account_created_at.as_deref().and_then(parse_timestamp)?;
        Some((now - created).num_seconds() as f64 / 3600.0)
    }
}

/// A transaction to be scored.
///
/// Every field except the amount is optional on the wire and falls back to a
/// neutral default, so a sparse payload still yields a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInput {
    #[serde(alias = "id", default = "generate_transaction_id")]
    pub transaction_id: String,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: f64,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "unknown")]
    pub location: String,

    /// ISO country code of the transaction origin
    #[serde(default = "unknown")]
    pub country: String,

    #[serde(default = "unknown")]
    pub merchant: String,

    #[serde(default = "unknown")]
    pub category: String,

    /// Customer identifier
    #[serde(default = "unknown")]
    pub customer: String,

    #[serde(default)]
    pub channel: Channel,

    #[serde(default = "unknown")]
    pub device_type: String,

    #[serde(default = "unknown")]
    pub browser: String,

    #[serde(default = "unknown")]
    pub os: String,

    #[serde(default = "unknown")]
    pub ip_address: String,

    #[serde(default = "unknown")]
    pub card_type: String,

    #[serde(flatten)]
    pub history: UserHistory,

    /// Raw timestamp; parsed leniently during feature extraction
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Pre-computed status from an upstream validation step
    #[serde(default)]
    pub status: Option<DecisionStatus>,

    /// Reasons accompanying a pre-computed status
    #[serde(default)]
    pub reasons: Option<Vec<String>>,
}

impl TransactionInput {
    /// Create a transaction with neutral defaults for everything but the amount
    pub fn new(transaction_id: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            amount,
            currency: default_currency(),
            location: unknown(),
            country: unknown(),
            merchant: unknown(),
            category: unknown(),
            customer: unknown(),
            channel: Channel::Web,
            device_type: unknown(),
            browser: unknown(),
            os: unknown(),
            ip_address: unknown(),
            card_type: unknown(),
            history: UserHistory::default(),
            timestamp: None,
            status: None,
            reasons: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = merchant.into();
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = ip.into();
        self
    }

    pub fn with_history(mut self, history: UserHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_precomputed_status(mut self, status: DecisionStatus, reasons: Vec<String>) -> Self {
        self.status = Some(status);
        self.reasons = Some(reasons);
        self
    }

    /// Amount with non-finite values treated as zero
    pub fn safe_amount(&self) -> f64 {
        if self.amount.is_finite() {
            self.amount
        } else {
            0.0
        }
    }

    /// Parsed timestamp in the sender's own offset, if present and well-formed.
    ///
    /// Hour and weekday features read the wall clock at the point of sale,
    /// so the offset is kept rather than normalized to UTC.
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp.as_deref().and_then(parse_local_timestamp)
    }
}

/// Parse RFC 3339 keeping its offset, then naive ISO-8601 or a bare date as UTC.
pub fn parse_local_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(naive.and_utc().into())
}

/// Same formats as `parse_local_timestamp`, normalized to UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_local_timestamp(raw).map(|ts| ts.with_timezone(&Utc))
}

/// Accept numbers or numeric strings; anything else becomes zero.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_f64(deserializer)?;
    if value.is_finite() && value > 0.0 {
        Ok(value.min(f64::from(u32::MAX)) as u32)
    } else {
        Ok(0)
    }
}
