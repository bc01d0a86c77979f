//! Configuration management for the risk-decision pipeline

use crate::types::decision::RiskThresholds;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// What the local tier does when no model artifact could be loaded
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingModelPolicy {
    /// Skip fusion and score with the rule engine alone
    #[default]
    RulesOnly,
    /// Fuse the weighted-sum heuristic with the rule engine
    Heuristic,
}

/// Decision emitted when the pipeline itself faults
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Approved / allow, flagged as degraded
    #[default]
    Approve,
    /// Review / investigate, flagged as degraded
    Review,
}

/// Baseline score the rule engine starts from
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BaselineConfig {
    Fixed { value: u8 },
    /// Noise drawn from `[min, max]` with an RNG seeded by `seed` and the transaction id
    Seeded { min: u8, max: u8, seed: u64 },
}

impl Default for BaselineConfig {
    fn default() -> Self {
        BaselineConfig::Fixed { value: 10 }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    pub remote: RemoteConfig,
    pub features: FeatureConfig,
    pub rules: RulesConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming analyze requests
    pub transaction_subject: String,
    /// Subject for outgoing decisions
    pub decision_subject: String,
    /// Subject for outgoing fraud alerts
    pub alert_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            transaction_subject: "transactions".to_string(),
            decision_subject: "fraud.decisions".to_string(),
            alert_subject: "fraud.alerts".to_string(),
        }
    }
}

/// Local model artifact locations. Nothing is discovered implicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// ONNX model file
    pub model_path: Option<PathBuf>,
    /// JSON manifest: version and ordered feature names
    pub manifest_path: Option<PathBuf>,
    /// Optional JSON standard scaler
    pub scaler_path: Option<PathBuf>,
    /// Optional CSV feature-importance table
    pub importance_path: Option<PathBuf>,
    /// Intra-op threads for ONNX inference
    pub onnx_threads: usize,
    pub missing_model_policy: MissingModelPolicy,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            manifest_path: None,
            scaler_path: None,
            importance_path: None,
            onnx_threads: 1,
            missing_model_policy: MissingModelPolicy::RulesOnly,
        }
    }
}

/// Remote inference service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub health_timeout_ms: u64,
    pub predict_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:5002".to_string(),
            health_timeout_ms: 2000,
            predict_timeout_ms: 5000,
        }
    }
}

/// Feature extraction parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Locations scored as high risk (exact match)
    pub high_risk_locations: Vec<String>,
    /// Merchant substrings scored as suspicious (case-sensitive)
    pub suspicious_merchants: Vec<String>,
    /// Reference average amount for the deviation feature
    pub reference_amount: f64,
    /// Velocity proxy used when the customer has no history
    pub default_velocity: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            high_risk_locations: vec![
                "High Risk Zone".to_string(),
                "Lagos, Nigeria".to_string(),
                "Unknown".to_string(),
            ],
            suspicious_merchants: vec![
                "Crypto".to_string(),
                "Casino".to_string(),
                "Betting".to_string(),
                "Dark".to_string(),
            ],
            reference_amount: 1000.0,
            default_velocity: 0.3,
        }
    }
}

impl FeatureConfig {
    pub fn is_high_risk_location(&self, location: &str) -> bool {
        let location = location.trim();
        self.high_risk_locations.iter().any(|l| l == location)
    }

    pub fn is_suspicious_merchant(&self, merchant: &str) -> bool {
        self.suspicious_merchants
            .iter()
            .any(|k| !k.is_empty() && merchant.contains(k.as_str()))
    }
}

/// Rule engine parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Country the customer base is expected in
    pub home_country: String,
    pub high_risk_countries: Vec<String>,
    /// Location value that earns the extra sentinel penalty
    pub high_risk_zone: String,
    /// IPs that suppress the sentinel penalty (local testing)
    pub exempt_ips: Vec<String>,
    pub new_account_hours: f64,
    pub new_account_amount_floor: f64,
    pub spike_multiplier: f64,
    pub spike_min_history: u32,
    pub elevated_user_risk: f64,
    /// Increment for a matching dynamic rule without its own weight
    pub dynamic_rule_increment: u32,
    pub baseline: BaselineConfig,
    /// JSON array of dynamic rules loaded by the service binary
    pub rules_path: Option<PathBuf>,
    /// Reload interval for `rules_path`
    pub refresh_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            home_country: "IN".to_string(),
            high_risk_countries: vec!["NG".to_string(), "RU".to_string(), "KP".to_string()],
            high_risk_zone: "High Risk Zone".to_string(),
            exempt_ips: vec!["127.0.0.1".to_string(), "N/A".to_string()],
            new_account_hours: 24.0,
            new_account_amount_floor: 500.0,
            spike_multiplier: 4.0,
            spike_min_history: 3,
            elevated_user_risk: 50.0,
            dynamic_rule_increment: 20,
            baseline: BaselineConfig::default(),
            rules_path: None,
            refresh_secs: 60,
        }
    }
}

/// Fusion weights, thresholds and failure policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub thresholds: RiskThresholds,
    pub ml_weight: f64,
    pub rule_weight: f64,
    pub failure_policy: FailurePolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
            ml_weight: 0.7,
            rule_weight: 0.3,
            failure_policy: FailurePolicy::Approve,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent decisions
    pub workers: usize,
    /// Metrics summary interval
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 30,
        }
    }
}

/// Retention for the in-memory decision store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Decisions kept before the oldest settled ones are evicted; 0 keeps everything
    pub max_decisions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_decisions: 100_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/config.toml` plus `FRAUD__*` overrides
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("FRAUD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the decision logic cannot work with
    pub fn validate(&self) -> Result<()> {
        let t = &self.detection.thresholds;
        if !(t.block > t.investigate && t.investigate > t.monitor) {
            bail!(
                "risk thresholds must satisfy block > investigate > monitor (got {} / {} / {})",
                t.block,
                t.investigate,
                t.monitor
            );
        }
        if t.block > 100 {
            bail!("block threshold {} is above the maximum score of 100", t.block);
        }
        Ok(())
    }
}
