//! Deterministic, explainable rule scoring.
//!
//! Built-in heuristics plus externally supplied dynamic rules. Every
//! contribution carries the reason string shown to analysts.

use crate::config::{BaselineConfig, FeatureConfig, RulesConfig};
use crate::types::rule::Rule;
use crate::types::transaction::TransactionInput;
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

const MAX_SCORE: u32 = 100;

/// Starting score for a transaction
#[derive(Debug, Clone, Copy)]
pub enum Baseline {
    Fixed(u8),
    /// Reproducible noise: the same seed and transaction id give the same value
    Seeded { min: u8, max: u8, seed: u64 },
}

impl Baseline {
    pub fn value_for(&self, transaction_id: &str) -> u8 {
        match *self {
            Baseline::Fixed(value) => value,
            Baseline::Seeded { min, max, seed } => {
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                let mut rng = ChaCha8Rng::seed_from_u64(seed ^ fnv1a(transaction_id.as_bytes()));
                rng.gen_range(lo..=hi)
            }
        }
    }
}

impl From<BaselineConfig> for Baseline {
    fn from(config: BaselineConfig) -> Self {
        match config {
            BaselineConfig::Fixed { value } => Baseline::Fixed(value),
            BaselineConfig::Seeded { min, max, seed } => Baseline::Seeded { min, max, seed },
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Result of rule evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// Capped score (0-100)
    pub score: u8,
    pub baseline: u8,
    pub reasons: Vec<String>,
    /// Names of dynamic rules that matched
    pub matched_rules: Vec<String>,
    /// Dynamic rules skipped because their condition did not parse
    pub skipped_rules: usize,
}

/// Accumulates score contributions and their reasons
struct Scorecard {
    score: u32,
    reasons: Vec<String>,
}

impl Scorecard {
    fn add(&mut self, points: u32, reason: impl Into<String>) {
        self.score = self.score.saturating_add(points);
        self.reasons.push(reason.into());
    }
}

/// Rule engine over built-in heuristics and dynamic rules
pub struct RuleEngine {
    config: RulesConfig,
    features: FeatureConfig,
    baseline: Baseline,
}

impl RuleEngine {
    pub fn new(config: RulesConfig, features: FeatureConfig) -> Self {
        let baseline = Baseline::from(config.baseline);
        Self {
            config,
            features,
            baseline,
        }
    }

    /// Replace the baseline component
    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Score a transaction against the built-ins and a rule snapshot
    pub fn evaluate(&self, tx: &TransactionInput, rules: &[Rule]) -> RuleOutcome {
        self.evaluate_at(tx, rules, Utc::now())
    }

    /// Score with an explicit clock for account-age checks
    pub fn evaluate_at(
        &self,
        tx: &TransactionInput,
        rules: &[Rule],
        now: DateTime<Utc>,
    ) -> RuleOutcome {
        let baseline = self.baseline.value_for(&tx.transaction_id);
        let mut card = Scorecard {
            score: u32::from(baseline),
            reasons: Vec::new(),
        };

        self.score_amount(tx, &mut card);
        self.score_geography(tx, &mut card);
        self.score_merchant(tx, &mut card);
        self.score_profile(tx, now, &mut card);
        let (matched_rules, skipped_rules) = self.score_dynamic(tx, rules, &mut card);

        let score = card.score.min(MAX_SCORE) as u8;
        debug!(
            transaction_id = %tx.transaction_id,
            rule_score = score,
            reasons = card.reasons.len(),
            "Rule evaluation complete"
        );

        RuleOutcome {
            score,
            baseline,
            reasons: card.reasons,
            matched_rules,
            skipped_rules,
        }
    }

    fn score_amount(&self, tx: &TransactionInput, card: &mut Scorecard) {
        let amount = tx.safe_amount();
        if amount > 15000.0 {
            card.add(55, format!("Rule: Critical transaction amount (${amount:.2})"));
        } else if amount > 5000.0 {
            card.add(30, "Rule: High transaction value");
        } else if amount > 1000.0 {
            card.add(10, "Rule: Moderate transaction value");
        }
    }

    fn score_geography(&self, tx: &TransactionInput, card: &mut Scorecard) {
        let country = tx.country.trim().to_ascii_uppercase();

        let risky_country = self
            .config
            .high_risk_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&country));
        if self.features.is_high_risk_location(&tx.location) || risky_country {
            card.add(45, format!("Rule: High-risk geographic location: {}", tx.location));
        }

        let home = self.config.home_country.to_ascii_uppercase();
        if !country.is_empty() && country != "UNKNOWN" && country != "XX" && country != home {
            card.add(
                40,
                format!("Rule: Location mismatch (transaction in {country} vs home {home})"),
            );
        }

        let exempt_ip = self
            .config
            .exempt_ips
            .iter()
            .any(|ip| ip == tx.ip_address.trim());
        if !exempt_ip && tx.location.trim() == self.config.high_risk_zone {
            card.add(50, "Rule: High Risk Zone detected");
        }
    }

    fn score_merchant(&self, tx: &TransactionInput, card: &mut Scorecard) {
        if self.features.is_suspicious_merchant(&tx.merchant) {
            card.add(35, "Rule: High-risk merchant category");
        }
    }

    fn score_profile(&self, tx: &TransactionInput, now: DateTime<Utc>, card: &mut Scorecard) {
        let amount = tx.safe_amount();
        let history = &tx.history;

        if let Some(age_hours) = history.account_age_hours(now) {
            if age_hours < self.config.new_account_hours
                && amount > self.config.new_account_amount_floor
            {
                card.add(50, "Rule: High value on new account (<24h)");
            }
        }

        if history.user_txn_count >= self.config.spike_min_history
            && amount > history.average_amount() * self.config.spike_multiplier
        {
            card.add(
                40,
                format!(
                    "Rule: Spending spike ({}x average)",
                    self.config.spike_multiplier
                ),
            );
        }

        if history.user_risk_score > self.config.elevated_user_risk {
            card.add(25, "Rule: User has elevated risk profile");
        }
    }

    fn score_dynamic(
        &self,
        tx: &TransactionInput,
        rules: &[Rule],
        card: &mut Scorecard,
    ) -> (Vec<String>, usize) {
        let mut matched = Vec::new();
        let mut skipped = 0;

        for rule in rules.iter().filter(|r| r.is_active()) {
            let condition = match rule.parse_condition() {
                Ok(condition) => condition,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Skipping malformed rule");
                    skipped += 1;
                    continue;
                }
            };

            if condition.matches(tx) {
                let points = rule.increment(self.config.dynamic_rule_increment);
                card.add(points, format!("Rule: {}", rule.name));
                matched.push(rule.name.clone());
            }
        }

        (matched, skipped)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(RulesConfig::default(), FeatureConfig::default())
    }
}
