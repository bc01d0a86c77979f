//! Score fusion across the local tiers

use crate::config::DetectionConfig;
use crate::models::local::MlPrediction;
use crate::rule_engine::RuleOutcome;
use crate::types::decision::{Action, DecisionStatus, Explainability, RiskThresholds, MAX_REASONS};
use serde_json::json;

const TOP_TIER_REASONS: usize = 3;

/// Combined score of the ML and rule tiers
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub risk_score: u8,
    pub status: DecisionStatus,
    pub action: Action,
    /// ML reasons first, then rule reasons, at most ten
    pub reasons: Vec<String>,
    pub explainability: Explainability,
}

/// Weighted combination of the ML probability and the rule score.
pub struct ScoreFusion {
    ml_weight: f64,
    rule_weight: f64,
    thresholds: RiskThresholds,
}

impl ScoreFusion {
    pub fn new(ml_weight: f64, rule_weight: f64, thresholds: RiskThresholds) -> Self {
        Self {
            ml_weight,
            rule_weight,
            thresholds,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.ml_weight, config.rule_weight, config.thresholds)
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// `round(w_ml * ml + w_rule * rule)`, clamped to [0, 100]
    pub fn combine(&self, ml_score: f64, rule_score: u8) -> u8 {
        let weighted = self.ml_weight * ml_score + self.rule_weight * f64::from(rule_score);
        if weighted.is_finite() {
            weighted.round().clamp(0.0, 100.0) as u8
        } else {
            0
        }
    }

    pub fn fuse(&self, ml: &MlPrediction, rules: &RuleOutcome) -> FusedScore {
        let ml_score = (ml.fraud_probability * 100.0).clamp(0.0, 100.0);
        let risk_score = self.combine(ml_score, rules.score);
        let (status, action) = self.thresholds.classify(risk_score);

        let reasons: Vec<String> = ml
            .reasons
            .iter()
            .chain(rules.reasons.iter())
            .take(MAX_REASONS)
            .cloned()
            .collect();

        let ml_contribution = self.ml_weight * ml_score;
        let rule_contribution = self.rule_weight * f64::from(rules.score);
        let primary_engine = if ml_score > f64::from(rules.score) {
            "ML"
        } else {
            "Rules"
        };

        let mut explainability = Explainability::new();
        explainability.insert("ml_score".into(), json!(ml_score.round() as u8));
        explainability.insert("rule_score".into(), json!(rules.score));
        explainability.insert("final_score".into(), json!(risk_score));
        explainability.insert("ml_weight".into(), json!(self.ml_weight));
        explainability.insert("rule_weight".into(), json!(self.rule_weight));
        explainability.insert("ml_contribution".into(), json!(round2(ml_contribution)));
        explainability.insert("rule_contribution".into(), json!(round2(rule_contribution)));
        explainability.insert("model_type".into(), json!(ml.model_type));
        explainability.insert("ml_fraud_probability".into(), json!(ml.fraud_probability));
        explainability.insert("ml_confidence".into(), json!(ml.confidence));
        explainability.insert("primary_engine".into(), json!(primary_engine));
        explainability.insert(
            "top_ml_reasons".into(),
            json!(ml.reasons.iter().take(TOP_TIER_REASONS).collect::<Vec<_>>()),
        );
        explainability.insert(
            "top_rule_reasons".into(),
            json!(rules.reasons.iter().take(TOP_TIER_REASONS).collect::<Vec<_>>()),
        );
        explainability.insert("matched_rules".into(), json!(rules.matched_rules));

        FusedScore {
            risk_score,
            status,
            action,
            reasons,
            explainability,
        }
    }
}

impl Default for ScoreFusion {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ml(probability: f64, reasons: usize) -> MlPrediction {
        MlPrediction {
            fraud_probability: probability,
            confidence: probability.max(1.0 - probability),
            reasons: (0..reasons).map(|i| format!("ml {i}")).collect(),
            model_type: "onnx".to_string(),
            model_version: Some("1".to_string()),
        }
    }

    fn rules(score: u8, reasons: usize) -> RuleOutcome {
        RuleOutcome {
            score,
            baseline: 10,
            reasons: (0..reasons).map(|i| format!("rule {i}")).collect(),
            matched_rules: Vec::new(),
            skipped_rules: 0,
        }
    }

    #[test]
    fn test_weighted_combination() {
        let fusion = ScoreFusion::default();

        // 0.7 * 80 + 0.3 * 50 = 71
        let fused = fusion.fuse(&ml(0.8, 1), &rules(50, 1));
        assert_eq!(fused.risk_score, 71);
        assert_eq!(fused.status, DecisionStatus::Review);
        assert_eq!(fused.action, Action::Investigate);
    }

    #[test]
    fn test_rounding_not_truncation() {
        let fusion = ScoreFusion::default();
        // 48.1
        assert_eq!(fusion.combine(55.0, 32), 48);
        // 51.9
        assert_eq!(fusion.combine(60.0, 33), 52);
    }

    #[test]
    fn test_classification_boundaries() {
        let fusion = ScoreFusion::default();

        assert_eq!(fusion.fuse(&ml(1.0, 0), &rules(100, 0)).status, DecisionStatus::Blocked);
        assert_eq!(fusion.fuse(&ml(0.0, 0), &rules(0, 0)).status, DecisionStatus::Approved);

        // 0.7 * 50 + 0.3 * 20 = 41 -> monitor
        let fused = fusion.fuse(&ml(0.5, 0), &rules(20, 0));
        assert_eq!(fused.risk_score, 41);
        assert_eq!(fused.action, Action::Monitor);
    }

    #[test]
    fn test_reasons_ml_first_and_truncated() {
        let fused = ScoreFusion::default().fuse(&ml(0.5, 5), &rules(40, 8));

        assert_eq!(fused.reasons.len(), MAX_REASONS);
        assert_eq!(fused.reasons[0], "ml 0");
        assert_eq!(fused.reasons[4], "ml 4");
        assert_eq!(fused.reasons[5], "rule 0");
    }

    #[test]
    fn test_explainability_breakdown() {
        let fused = ScoreFusion::default().fuse(&ml(0.9, 4), &rules(30, 4));
        let ex = &fused.explainability;

        assert_eq!(ex["ml_score"], json!(90));
        assert_eq!(ex["rule_score"], json!(30));
        assert_eq!(ex["final_score"], json!(72));
        assert_eq!(ex["ml_weight"], json!(0.7));
        assert_eq!(ex["ml_contribution"], json!(63.0));
        assert_eq!(ex["rule_contribution"], json!(9.0));
        assert_eq!(ex["primary_engine"], json!("ML"));
        assert_eq!(ex["top_ml_reasons"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_out_of_range_inputs_clamped() {
        let fusion = ScoreFusion::new(2.0, 2.0, RiskThresholds::default());
        assert_eq!(fusion.combine(100.0, 100), 100);
        assert_eq!(fusion.combine(f64::NAN, 10), 0);
    }
}
