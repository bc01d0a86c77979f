//! Local model tier: trained classifier with a weighted-sum fallback

use crate::config::ModelsConfig;
use crate::feature_extractor::{
    FeatureVector, FEATURE_NAMES, IDX_AMOUNT, IDX_HOUR, IDX_LOCATION_RISK, IDX_MERCHANT_RISK,
    IDX_VELOCITY,
};
use crate::error::PipelineError;
use crate::models::classifier::FraudClassifier;
use crate::models::loader::{FeatureImportance, ModelLoader};
use crate::models::scaler::StandardScaler;
use tracing::{debug, info, warn};

/// Model type reported when no trained model produced the score
pub const HEURISTIC_MODEL_TYPE: &str = "rules-fallback";

const MAX_ML_REASONS: usize = 5;
const UNUSUAL_HOURS: std::ops::RangeInclusive<f32> = 2.0..=5.0;

/// Output of the local model tier
#[derive(Debug, Clone, PartialEq)]
pub struct MlPrediction {
    /// Fraud probability (0.0 - 1.0)
    pub fraud_probability: f64,
    /// max(p, 1 - p)
    pub confidence: f64,
    /// Headline plus top contributing factors
    pub reasons: Vec<String>,
    pub model_type: String,
    pub model_version: Option<String>,
}

/// Contributing signal behind a prediction
struct Factor {
    feature: &'static str,
    description: String,
    impact: f64,
}

/// Wraps the loaded classifier; read-only after construction
pub struct LocalModelScorer {
    classifier: Option<Box<dyn FraudClassifier>>,
    scaler: Option<StandardScaler>,
    importance: Option<FeatureImportance>,
}

impl LocalModelScorer {
    /// Load configured artifacts, degrading to the heuristic when that fails
    pub fn load(config: &ModelsConfig) -> Self {
        match ModelLoader::new(config.onnx_threads).load(config) {
            Ok(artifacts) => {
                info!(
                    model_type = artifacts.classifier.model_type(),
                    version = artifacts.classifier.version(),
                    scaler = artifacts.scaler.is_some(),
                    importance = artifacts.importance.is_some(),
                    "Local model scorer ready"
                );
                Self {
                    classifier: Some(artifacts.classifier),
                    scaler: artifacts.scaler,
                    importance: artifacts.importance,
                }
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Model unavailable, local scorer using heuristic");
                Self::heuristic()
            }
        }
    }

    /// Scorer with no trained model
    pub fn heuristic() -> Self {
        Self {
            classifier: None,
            scaler: None,
            importance: None,
        }
    }

    pub fn with_classifier(classifier: Box<dyn FraudClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
            scaler: None,
            importance: None,
        }
    }

    pub fn with_scaler(mut self, scaler: StandardScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_importance(mut self, importance: FeatureImportance) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Whether a trained model is loaded
    pub fn has_model(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn model_type(&self) -> &str {
        self.classifier
            .as_ref()
            .map(|c| c.model_type())
            .unwrap_or(HEURISTIC_MODEL_TYPE)
    }

    /// Fraud probability for a feature vector. Never fails.
    pub fn predict(&self, features: &FeatureVector) -> MlPrediction {
        let (fraud_probability, model_type, model_version) = match &self.classifier {
            Some(classifier) => {
                let inputs = self.model_inputs(classifier.as_ref(), features);
                match classifier.predict_proba(&inputs) {
                    Ok(p) => (
                        p,
                        classifier.model_type().to_string(),
                        Some(classifier.version().to_string()),
                    ),
                    Err(e) => {
                        warn!(error = %e, "Model inference failed, using heuristic for this call");
                        (heuristic_probability(features), HEURISTIC_MODEL_TYPE.to_string(), None)
                    }
                }
            }
            None => (heuristic_probability(features), HEURISTIC_MODEL_TYPE.to_string(), None),
        };

        let fraud_probability = if fraud_probability.is_finite() {
            fraud_probability.clamp(0.0, 1.0)
        } else {
            0.5
        };

        debug!(
            model_type = %model_type,
            fraud_probability = fraud_probability,
            "Local model prediction"
        );

        MlPrediction {
            fraud_probability,
            confidence: fraud_probability.max(1.0 - fraud_probability),
            reasons: self.reasons(features, fraud_probability),
            model_type,
            model_version,
        }
    }

    /// Arrange and scale features for the loaded model
    fn model_inputs(&self, classifier: &dyn FraudClassifier, features: &FeatureVector) -> Vec<f32> {
        let mut inputs = arrange_inputs(classifier.feature_names(), features);
        if let Some(scaler) = &self.scaler {
            if let Some(mismatch) = scaler_mismatch(scaler, inputs.len()) {
                debug!(error = %mismatch, "Scaling overlapping prefix only");
            }
            scaler.transform(&mut inputs);
        }
        inputs
    }

    fn reasons(&self, features: &FeatureVector, fraud_probability: f64) -> Vec<String> {
        let headline = if fraud_probability > 0.7 {
            "High"
        } else if fraud_probability > 0.4 {
            "Moderate"
        } else {
            "Low"
        };
        let mut reasons = vec![format!(
            "ML Model: {headline} fraud risk ({:.1}%)",
            fraud_probability * 100.0
        )];

        let mut factors = contributing_factors(features);
        match &self.importance {
            Some(importance) if !importance.is_empty() => {
                let weight = |f: &Factor| importance.get(f.feature).unwrap_or(0.0);
                factors.sort_by(|a, b| weight(b).total_cmp(&weight(a)));
            }
            _ => factors.sort_by(|a, b| b.impact.total_cmp(&a.impact)),
        }

        reasons.extend(
            factors
                .into_iter()
                .take(MAX_ML_REASONS - 1)
                .map(|f| format!("ML Factor: {} (impact: {:.2})", f.description, f.impact)),
        );
        reasons
    }
}

/// Order features the way the model declares them.
///
/// Known names are looked up; unknown names get zero. A model whose names
/// share nothing with ours is fed positionally.
fn arrange_inputs(expected: &[String], features: &FeatureVector) -> Vec<f32> {
    let positions: Vec<Option<usize>> = expected
        .iter()
        .map(|name| FEATURE_NAMES.iter().position(|known| known == name))
        .collect();

    if positions.iter().all(Option::is_none) {
        return features.aligned_to(expected.len());
    }

    positions
        .into_iter()
        .map(|idx| idx.map(|i| features.get(i)).unwrap_or(0.0))
        .collect()
}

fn scaler_mismatch(scaler: &StandardScaler, inputs: usize) -> Option<PipelineError> {
    (scaler.dimension() != inputs).then(|| PipelineError::FeatureMismatch {
        expected: inputs,
        actual: scaler.dimension(),
    })
}

/// Weighted-sum estimate used when no trained model is available
pub fn heuristic_probability(features: &FeatureVector) -> f64 {
    let amount = f64::from(features.get(IDX_AMOUNT));
    let hour = features.get(IDX_HOUR);

    let mut score = 0.0;
    if amount > 10000.0 {
        score += 0.4;
    } else if amount > 5000.0 {
        score += 0.2;
    }
    if UNUSUAL_HOURS.contains(&hour) {
        score += 0.15;
    }
    score += f64::from(features.get(IDX_LOCATION_RISK)) * 0.3;
    score += f64::from(features.get(IDX_MERCHANT_RISK)) * 0.2;
    score += f64::from(features.get(IDX_VELOCITY)) * 0.15;

    score.min(1.0)
}

fn contributing_factors(features: &FeatureVector) -> Vec<Factor> {
    let amount = f64::from(features.get(IDX_AMOUNT));
    let hour = features.get(IDX_HOUR);
    let location_risk = f64::from(features.get(IDX_LOCATION_RISK));
    let merchant_risk = f64::from(features.get(IDX_MERCHANT_RISK));
    let velocity = f64::from(features.get(IDX_VELOCITY));

    let mut factors = Vec::new();
    if amount > 5000.0 {
        factors.push(Factor {
            feature: "amount",
            description: format!("amount = {amount:.2}"),
            impact: (amount / 50000.0).min(0.25),
        });
    }
    if UNUSUAL_HOURS.contains(&hour) {
        factors.push(Factor {
            feature: "hour",
            description: format!("unusual_hour = {hour}:00"),
            impact: 0.15,
        });
    }
    if location_risk > 0.5 {
        factors.push(Factor {
            feature: "location_risk",
            description: format!("location_risk = {location_risk:.2}"),
            impact: location_risk * 0.3,
        });
    }
    if merchant_risk > 0.7 {
        factors.push(Factor {
            feature: "merchant_risk",
            description: format!("merchant_risk = {merchant_risk:.2}"),
            impact: merchant_risk * 0.2,
        });
    }
    if velocity > 0.5 {
        factors.push(Factor {
            feature: "velocity",
            description: format!("velocity = {velocity:.2}"),
            impact: velocity * 0.15,
        });
    }
    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifier returning a fixed probability and recording its inputs
    struct FixedClassifier {
        probability: Result<f64, String>,
        names: Vec<String>,
        seen: parking_lot::Mutex<Vec<Vec<f32>>>,
    }

    impl FixedClassifier {
        fn new(probability: f64, names: &[&str]) -> Self {
            Self {
                probability: Ok(probability),
                names: names.iter().map(|n| n.to_string()).collect(),
                seen: parking_lot::Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                probability: Err("session crashed".to_string()),
                ..Self::new(0.0, &FEATURE_NAMES)
            }
        }
    }

    impl FraudClassifier for FixedClassifier {
        fn model_type(&self) -> &str {
            "fixed"
        }

        fn version(&self) -> &str {
            "test-1"
        }

        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(&self, inputs: &[f32]) -> Result<f64, PipelineError> {
            self.seen.lock().push(inputs.to_vec());
            self.probability
                .clone()
                .map_err(PipelineError::ModelUnavailable)
        }
    }

    fn vector(amount: f32, hour: f32, location: f32, merchant: f32) -> FeatureVector {
        FeatureVector::from_values(vec![amount, hour, 2.0, location, merchant, 0.3, 0.0])
    }

    #[test]
    fn test_heuristic_scorer_reports_fallback_type() {
        let scorer = LocalModelScorer::heuristic();
        assert!(!scorer.has_model());
        assert_eq!(scorer.model_type(), HEURISTIC_MODEL_TYPE);

        let prediction = scorer.predict(&vector(100.0, 12.0, 0.2, 0.5));
        assert_eq!(prediction.model_type, "rules-fallback");
        assert!(prediction.model_version.is_none());
        // 0.06 + 0.1 + 0.045
        assert!((prediction.fraud_probability - 0.205).abs() < 1e-6);
        assert!((prediction.confidence - 0.795).abs() < 1e-6);
        assert!(prediction.reasons[0].starts_with("ML Model: Low fraud risk"));
    }

    #[test]
    fn test_heuristic_caps_at_one() {
        let p = heuristic_probability(&FeatureVector::from_values(vec![
            20000.0, 3.0, 0.0, 0.9, 0.95, 1.0, 1.0,
        ]));
        // 0.4 + 0.15 + 0.27 + 0.19 + 0.15 = 1.16
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_missing_artifact_degrades() {
        let scorer = LocalModelScorer::load(&ModelsConfig::default());
        assert!(!scorer.has_model());
        assert_eq!(scorer.model_type(), HEURISTIC_MODEL_TYPE);
    }

    #[test]
    fn test_classifier_inputs_follow_manifest_order() {
        let classifier = FixedClassifier::new(0.8, &["merchant_risk", "amount", "device_age"]);
        let scorer = LocalModelScorer::with_classifier(Box::new(classifier));

        let prediction = scorer.predict(&vector(6000.0, 12.0, 0.2, 0.95));
        assert_eq!(prediction.model_type, "fixed");
        assert_eq!(prediction.model_version.as_deref(), Some("test-1"));
        assert_eq!(prediction.fraud_probability, 0.8);
        assert!(prediction.reasons[0].starts_with("ML Model: High fraud risk"));
    }

    #[test]
    fn test_arrange_inputs() {
        let features = vector(6000.0, 12.0, 0.2, 0.95);

        let named: Vec<String> = ["merchant_risk", "amount", "device_age"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(arrange_inputs(&named, &features), vec![0.95, 6000.0, 0.0]);

        // Anonymous model columns are fed positionally and zero-padded
        let anonymous: Vec<String> = (0..9).map(|i| format!("f{i}")).collect();
        let arranged = arrange_inputs(&anonymous, &features);
        assert_eq!(arranged.len(), 9);
        assert_eq!(arranged[0], 6000.0);
        assert_eq!(arranged[8], 0.0);
    }

    #[test]
    fn test_failing_classifier_falls_back_per_call() {
        let scorer = LocalModelScorer::with_classifier(Box::new(FixedClassifier::failing()));
        let prediction = scorer.predict(&vector(100.0, 12.0, 0.2, 0.5));

        assert!(scorer.has_model());
        assert_eq!(prediction.model_type, HEURISTIC_MODEL_TYPE);
        assert!((prediction.fraud_probability - 0.205).abs() < 1e-6);
    }

    #[test]
    fn test_scaler_applied_before_inference() {
        let classifier = std::sync::Arc::new(FixedClassifier::new(0.5, &["amount", "hour"]));

        struct Shared(std::sync::Arc<FixedClassifier>);
        impl FraudClassifier for Shared {
            fn model_type(&self) -> &str {
                self.0.model_type()
            }
            fn version(&self) -> &str {
                self.0.version()
            }
            fn feature_names(&self) -> &[String] {
                self.0.feature_names()
            }
            fn predict_proba(&self, inputs: &[f32]) -> Result<f64, PipelineError> {
                self.0.predict_proba(inputs)
            }
        }

        let scorer = LocalModelScorer::with_classifier(Box::new(Shared(classifier.clone())))
            .with_scaler(StandardScaler::new(vec![1000.0, 12.0], vec![500.0, 6.0]).unwrap());
        scorer.predict(&vector(2000.0, 18.0, 0.2, 0.5));

        assert_eq!(classifier.seen.lock()[0], vec![2.0, 1.0]);
    }

    #[test]
    fn test_scaler_mismatch_reported() {
        let scaler = StandardScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(scaler_mismatch(&scaler, 2).is_none());

        match scaler_mismatch(&scaler, 7) {
            Some(PipelineError::FeatureMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (7, 2));
            }
            other => panic!("expected FeatureMismatch, got {other:?}"),
        }

        // Prediction still succeeds on the overlapping prefix
        let classifier = FixedClassifier::new(0.6, &FEATURE_NAMES);
        let scorer = LocalModelScorer::with_classifier(Box::new(classifier)).with_scaler(scaler);
        let prediction = scorer.predict(&vector(100.0, 12.0, 0.2, 0.5));
        assert_eq!(prediction.fraud_probability, 0.6);
        assert_eq!(prediction.model_type, "fixed");
    }

    #[test]
    fn test_reasons_bounded_and_ranked_by_importance() {
        let features = FeatureVector::from_values(vec![20000.0, 3.0, 0.0, 0.9, 0.95, 0.9, 1.0]);

        let scorer = LocalModelScorer::heuristic();
        let reasons = scorer.predict(&features).reasons;
        assert_eq!(reasons.len(), MAX_ML_REASONS);
        // Without importance: largest impact first (location 0.27)
        assert!(reasons[1].contains("location_risk"));

        let importance = FeatureImportance::new(vec![
            ("hour".to_string(), 50.0),
            ("amount".to_string(), 10.0),
        ]);
        let scorer = LocalModelScorer::heuristic().with_importance(importance);
        let reasons = scorer.predict(&features).reasons;
        assert!(reasons[1].contains("unusual_hour"));
        assert!(reasons[2].contains("amount"));
    }
}
