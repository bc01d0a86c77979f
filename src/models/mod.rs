//! Local ML model tier

pub mod classifier;
pub mod loader;
pub mod local;
pub mod scaler;

pub use classifier::{FraudClassifier, OnnxClassifier};
pub use loader::{FeatureImportance, ModelLoader, ModelManifest};
pub use local::{LocalModelScorer, MlPrediction, HEURISTIC_MODEL_TYPE};
pub use scaler::StandardScaler;
