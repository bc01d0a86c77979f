//! Model artifact loader

use crate::config::ModelsConfig;
use crate::models::classifier::{FraudClassifier, OnnxClassifier};
use crate::models::scaler::StandardScaler;
use anyhow::{bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Manifest shipped with every model artifact
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    pub version: String,
    /// Input features in model order
    pub feature_names: Vec<String>,
}

impl ModelManifest {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest: ModelManifest = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        if manifest.feature_names.is_empty() {
            bail!("manifest {} declares no features", path.display());
        }
        Ok(manifest)
    }
}

#[derive(Debug, Deserialize)]
struct ImportanceRow {
    #[serde(alias = "Feature")]
    feature: String,
    #[serde(alias = "Importance")]
    importance: f64,
}

/// Feature importance table, sorted most important first
#[derive(Debug, Clone, Default)]
pub struct FeatureImportance {
    entries: Vec<(String, f64)>,
}

impl FeatureImportance {
    pub fn new(mut entries: Vec<(String, f64)>) -> Self {
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        Self { entries }
    }

    /// Load a `feature,importance` CSV
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open importance table {}", path.display()))?;

        let mut entries = Vec::new();
        for row in reader.deserialize::<ImportanceRow>() {
            let row = row.with_context(|| format!("Bad row in {}", path.display()))?;
            if row.importance.is_finite() {
                entries.push((row.feature, row.importance));
            }
        }
        Ok(Self::new(entries))
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == feature)
            .map(|(_, importance)| *importance)
    }

    pub fn top(&self, n: usize) -> impl Iterator<Item = &(String, f64)> {
        self.entries.iter().take(n)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the local scorer needs from disk
pub struct LoadedArtifacts {
    pub classifier: Box<dyn FraudClassifier>,
    pub scaler: Option<StandardScaler>,
    pub importance: Option<FeatureImportance>,
}

/// Loader for explicitly configured model artifacts
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load model, manifest and optional side artifacts.
    ///
    /// The model and manifest are required; a broken scaler or importance
    /// table is logged and ignored.
    pub fn load(&self, config: &ModelsConfig) -> Result<LoadedArtifacts> {
        let Some(model_path) = config.model_path.as_deref() else {
            bail!("no model artifact configured");
        };
        let Some(manifest_path) = config.manifest_path.as_deref() else {
            bail!("model {} has no manifest configured", model_path.display());
        };

        let manifest = ModelManifest::from_path(manifest_path)?;
        let classifier = self.load_onnx(model_path, manifest)?;

        let scaler = config.scaler_path.as_deref().and_then(|path| {
            StandardScaler::from_path(path)
                .map_err(|e| warn!(path = %path.display(), error = %e, "Scaler not loaded"))
                .ok()
        });

        let importance = config.importance_path.as_deref().and_then(|path| {
            FeatureImportance::from_path(path)
                .map_err(|e| warn!(path = %path.display(), error = %e, "Feature importance not loaded"))
                .ok()
        });

        Ok(LoadedArtifacts {
            classifier: Box::new(classifier),
            scaler,
            importance,
        })
    }

    /// Load a single ONNX model from file
    fn load_onnx(&self, path: &Path, manifest: ModelManifest) -> Result<OnnxClassifier> {
        if !path.exists() {
            bail!("model file {} not found", path.display());
        }

        info!(
            path = %path.display(),
            version = %manifest.version,
            threads = self.onnx_threads,
            "Loading ONNX model"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            input = %input_name,
            output = %output_name,
            features = manifest.feature_names.len(),
            "Model loaded successfully"
        );

        Ok(OnnxClassifier {
            version: manifest.version,
            feature_names: manifest.feature_names,
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_model_is_an_error() {
        let err = ModelLoader::default()
            .load(&ModelsConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("no model artifact configured"));
    }

    #[test]
    fn test_nonexistent_model_file() {
        let mut manifest = tempfile::NamedTempFile::new().unwrap();
        write!(manifest, r#"{{"version": "1.2.0", "feature_names": ["amount"]}}"#).unwrap();

        let config = ModelsConfig {
            model_path: Some("/nonexistent/fraud_model.onnx".into()),
            manifest_path: Some(manifest.path().to_path_buf()),
            ..ModelsConfig::default()
        };

        let err = ModelLoader::default().load(&config).err().unwrap();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_manifest_requires_features() {
        let mut manifest = tempfile::NamedTempFile::new().unwrap();
        write!(manifest, r#"{{"version": "1", "feature_names": []}}"#).unwrap();
        assert!(ModelManifest::from_path(manifest.path()).is_err());
    }

    #[test]
    fn test_importance_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Feature,Importance").unwrap();
        writeln!(file, "hour,12.5").unwrap();
        writeln!(file, "amount,40.0").unwrap();
        writeln!(file, "merchant_risk,3").unwrap();

        let importance = FeatureImportance::from_path(file.path()).unwrap();
        let top: Vec<&str> = importance.top(2).map(|(name, _)| name.as_str()).collect();

        assert_eq!(top, vec!["amount", "hour"]);
        assert_eq!(importance.get("merchant_risk"), Some(3.0));
        assert_eq!(importance.get("velocity"), None);
    }
}
