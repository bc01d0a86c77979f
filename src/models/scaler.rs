//! Standard scaler exported alongside the model

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Per-feature `(x - mean) / scale`
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Load `{ "mean": [...], "scale": [...] }` from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler from {}", path.display()))?;
        let scaler: StandardScaler = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scaler {}", path.display()))?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            bail!(
                "scaler mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            );
        }
        if self.mean.is_empty() {
            bail!("scaler is empty");
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Scale in place. Only the prefix both sides cover is touched.
    pub fn transform(&self, features: &mut [f32]) {
        for ((value, mean), scale) in features.iter_mut().zip(&self.mean).zip(&self.scale) {
            let scale = if *scale == 0.0 { 1.0 } else { *scale };
            *value = ((f64::from(*value) - mean) / scale) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_transform() {
        let scaler = StandardScaler::new(vec![10.0, 0.0], vec![2.0, 0.0]).unwrap();
        let mut features = vec![14.0, 3.0, 7.0];
        scaler.transform(&mut features);

        // Zero scale is treated as one; the unscaled tail is kept
        assert_eq!(features, vec![2.0, 3.0, 7.0]);
    }

    #[test]
    fn test_rejects_ragged_scaler() {
        assert!(StandardScaler::new(vec![1.0], vec![1.0, 2.0]).is_err());
        assert!(StandardScaler::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mean": [1.0, 2.0], "scale": [1.0, 4.0]}}"#).unwrap();

        let scaler = StandardScaler::from_path(file.path()).unwrap();
        assert_eq!(scaler.dimension(), 2);
    }
}
