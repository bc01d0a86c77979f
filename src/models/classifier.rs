//! Binary fraud classifiers behind the local model tier

use crate::error::PipelineError;
use ort::memory::Allocator;
use ort::session::Session;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// A loaded classifier producing a fraud probability.
///
/// Inputs arrive already arranged in `feature_names()` order and scaled.
pub trait FraudClassifier: Send + Sync {
    /// Provenance tag reported on decisions
    fn model_type(&self) -> &str;

    /// Artifact version from the manifest
    fn version(&self) -> &str;

    /// Feature names the model expects, in input order
    fn feature_names(&self) -> &[String];

    /// Probability of the fraud class
    fn predict_proba(&self, inputs: &[f32]) -> Result<f64, PipelineError>;
}

/// ONNX Runtime session for an exported boosted-tree model
pub struct OnnxClassifier {
    pub(crate) version: String,
    pub(crate) feature_names: Vec<String>,
    /// Sessions need exclusive access per run
    pub(crate) session: Mutex<Session>,
    pub(crate) input_name: String,
    pub(crate) output_name: String,
}

impl FraudClassifier for OnnxClassifier {
    fn model_type(&self) -> &str {
        "onnx"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, inputs: &[f32]) -> Result<f64, PipelineError> {
        use ort::value::Tensor;

        let unavailable = |e: ort::Error| PipelineError::ModelUnavailable(e.to_string());

        // Shape [1, num_features]
        let shape = vec![1_i64, inputs.len() as i64];
        let input_tensor = Tensor::from_array((shape, inputs.to_vec())).map_err(unavailable)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(unavailable)?;

        let probability = extract_probability(&outputs, &self.output_name)?;
        Ok(probability.clamp(0.0, 1.0))
    }
}

/// Pull the fraud-class probability out of the session outputs.
///
/// Tree exports emit either a `[batch, classes]` tensor or a
/// `seq(map(int64, float))`.
fn extract_probability(
    outputs: &ort::session::SessionOutputs,
    output_name: &str,
) -> Result<f64, PipelineError> {
    if let Some(output) = outputs.get(output_name) {
        if let Some(prob) = probability_from_value(&output) {
            return Ok(prob);
        }
    }

    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }
        if let Some(prob) = probability_from_value(&output) {
            debug!(output = %name, prob = prob, "Extracted probability from fallback output");
            return Ok(prob);
        }
    }

    warn!(output = %output_name, "No probability output found");
    Err(PipelineError::ModelUnavailable(
        "model produced no probability output".to_string(),
    ))
}

fn probability_from_value(output: &ort::value::DynValue) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return fraud_prob_from_tensor(&dims, data);
    }

    if DynSequenceValueType::can_downcast(&output.dtype()) {
        return fraud_prob_from_sequence_map(output);
    }

    None
}

/// Fraud probability from tensor data: class 1 of a two-class output,
/// or the single value of a one-class output
fn fraud_prob_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = dims.last().copied().unwrap_or(0);
    match classes {
        n if n >= 2 => data.get(1).map(|&p| f64::from(p)),
        1 => data.first().map(|&p| f64::from(p)),
        _ => data.last().map(|&p| f64::from(p)),
    }
}

fn fraud_prob_from_sequence_map(output: &ort::value::DynValue) -> Option<f64> {
    let allocator = Allocator::default();
    let sequence = output.downcast_ref::<DynSequenceValueType>().ok()?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .ok()?;
    let first = maps.first()?;
    let pairs = first.try_extract_key_values::<i64, f32>().ok()?;

    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Some(f64::from(*prob));
    }
    pairs
        .iter()
        .find(|(class, _)| *class == 0)
        .map(|(_, prob)| 1.0 - f64::from(*prob))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_two_class() {
        assert_eq!(fraud_prob_from_tensor(&[1, 2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(fraud_prob_from_tensor(&[2], &[0.4, 0.6]), Some(0.6000000238418579));
    }

    #[test]
    fn test_tensor_single_value() {
        assert_eq!(fraud_prob_from_tensor(&[1, 1], &[0.5]), Some(0.5));
        assert_eq!(fraud_prob_from_tensor(&[], &[]), None);
    }
}
