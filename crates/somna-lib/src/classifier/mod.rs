//! Apnea event classification over normalized window batches.
//!
//! The classifier itself is an opaque capability loaded once per process and
//! shared across sessions, so implementations only get `&self`.

pub mod onnx;

pub use onnx::OnnxClassifier;

use crate::{
    error::{AnalysisError, AnalysisResult},
    segment::SegmentBatch,
};
use serde::{Deserialize, Serialize};

/// Maps `N` normalized windows to `N` apnea probabilities, in input order.
pub trait EventClassifier: Send + Sync {
    fn predict(&self, batch: &SegmentBatch) -> AnalysisResult<Vec<f64>>;

    /// Window length the classifier expects, when it is fixed.
    fn input_len(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventPrediction {
    pub probability: f64,
    pub is_event: bool,
}

impl EventPrediction {
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        Self {
            probability,
            is_event: probability > threshold,
        }
    }
}

/// Run `classifier` on `batch` and check its output before trusting it.
pub fn classify_events(
    classifier: &dyn EventClassifier,
    batch: &SegmentBatch,
    threshold: f64,
) -> AnalysisResult<Vec<EventPrediction>> {
    if let Some(expected) = classifier.input_len() {
        if expected != batch.window_size {
            return Err(AnalysisError::shape(format!(
                "classifier expects {}-sample windows, batch has {}",
                expected, batch.window_size
            )));
        }
    }
    let probabilities = classifier.predict(batch)?;
    if probabilities.len() != batch.len() {
        return Err(AnalysisError::CapabilityContract(format!(
            "classifier returned {} probabilities for {} windows",
            probabilities.len(),
            batch.len()
        )));
    }
    probabilities
        .into_iter()
        .enumerate()
        .map(|(idx, p)| {
            if p.is_finite() && (0.0..=1.0).contains(&p) {
                Ok(EventPrediction::from_probability(p, threshold))
            } else {
                Err(AnalysisError::CapabilityContract(format!(
                    "probability {} for window {} is outside [0, 1]",
                    p, idx
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::NormalizationMode;

    struct Fixed(Vec<f64>);

    impl EventClassifier for Fixed {
        fn predict(&self, _batch: &SegmentBatch) -> AnalysisResult<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    fn batch(n: usize) -> SegmentBatch {
        SegmentBatch {
            window_size: 2,
            data: vec![0.0; n * 2],
            mode: NormalizationMode::BatchGlobal,
            mean: 0.0,
            std: 1.0,
        }
    }

    #[test]
    fn threshold_is_strict() {
        let preds = classify_events(&Fixed(vec![0.5, 0.51, 0.0]), &batch(3), 0.5).unwrap();
        let flags: Vec<bool> = preds.iter().map(|p| p.is_event).collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn wrong_output_count_breaks_contract() {
        let err = classify_events(&Fixed(vec![0.1]), &batch(2), 0.5).unwrap_err();
        assert!(matches!(err, AnalysisError::CapabilityContract(_)));
    }

    #[test]
    fn out_of_range_probability_breaks_contract() {
        let err = classify_events(&Fixed(vec![0.1, f64::NAN]), &batch(2), 0.5).unwrap_err();
        assert!(matches!(err, AnalysisError::CapabilityContract(_)));
        let err = classify_events(&Fixed(vec![1.2, 0.0]), &batch(2), 0.5).unwrap_err();
        assert!(matches!(err, AnalysisError::CapabilityContract(_)));
    }
}
