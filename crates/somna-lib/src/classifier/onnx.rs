use super::EventClassifier;
use crate::{
    error::{AnalysisError, AnalysisResult},
    segment::SegmentBatch,
};
use anyhow::{anyhow, Result};
use log::{debug, info};
use ndarray::{ArrayViewD, Axis, IxDyn};
use ort::{session::Session, value::Tensor};
use parking_lot::RwLock;
use std::path::Path;

/// Pretrained apnea classifier exported to ONNX.
///
/// The graph takes one `f32` tensor of shape `[N, window_len, 1]` (the layout
/// of a Keras `Conv1D` stack) and returns `N` sigmoid probabilities as
/// `[N]` or `[N, 1]`. ONNX Runtime sessions need exclusive access to run, so
/// concurrent sessions take turns on the lock.
pub struct OnnxClassifier {
    session: RwLock<Session>,
    window_len: usize,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("window_len", &self.window_len)
            .finish()
    }
}

impl OnnxClassifier {
    pub fn from_file(path: &Path, window_len: usize) -> Result<Self> {
        if window_len == 0 {
            anyhow::bail!("window length must be positive");
        }
        if !path.is_file() {
            anyhow::bail!("model {} not found", path.display());
        }
        let session = Session::builder()
            .map_err(|e| anyhow!("failed to create ONNX session builder: {}", e))?
            .commit_from_file(path)
            .map_err(|e| anyhow!("failed to load model {}: {}", path.display(), e))?;
        info!(
            "loaded ONNX classifier {} for {}-sample windows",
            path.display(),
            window_len
        );
        Ok(Self {
            session: RwLock::new(session),
            window_len,
        })
    }

    pub fn from_bytes(bytes: &[u8], window_len: usize) -> Result<Self> {
        if window_len == 0 {
            anyhow::bail!("window length must be positive");
        }
        let session = Session::builder()
            .map_err(|e| anyhow!("failed to create ONNX session builder: {}", e))?
            .commit_from_memory(bytes)
            .map_err(|e| anyhow!("failed to load model from memory: {}", e))?;
        Ok(Self {
            session: RwLock::new(session),
            window_len,
        })
    }
}

fn runtime_error(err: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Inference(err.to_string())
}

impl EventClassifier for OnnxClassifier {
    fn predict(&self, batch: &SegmentBatch) -> AnalysisResult<Vec<f64>> {
        if batch.window_size != self.window_len {
            return Err(AnalysisError::shape(format!(
                "model expects {}-sample windows, got {}",
                self.window_len, batch.window_size
            )));
        }
        let windows = batch.view()?.insert_axis(Axis(2));
        let shape: Vec<i64> = windows.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = windows.iter().map(|&x| x as f32).collect();
        let input = Tensor::from_array((shape, data)).map_err(runtime_error)?;

        let mut session = self.session.write();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(runtime_error)?;
        let (out_shape, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(runtime_error)?;
        let dims: Vec<usize> = out_shape.iter().map(|&d| d.max(0) as usize).collect();
        let probs = ArrayViewD::from_shape(IxDyn(&dims), values).map_err(runtime_error)?;
        debug!("classifier output shape {:?}", probs.shape());

        match probs.shape() {
            [n] | [n, 1] if *n == batch.len() => Ok(probs.iter().map(|&p| p as f64).collect()),
            other => Err(AnalysisError::CapabilityContract(format!(
                "classifier returned shape {:?} for {} windows",
                other,
                batch.len()
            ))),
        }
    }

    fn input_len(&self) -> Option<usize> {
        Some(self.window_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../test_data")
            .join(name)
    }

    fn batch(n: usize, window_size: usize) -> SegmentBatch {
        let data = (0..n * window_size).map(|i| (i % 7) as f64 - 3.0).collect();
        SegmentBatch {
            window_size,
            data,
            mode: Default::default(),
            mean: 0.0,
            std: 1.0,
        }
    }

    #[test]
    fn one_probability_per_window() {
        let model = OnnxClassifier::from_file(&fixture("always_apnea.onnx"), 8).unwrap();
        let probs = model.predict(&batch(3, 8)).unwrap();
        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|&p| p > 0.5 && p < 1.0));

        let model = OnnxClassifier::from_file(&fixture("never_apnea.onnx"), 8).unwrap();
        let probs = model.predict(&batch(2, 8)).unwrap();
        assert!(probs.iter().all(|&p| p > 0.0 && p < 0.5));
    }

    #[test]
    fn window_length_must_match_the_model() {
        let model = OnnxClassifier::from_file(&fixture("always_apnea.onnx"), 8).unwrap();
        let err = model.predict(&batch(2, 6)).unwrap_err();
        assert!(matches!(err, AnalysisError::DataShape(_)));
    }

    #[test]
    fn wrong_output_shape_breaks_the_contract() {
        let model = OnnxClassifier::from_file(&fixture("passthrough.onnx"), 4).unwrap();
        let err = model.predict(&batch(2, 4)).unwrap_err();
        assert!(matches!(err, AnalysisError::CapabilityContract(_)));
    }

    #[test]
    fn missing_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxClassifier::from_file(&dir.path().join("absent.onnx"), 6000).unwrap_err();
        assert!(format!("{err:#}").contains("absent.onnx"));
    }

    #[test]
    fn garbage_bytes_are_not_a_model() {
        assert!(OnnxClassifier::from_bytes(b"not an onnx graph", 6000).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(OnnxClassifier::from_bytes(&[], 0).is_err());
    }
}
