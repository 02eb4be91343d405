//! Fixed-window segmentation of a recording and batch normalization of the
//! resulting windows.

use crate::{
    error::{AnalysisError, AnalysisResult},
    signal::{mean_std, EpochLabel},
};
use log::{debug, warn};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// One full-length window of the raw signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Index of the annotation epoch this window belongs to.
    pub epoch: usize,
    pub samples: Vec<f64>,
    /// 1 when the epoch is annotated as apnea.
    pub label: u8,
}

#[derive(Debug, Clone)]
pub struct Segmentation {
    pub window_size: usize,
    pub segments: Vec<Segment>,
    /// Epochs in the label stream with no full window of signal behind them.
    pub dropped_epochs: usize,
}

impl Segmentation {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.segments.iter().map(|s| s.label).collect()
    }
}

/// Slice `signal` into consecutive non-overlapping windows, one per label.
///
/// Epoch `i` covers `signal[i * window_size .. (i + 1) * window_size]`. A
/// trailing partial window is dropped, never padded, and the number of
/// label epochs left without a window is reported in `dropped_epochs`.
pub fn segment_signal(
    signal: &[f64],
    labels: &[EpochLabel],
    window_size: usize,
) -> AnalysisResult<Segmentation> {
    if window_size == 0 {
        return Err(AnalysisError::shape("window size must be positive"));
    }
    if labels.is_empty() {
        return Err(AnalysisError::shape("annotation stream is empty"));
    }
    reject_non_finite(signal)?;

    let segments: Vec<Segment> = signal
        .chunks_exact(window_size)
        .zip(labels)
        .enumerate()
        .map(|(epoch, (window, label))| Segment {
            epoch,
            samples: window.to_vec(),
            label: label.as_flag(),
        })
        .collect();

    if segments.is_empty() {
        return Err(AnalysisError::shape(format!(
            "signal of {} samples is shorter than one {}-sample window",
            signal.len(),
            window_size
        )));
    }

    let dropped_epochs = labels.len() - segments.len();
    if dropped_epochs > 0 {
        warn!(
            "signal ends after {} full windows; ignoring {} trailing annotation epochs",
            segments.len(),
            dropped_epochs
        );
    }
    debug!(
        "segmented {} samples into {} windows of {}",
        signal.len(),
        segments.len(),
        window_size
    );

    Ok(Segmentation {
        window_size,
        segments,
        dropped_epochs,
    })
}

/// Scope of the mean/std statistics used to standardize windows.
///
/// `BatchGlobal` is the default and matches how the event classifier was
/// trained: changing it changes AHI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationMode {
    #[default]
    BatchGlobal,
    PerWindow,
}

/// NaN or infinite samples would poison the batch statistics.
pub(crate) fn reject_non_finite(samples: &[f64]) -> AnalysisResult<()> {
    match samples.iter().position(|x| !x.is_finite()) {
        Some(idx) => Err(AnalysisError::shape(format!(
            "sample {} is not finite ({})",
            idx, samples[idx]
        ))),
        None => Ok(()),
    }
}

/// Normalized windows stored row-major, `len() x window_size`.
#[derive(Debug, Clone)]
pub struct SegmentBatch {
    pub window_size: usize,
    pub data: Vec<f64>,
    pub mode: NormalizationMode,
    /// Statistics of the whole batch in `BatchGlobal` mode; the mean of the
    /// per-window values in `PerWindow` mode.
    pub mean: f64,
    pub std: f64,
}

impl SegmentBatch {
    pub fn len(&self) -> usize {
        self.data.len() / self.window_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn window(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.window_size..(idx + 1) * self.window_size]
    }

    pub fn windows(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.window_size)
    }

    /// The batch as an `N x window_size` matrix.
    pub fn view(&self) -> AnalysisResult<ArrayView2<'_, f64>> {
        ArrayView2::from_shape((self.len(), self.window_size), &self.data)
            .map_err(|e| AnalysisError::shape(format!("batch is not a full matrix: {}", e)))
    }
}

/// Standardize a batch of equal-length segments to zero mean, unit variance.
pub fn normalize_batch(
    segments: &[Segment],
    mode: NormalizationMode,
) -> AnalysisResult<SegmentBatch> {
    let window_size = match segments.first() {
        Some(first) => first.samples.len(),
        None => return Err(AnalysisError::shape("cannot normalize an empty batch")),
    };
    if let Some(bad) = segments.iter().find(|s| s.samples.len() != window_size) {
        return Err(AnalysisError::shape(format!(
            "segment {} has {} samples, expected {}",
            bad.epoch,
            bad.samples.len(),
            window_size
        )));
    }
    for segment in segments {
        reject_non_finite(&segment.samples)?;
    }

    let mut data = Vec::with_capacity(segments.len() * window_size);
    let (mean, std) = match mode {
        NormalizationMode::BatchGlobal => {
            let (mean, std) = mean_std(segments.iter().flat_map(|s| s.samples.iter()));
            if std == 0.0 {
                return Err(AnalysisError::shape(
                    "batch has zero variance; cannot normalize",
                ));
            }
            for segment in segments {
                data.extend(segment.samples.iter().map(|x| (x - mean) / std));
            }
            (mean, std)
        }
        NormalizationMode::PerWindow => {
            let mut mean_acc = 0.0;
            let mut std_acc = 0.0;
            for segment in segments {
                let (mean, std) = mean_std(segment.samples.iter());
                if std == 0.0 {
                    return Err(AnalysisError::shape(format!(
                        "window {} has zero variance; cannot normalize",
                        segment.epoch
                    )));
                }
                data.extend(segment.samples.iter().map(|x| (x - mean) / std));
                mean_acc += mean;
                std_acc += std;
            }
            let n = segments.len() as f64;
            (mean_acc / n, std_acc / n)
        }
    };
    debug!(
        "normalized {} windows ({:?}): mean={:.6} std={:.6}",
        segments.len(),
        mode,
        mean,
        std
    );

    Ok(SegmentBatch {
        window_size,
        data,
        mode,
        mean,
        std,
    })
}
