use crate::{
    error::{AnalysisError, AnalysisResult},
    signal::{mean_std, round_to, Events, RRSeries},
};
use serde::{Deserialize, Serialize};

/// Time-domain heart metrics derived from detected beats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartMetrics {
    /// Beats per minute, 2 decimals.
    pub heart_rate: f64,
    /// SDNN in seconds (population standard deviation of RR), 4 decimals.
    pub hrv: f64,
    /// Root mean square of successive RR differences in seconds, 4 decimals.
    pub rmssd: f64,
    /// Fraction of successive RR differences above 50 ms, 4 decimals.
    pub pnn50: f64,
    pub beats: usize,
}

impl HeartMetrics {
    /// Needs at least two strictly increasing peaks.
    pub fn from_peaks(peaks: &Events, fs: f64) -> AnalysisResult<Self> {
        if peaks.len() < 2 {
            return Err(AnalysisError::InsufficientPeaks { found: peaks.len() });
        }
        if !(fs.is_finite() && fs > 0.0) {
            return Err(AnalysisError::shape(format!(
                "sampling frequency must be positive, got {fs}"
            )));
        }
        if !peaks.is_strictly_increasing() {
            return Err(AnalysisError::shape(
                "peak indices must be strictly increasing",
            ));
        }
        let rr = RRSeries::from_events(peaks, fs);
        Ok(Self::from_rr(&rr, peaks.len()))
    }

    fn from_rr(rr: &RRSeries, beats: usize) -> Self {
        let (mean, sdnn) = mean_std(rr.rr.iter());
        let diffs: Vec<f64> = rr.rr.windows(2).map(|w| w[1] - w[0]).collect();
        let (rmssd, pnn50) = if diffs.is_empty() {
            (0.0, 0.0)
        } else {
            let n = diffs.len() as f64;
            let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / n).sqrt();
            let over = diffs.iter().filter(|d| d.abs() > 0.050).count();
            (rmssd, over as f64 / n)
        };
        Self {
            heart_rate: round_to(60.0 / mean, 2),
            hrv: round_to(sdnn, 4),
            rmssd: round_to(rmssd, 4),
            pnn50: round_to(pnn50, 4),
            beats,
        }
    }
}
