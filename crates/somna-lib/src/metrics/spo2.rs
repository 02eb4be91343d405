//! Oxygen saturation estimators.
//!
//! The analyzer takes an estimator per session, so stateful sources such as
//! a seeded RNG never leak between sessions.

use crate::{
    error::{AnalysisError, AnalysisResult},
    signal::{mean_std, round_to},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Where an SpO2 value came from. Simulated values are placeholders, not
/// measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpO2Source {
    Simulated,
    Measured,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpO2Estimate {
    /// Saturation percentage, 1 decimal.
    pub value: f64,
    pub source: SpO2Source,
}

pub trait SpO2Estimator {
    fn estimate(&mut self) -> AnalysisResult<SpO2Estimate>;
}

/// Placeholder estimator drawing uniformly from 94-99 %.
pub struct SimulatedSpO2<R = StdRng> {
    rng: R,
}

impl<R: Rng> SimulatedSpO2<R> {
    pub const LOW: f64 = 94.0;
    pub const HIGH: f64 = 99.0;

    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl SimulatedSpO2<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> SpO2Estimator for SimulatedSpO2<R> {
    fn estimate(&mut self) -> AnalysisResult<SpO2Estimate> {
        let value = self.rng.gen_range(Self::LOW..=Self::HIGH);
        Ok(SpO2Estimate {
            value: round_to(value, 1),
            source: SpO2Source::Simulated,
        })
    }
}

/// Ratio-of-ratios estimate from paired red / infrared PPG channels:
/// `SpO2 = 110 - 25 R` with `R = (AC_red / DC_red) / (AC_ir / DC_ir)`.
#[derive(Debug, Clone)]
pub struct RatioOfRatiosSpO2 {
    red: Vec<f64>,
    ir: Vec<f64>,
}

impl RatioOfRatiosSpO2 {
    pub const MIN_SAMPLES: usize = 30;

    pub fn new(red: Vec<f64>, ir: Vec<f64>) -> Self {
        Self { red, ir }
    }
}

impl SpO2Estimator for RatioOfRatiosSpO2 {
    fn estimate(&mut self) -> AnalysisResult<SpO2Estimate> {
        if self.red.len() != self.ir.len() {
            return Err(AnalysisError::SpO2Unavailable(format!(
                "red channel has {} samples but IR has {}",
                self.red.len(),
                self.ir.len()
            )));
        }
        let (red, ir): (Vec<f64>, Vec<f64>) = self
            .red
            .iter()
            .zip(&self.ir)
            .filter(|(r, i)| **r > 0.0 && **i > 0.0)
            .map(|(r, i)| (*r, *i))
            .unzip();
        if red.len() < Self::MIN_SAMPLES {
            return Err(AnalysisError::SpO2Unavailable(format!(
                "{} valid red/IR samples, need {}",
                red.len(),
                Self::MIN_SAMPLES
            )));
        }
        let (dc_red, ac_red) = mean_std(red.iter());
        let (dc_ir, ac_ir) = mean_std(ir.iter());
        if ac_red < 1e-3 || ac_ir < 1e-3 {
            return Err(AnalysisError::SpO2Unavailable(
                "PPG channels carry no pulsatile component".into(),
            ));
        }
        let r = (ac_red / dc_red) / (ac_ir / dc_ir);
        let value = (110.0 - 25.0 * r).clamp(70.0, 100.0);
        Ok(SpO2Estimate {
            value: round_to(value, 1),
            source: SpO2Source::Measured,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_values_stay_in_range_and_are_tagged() {
        let mut est = SimulatedSpO2::seeded(7);
        for _ in 0..1000 {
            let e = est.estimate().unwrap();
            assert!((94.0..=99.0).contains(&e.value));
            assert_eq!(e.source, SpO2Source::Simulated);
            assert_eq!(e.value, round_to(e.value, 1));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SimulatedSpO2::seeded(42);
        let mut b = SimulatedSpO2::seeded(42);
        for _ in 0..10 {
            assert_eq!(a.estimate().unwrap(), b.estimate().unwrap());
        }
    }

    #[test]
    fn ratio_of_ratios_on_synthetic_ppg() {
        // AC/DC equal on both channels -> R = 1 -> 85 %
        let swing = |i: usize| if i % 2 == 0 { 1.0 } else { -1.0 };
        let red: Vec<f64> = (0..60).map(|i| 1000.0 + 10.0 * swing(i)).collect();
        let ir: Vec<f64> = (0..60).map(|i| 2000.0 + 20.0 * swing(i)).collect();
        let e = RatioOfRatiosSpO2::new(red, ir).estimate().unwrap();
        assert_eq!(e.value, 85.0);
        assert_eq!(e.source, SpO2Source::Measured);
    }

    #[test]
    fn ratio_of_ratios_needs_enough_pulsatile_data() {
        let err = RatioOfRatiosSpO2::new(vec![1000.0; 10], vec![2000.0; 10])
            .estimate()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::SpO2Unavailable(_)));
        let err = RatioOfRatiosSpO2::new(vec![1000.0; 40], vec![2000.0; 40])
            .estimate()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::SpO2Unavailable(_)));
    }

    #[test]
    fn mismatched_channels_are_not_paired() {
        let swing = |i: usize| if i % 2 == 0 { 1.0 } else { -1.0 };
        let red: Vec<f64> = (0..60).map(|i| 1000.0 + 10.0 * swing(i)).collect();
        let ir: Vec<f64> = (0..59).map(|i| 2000.0 + 20.0 * swing(i)).collect();
        let err = RatioOfRatiosSpO2::new(red, ir).estimate().unwrap_err();
        assert!(matches!(err, AnalysisError::SpO2Unavailable(ref msg) if msg.contains("59")));
    }
}
