use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse sleep depth inferred from heart rate alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepStage {
    #[serde(rename = "Deep Sleep")]
    DeepSleep,
    #[serde(rename = "Light Sleep")]
    LightSleep,
    #[serde(rename = "REM")]
    Rem,
}

/// Checked in order; first match wins.
pub const STAGE_BANDS: [(fn(f64) -> bool, SleepStage); 3] = [
    (|hr: f64| hr < 60.0, SleepStage::DeepSleep),
    (|hr: f64| hr <= 80.0, SleepStage::LightSleep),
    (|_: f64| true, SleepStage::Rem),
];

impl SleepStage {
    pub fn from_heart_rate(heart_rate: f64) -> AnalysisResult<SleepStage> {
        if !heart_rate.is_finite() {
            return Err(AnalysisError::shape(format!(
                "heart rate must be finite, got {heart_rate}"
            )));
        }
        Ok(STAGE_BANDS
            .iter()
            .find(|(matches, _)| matches(heart_rate))
            .map(|(_, stage)| *stage)
            .unwrap_or(SleepStage::Rem))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SleepStage::DeepSleep => "Deep Sleep",
            SleepStage::LightSleep => "Light Sleep",
            SleepStage::Rem => "REM",
        }
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_boundaries() {
        let cases = [
            (45.0, SleepStage::DeepSleep),
            (59.9, SleepStage::DeepSleep),
            (60.0, SleepStage::LightSleep),
            (80.0, SleepStage::LightSleep),
            (80.1, SleepStage::Rem),
        ];
        for (hr, expected) in cases {
            assert_eq!(SleepStage::from_heart_rate(hr).unwrap(), expected, "hr={hr}");
        }
    }

    #[test]
    fn non_finite_heart_rate_is_rejected() {
        assert!(SleepStage::from_heart_rate(f64::NAN).is_err());
        assert!(SleepStage::from_heart_rate(f64::INFINITY).is_err());
    }

    #[test]
    fn serializes_with_display_names() {
        let json = serde_json::to_string(&SleepStage::Rem).unwrap();
        assert_eq!(json, "\"REM\"");
        let json = serde_json::to_string(&SleepStage::DeepSleep).unwrap();
        assert_eq!(json, "\"Deep Sleep\"");
    }
}
