use crate::{
    error::{AnalysisError, AnalysisResult},
    signal::round_to,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

/// Severity bands, checked in order; the first matching predicate wins.
pub const SEVERITY_BANDS: [(fn(f64) -> bool, Severity); 4] = [
    (|ahi: f64| ahi < 5.0, Severity::Normal),
    (|ahi: f64| ahi < 15.0, Severity::Mild),
    (|ahi: f64| ahi < 30.0, Severity::Moderate),
    (|_: f64| true, Severity::Severe),
];

impl Severity {
    pub fn from_ahi(ahi: f64) -> Severity {
        SEVERITY_BANDS
            .iter()
            .find(|(matches, _)| matches(ahi))
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Severe)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AhiResult {
    /// Events per hour, rounded to 2 decimals.
    pub ahi: f64,
    pub severity: Severity,
    pub total_events: usize,
    pub total_minutes: usize,
}

/// Apnea-hypopnea index from per-minute event flags.
///
/// Severity is banded on the unrounded index; only the reported `ahi` is
/// rounded.
pub fn calculate_ahi(flags: &[bool], total_minutes: usize) -> AnalysisResult<AhiResult> {
    if total_minutes == 0 {
        return Err(AnalysisError::DivisionUndefined);
    }
    let total_events = flags.iter().filter(|&&f| f).count();
    let hours = total_minutes as f64 / 60.0;
    let ahi = total_events as f64 / hours;
    Ok(AhiResult {
        ahi: round_to(ahi, 2),
        severity: Severity::from_ahi(ahi),
        total_events,
        total_minutes,
    })
}
