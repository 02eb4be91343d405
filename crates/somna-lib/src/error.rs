use std::fmt;
use thiserror::Error;

/// Injected capabilities the analyzer depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    EventClassifier,
    PeakDetector,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::EventClassifier => f.write_str("event classifier"),
            Capability::PeakDetector => f.write_str("peak detector"),
        }
    }
}

/// Failures surfaced by the analysis pipeline. None of these are recovered
/// inside the library.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("data shape: {0}")]
    DataShape(String),
    #[error("insufficient peaks: need at least 2 beats, found {found}")]
    InsufficientPeaks { found: usize },
    #[error("AHI undefined for zero elapsed minutes")]
    DivisionUndefined,
    #[error("{0} is not initialized")]
    CapabilityUnavailable(Capability),
    #[error("event classifier failed: {0}")]
    Inference(String),
    #[error("capability broke its output contract: {0}")]
    CapabilityContract(String),
    #[error("SpO2 estimate unavailable: {0}")]
    SpO2Unavailable(String),
}

impl AnalysisError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        AnalysisError::DataShape(msg.into())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
