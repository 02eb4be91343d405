//! Session analysis: event branch (segment, normalize, classify, AHI), heart
//! branch (beats, heart metrics, sleep stage) and SpO2, joined into one
//! `SessionSummary`.

use crate::{
    classifier::{classify_events, EventClassifier, EventPrediction},
    config::AnalysisConfig,
    detectors::PeakDetector,
    error::{AnalysisError, AnalysisResult, Capability},
    metrics::{
        calculate_ahi, AhiResult, HeartMetrics, Severity, SleepStage, SpO2Estimate,
        SpO2Estimator, SpO2Source,
    },
    segment::{normalize_batch, segment_signal},
    signal::{EpochLabel, TimeSeries},
};
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Signal plus per-epoch annotations for one monitoring session.
#[derive(Debug, Clone)]
pub struct Recording {
    pub signal: TimeSeries,
    pub labels: Vec<EpochLabel>,
}

impl Recording {
    pub fn new(signal: TimeSeries, labels: Vec<EpochLabel>) -> Self {
        Self { signal, labels }
    }
}

/// Caller-owned identity of a session, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub patient_id: String,
    pub session_date: NaiveDate,
}

/// Outcome of the event branch alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAnalysis {
    #[serde(flatten)]
    pub ahi: AhiResult,
    pub dropped_epochs: usize,
    pub predictions: Vec<EventPrediction>,
}

/// Everything the analysis produces for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub patient_id: String,
    pub session_date: NaiveDate,
    pub ahi: f64,
    pub severity: Severity,
    pub total_events: usize,
    pub total_minutes: usize,
    pub dropped_epochs: usize,
    pub heart_rate: f64,
    pub hrv: f64,
    pub rmssd: f64,
    pub pnn50: f64,
    pub spo2: f64,
    pub spo2_source: SpO2Source,
    pub sleep_stage: SleepStage,
}

impl SessionSummary {
    pub fn assemble(
        metadata: SessionMetadata,
        ahi: &AhiResult,
        dropped_epochs: usize,
        heart: &HeartMetrics,
        sleep_stage: SleepStage,
        spo2: SpO2Estimate,
    ) -> Self {
        Self {
            patient_id: metadata.patient_id,
            session_date: metadata.session_date,
            ahi: ahi.ahi,
            severity: ahi.severity,
            total_events: ahi.total_events,
            total_minutes: ahi.total_minutes,
            dropped_epochs,
            heart_rate: heart.heart_rate,
            hrv: heart.hrv,
            rmssd: heart.rmssd,
            pnn50: heart.pnn50,
            spo2: spo2.value,
            spo2_source: spo2.source,
            sleep_stage,
        }
    }
}

/// Runs the analysis with capabilities injected at construction.
///
/// Build one per process and share it by reference; `analyze` only takes
/// `&self`, so concurrent sessions cannot interfere with each other.
#[derive(Clone)]
pub struct SessionAnalyzer {
    config: AnalysisConfig,
    classifier: Option<Arc<dyn EventClassifier>>,
    detector: Option<Arc<dyn PeakDetector>>,
}

impl SessionAnalyzer {
    pub fn builder(config: AnalysisConfig) -> SessionAnalyzerBuilder {
        SessionAnalyzerBuilder {
            config,
            classifier: None,
            detector: None,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn classifier(&self) -> AnalysisResult<&dyn EventClassifier> {
        self.classifier
            .as_deref()
            .ok_or(AnalysisError::CapabilityUnavailable(
                Capability::EventClassifier,
            ))
    }

    fn detector(&self) -> AnalysisResult<&dyn PeakDetector> {
        self.detector
            .as_deref()
            .ok_or(AnalysisError::CapabilityUnavailable(Capability::PeakDetector))
    }

    /// Segment, normalize and classify the recording, then compute the AHI.
    /// Each retained window counts as one minute.
    pub fn analyze_events(&self, recording: &Recording) -> AnalysisResult<EventAnalysis> {
        let classifier = self.classifier()?;
        let segmentation = segment_signal(
            &recording.signal.data,
            &recording.labels,
            self.config.window_size,
        )?;
        let batch = normalize_batch(&segmentation.segments, self.config.normalization)?;
        let predictions = classify_events(classifier, &batch, self.config.event_threshold)?;
        let flags: Vec<bool> = predictions.iter().map(|p| p.is_event).collect();
        let ahi = calculate_ahi(&flags, segmentation.len())?;
        debug!(
            "event branch: {} windows, {} events, ahi={}",
            segmentation.len(),
            ahi.total_events,
            ahi.ahi
        );
        Ok(EventAnalysis {
            ahi,
            dropped_epochs: segmentation.dropped_epochs,
            predictions,
        })
    }

    /// Detect beats and derive heart metrics and sleep stage.
    pub fn analyze_heart(
        &self,
        signal: &TimeSeries,
    ) -> AnalysisResult<(HeartMetrics, SleepStage)> {
        let peaks = self.detector()?.detect(signal)?;
        let heart = HeartMetrics::from_peaks(&peaks, signal.fs)?;
        let stage = SleepStage::from_heart_rate(heart.heart_rate)?;
        debug!(
            "heart branch: {} beats, hr={} hrv={} stage={}",
            heart.beats, heart.heart_rate, heart.hrv, stage
        );
        Ok((heart, stage))
    }

    /// Full session analysis. Any failing stage aborts without a summary.
    pub fn analyze(
        &self,
        recording: &Recording,
        metadata: SessionMetadata,
        spo2: &mut dyn SpO2Estimator,
    ) -> AnalysisResult<SessionSummary> {
        // Check both capabilities before doing any work.
        self.classifier()?;
        self.detector()?;

        let events = self.analyze_events(recording)?;
        let (heart, stage) = self.analyze_heart(&recording.signal)?;
        let spo2 = spo2.estimate()?;
        let summary = SessionSummary::assemble(
            metadata,
            &events.ahi,
            events.dropped_epochs,
            &heart,
            stage,
            spo2,
        );
        info!(
            "session {} {}: ahi={} ({}) hr={} stage={}",
            summary.patient_id,
            summary.session_date,
            summary.ahi,
            summary.severity,
            summary.heart_rate,
            summary.sleep_stage
        );
        Ok(summary)
    }
}

pub struct SessionAnalyzerBuilder {
    config: AnalysisConfig,
    classifier: Option<Arc<dyn EventClassifier>>,
    detector: Option<Arc<dyn PeakDetector>>,
}

impl SessionAnalyzerBuilder {
    pub fn classifier(mut self, classifier: Arc<dyn EventClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn PeakDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn build(self) -> SessionAnalyzer {
        SessionAnalyzer {
            config: self.config,
            classifier: self.classifier,
            detector: self.detector,
        }
    }
}
