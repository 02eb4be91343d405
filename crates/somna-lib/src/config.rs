use crate::{detectors::ecg::EcgPipelineConfig, segment::NormalizationMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Samples per epoch window. One window is one minute at 100 Hz.
pub const DEFAULT_WINDOW_SIZE: usize = 6000;

/// Probability above which a window counts as an apnea event.
pub const DEFAULT_EVENT_THRESHOLD: f64 = 0.5;

/// Tunables for one analysis run, usually read from a TOML file.
///
/// ```toml
/// window_size = 6000
/// event_threshold = 0.5
/// normalization = "batch-global"
///
/// [detector]
/// min_rr_s = 0.28
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub window_size: usize,
    pub event_threshold: f64,
    pub normalization: NormalizationMode,
    pub detector: EcgPipelineConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            event_threshold: DEFAULT_EVENT_THRESHOLD,
            normalization: NormalizationMode::BatchGlobal,
            detector: EcgPipelineConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: AnalysisConfig = toml::from_str(text).context("parsing analysis config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            anyhow::bail!("window_size must be positive");
        }
        if !(0.0..=1.0).contains(&self.event_threshold) {
            anyhow::bail!(
                "event_threshold must lie in [0, 1], got {}",
                self.event_threshold
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.window_size, 6000);
        assert_eq!(cfg.event_threshold, 0.5);
        assert_eq!(cfg.normalization, NormalizationMode::BatchGlobal);
    }

    #[test]
    fn partial_detector_table_keeps_other_defaults() {
        let cfg = AnalysisConfig::from_toml_str(
            r#"
            window_size = 3000
            normalization = "per-window"

            [detector]
            min_rr_s = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window_size, 3000);
        assert_eq!(cfg.normalization, NormalizationMode::PerWindow);
        assert_eq!(cfg.detector.min_rr_s, 0.3);
        assert_eq!(cfg.detector.lowcut_hz, EcgPipelineConfig::default().lowcut_hz);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(AnalysisConfig::from_toml_str("event_threshold = 1.5").is_err());
        assert!(AnalysisConfig::from_toml_str("window_size = 0").is_err());
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.toml");
        fs::write(&path, "event_threshold = 0.7\n").unwrap();
        let cfg = AnalysisConfig::from_toml_file(&path).unwrap();
        assert_eq!(cfg.event_threshold, 0.7);
    }
}
