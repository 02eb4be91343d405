pub mod ecg;

pub use ecg::{EcgPipelineConfig, PanTompkinsDetector, PeakDetector};
