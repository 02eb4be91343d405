pub mod ahi;
pub mod heart;
pub mod spo2;
pub mod stage;

pub use ahi::{calculate_ahi, AhiResult, Severity};
pub use heart::HeartMetrics;
pub use spo2::{RatioOfRatiosSpO2, SimulatedSpO2, SpO2Estimate, SpO2Estimator, SpO2Source};
pub use stage::SleepStage;
