pub mod classifier;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod segment;
pub mod signal;

pub use classifier::*;
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Capability};
pub use metrics::*;
pub use pipeline::*;
pub use signal::*;
