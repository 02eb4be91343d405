pub mod edf;
pub mod manifest;
pub mod text;
pub mod wfdb;
