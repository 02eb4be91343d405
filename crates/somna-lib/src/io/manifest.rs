//! CSV manifests listing many sessions to analyze in one run.
//!
//! ```text
//! patient_id,session_date,header,annotations,lead
//! p-001,2024-03-01,a01.hea,a01.apn,0
//! ```

use crate::pipeline::SessionMetadata;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct ManifestRow {
    patient_id: String,
    session_date: NaiveDate,
    header: PathBuf,
    annotations: PathBuf,
    #[serde(default)]
    lead: Option<usize>,
}

/// One session of a manifest, with paths resolved against the manifest dir.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub metadata: SessionMetadata,
    pub header: PathBuf,
    pub annotations: PathBuf,
    pub lead: usize,
}

pub fn read_manifest(path: &Path) -> Result<Vec<SessionEntry>> {
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    let mut entries = Vec::new();
    for (idx, row) in reader.deserialize::<ManifestRow>().enumerate() {
        let row = row.with_context(|| format!("parsing manifest row {}", idx + 1))?;
        entries.push(SessionEntry {
            metadata: SessionMetadata {
                patient_id: row.patient_id,
                session_date: row.session_date,
            },
            header: base.join(row.header),
            annotations: base.join(row.annotations),
            lead: row.lead.unwrap_or(0),
        });
    }
    if entries.is_empty() {
        anyhow::bail!("manifest {} lists no sessions", path.display());
    }
    Ok(entries)
}
