//! European Data Format recordings.
//!
//! `edf-reader` panics on malformed header fields, so the file is read into
//! memory once and the parse runs under `catch_unwind`; a damaged EDF in a
//! batch becomes an error for that session only.

use crate::signal::TimeSeries;
use anyhow::{anyhow, bail, Context, Result};
use edf_reader::file_reader::SyncFileReader;
use edf_reader::model::EDFHeader;
use edf_reader::sync_reader::SyncEDFReader;
use log::debug;
use std::io::{Error as IoError, ErrorKind};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::{fmt, fs, str::FromStr};

const GENERAL_HEADER_LEN: usize = 256;

/// Selects an EDF signal by position or by its header label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Index(usize),
    Label(String),
}

impl Default for ChannelRef {
    fn default() -> Self {
        ChannelRef::Index(0)
    }
}

impl FromStr for ChannelRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<usize>() {
            Ok(idx) => ChannelRef::Index(idx),
            Err(_) => ChannelRef::Label(s.trim().to_string()),
        })
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Index(idx) => write!(f, "#{}", idx),
            ChannelRef::Label(label) => write!(f, "'{}'", label),
        }
    }
}

impl ChannelRef {
    fn resolve(&self, header: &EDFHeader) -> Result<usize> {
        let count = header.channels.len();
        match self {
            ChannelRef::Index(idx) if *idx < count => Ok(*idx),
            ChannelRef::Index(idx) => bail!(
                "EDF file has {} channels; channel {} is out of range",
                count,
                idx
            ),
            ChannelRef::Label(label) => header
                .channels
                .iter()
                .position(|c| c.label.eq_ignore_ascii_case(label))
                .ok_or_else(|| {
                    let labels: Vec<&str> =
                        header.channels.iter().map(|c| c.label.as_str()).collect();
                    anyhow!("no EDF channel labelled '{}' (have {:?})", label, labels)
                }),
        }
    }
}

/// Whole EDF file held in memory; short reads are errors instead of panics
/// further down in the sample decoder.
struct EdfBytes(Vec<u8>);

impl SyncFileReader for EdfBytes {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, IoError> {
        let start =
            usize::try_from(offset).map_err(|_| IoError::from(ErrorKind::InvalidInput))?;
        let end = usize::try_from(length)
            .ok()
            .and_then(|len| start.checked_add(len))
            .ok_or_else(|| IoError::from(ErrorKind::InvalidInput))?;
        self.0.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
            IoError::new(
                ErrorKind::UnexpectedEof,
                format!("wanted bytes {}..{} of {}", start, end, self.0.len()),
            )
        })
    }
}

fn open(bytes: Vec<u8>) -> Result<SyncEDFReader<EdfBytes>> {
    if bytes.len() < GENERAL_HEADER_LEN {
        bail!(
            "{} bytes is shorter than the {}-byte EDF header",
            bytes.len(),
            GENERAL_HEADER_LEN
        );
    }
    let len = bytes.len() as u64;
    let reader = panic::catch_unwind(AssertUnwindSafe(|| {
        SyncEDFReader::init_with_file_reader(EdfBytes(bytes))
    }))
    .map_err(|_| anyhow!("malformed EDF header"))??;

    let header = &reader.edf_header;
    if header.block_duration == 0 || header.number_of_blocks == 0 {
        bail!(
            "EDF declares {} data records of {} ms",
            header.number_of_blocks,
            header.block_duration
        );
    }
    let expected =
        header.byte_size_header + header.number_of_blocks * header.get_size_of_data_block();
    if len < expected {
        bail!("EDF is truncated: {} of {} bytes present", len, expected);
    }
    Ok(reader)
}

/// Load one EDF signal as a `TimeSeries` in physical units.
pub fn load_edf_channel(path: &Path, channel: &ChannelRef) -> Result<TimeSeries> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read EDF {}", path.display()))?;
    let reader = open(bytes).with_context(|| format!("failed to open EDF {}", path.display()))?;
    let header = &reader.edf_header;
    let idx = channel
        .resolve(header)
        .with_context(|| format!("selecting channel {} in {}", channel, path.display()))?;
    let chan = &header.channels[idx];
    if chan.number_of_samples_in_data_record == 0 {
        bail!("EDF channel '{}' has no samples per record", chan.label);
    }
    // block_duration is in milliseconds
    let fs =
        chan.number_of_samples_in_data_record as f64 * 1000.0 / header.block_duration as f64;

    let total_ms = header.block_duration * header.number_of_blocks;
    let mut matrix = reader
        .read_data_window(0, total_ms)
        .with_context(|| format!("reading EDF data from {}", path.display()))?;
    if idx >= matrix.len() {
        bail!(
            "EDF data has {} signals, header has {}",
            matrix.len(),
            header.channels.len()
        );
    }
    let samples = matrix.swap_remove(idx);
    debug!(
        "EDF {} channel '{}': {} samples at {} Hz",
        path.display(),
        chan.label,
        samples.len(),
        fs
    );
    Ok(TimeSeries::new(fs, samples.into_iter().map(f64::from).collect()))
}
