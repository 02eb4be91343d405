use crate::signal::{EpochLabel, TimeSeries};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use wfdb_rust::header::StorageFormat;

/// Simple WFDB annotation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfdbAnnotation {
    pub sample: usize,
    pub code: u8,
}

impl WfdbAnnotation {
    /// Standard WFDB mnemonic for the annotation code (`?` when unknown).
    pub fn symbol(&self) -> char {
        match self.code {
            1 => 'N',
            2 => 'L',
            3 => 'R',
            4 => 'a',
            5 => 'V',
            6 => 'F',
            7 => 'J',
            8 => 'A',
            9 => 'S',
            10 => 'E',
            11 => 'j',
            12 => '/',
            13 => 'Q',
            14 => '~',
            16 => '|',
            18 => 's',
            19 => 'T',
            28 => '+',
            _ => '?',
        }
    }
}

/// Sampling frequency assumed when the record line omits it.
const DEFAULT_FS: f64 = 250.0;
/// ADC gain assumed when a signal line omits it or gives 0.
const DEFAULT_GAIN: f64 = 200.0;

/// One signal line of a WFDB header.
#[derive(Debug, Clone, PartialEq)]
pub struct WfdbSignalSpec {
    pub filename: String,
    pub format: StorageFormat,
    pub byte_offset: usize,
    pub gain: f64,
    pub baseline: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WfdbHeader {
    pub record_name: String,
    pub fs: f64,
    pub samples_per_signal: Option<usize>,
    pub signals: Vec<WfdbSignalSpec>,
}

fn field<T>(token: &str, what: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    token
        .parse()
        .with_context(|| format!("invalid {} '{}'", what, token))
}

fn storage_format(code: u16) -> Result<StorageFormat> {
    Ok(match code {
        8 => StorageFormat::_8bit_first_difference,
        16 => StorageFormat::_16bit_twos_complement,
        24 => StorageFormat::_24bit_twos_complement_lsb,
        32 => StorageFormat::_32bit_twos_complement_lsb,
        61 => StorageFormat::_16bit_twos_complement_msb,
        80 => StorageFormat::_8bit_offset_binary,
        160 => StorageFormat::_16bit_offset_binary,
        212 => StorageFormat::_12bit_twos_complement,
        310 => StorageFormat::_10bit_twos_complement_sets_of_11,
        311 => StorageFormat::_10bit_twos_complement_sets_of_4,
        other => anyhow::bail!("unknown WFDB storage format {}", other),
    })
}

fn parse_signal_line(line: &str) -> Result<WfdbSignalSpec> {
    let mut tokens = line.split_whitespace();
    let filename = tokens.next().context("signal line has no file name")?;
    // format[xframes][:skew][+offset]
    let format_token = tokens.next().context("signal line has no storage format")?;
    let (format_part, byte_offset) = match format_token.split_once('+') {
        Some((head, offset)) => (head, field(offset, "byte offset")?),
        None => (format_token, 0),
    };
    let code = format_part
        .split(|c: char| c == 'x' || c == ':')
        .next()
        .unwrap_or(format_part);
    let format = storage_format(field(code, "storage format")?)?;

    // gain[(baseline)][/units]
    let (gain, explicit_baseline) = match tokens.next() {
        Some(token) => {
            let token = token.split('/').next().unwrap_or(token);
            match token.split_once('(') {
                Some((gain, baseline)) => (
                    field::<f64>(gain, "ADC gain")?,
                    Some(field::<f64>(baseline.trim_end_matches(')'), "baseline")?),
                ),
                None => (field::<f64>(token, "ADC gain")?, None),
            }
        }
        None => (DEFAULT_GAIN, None),
    };
    let _adc_resolution = tokens.next();
    let adc_zero = match tokens.next() {
        Some(token) => field::<f64>(token, "ADC zero")?,
        None => 0.0,
    };
    // initial value, checksum, block size
    let rest: Vec<&str> = tokens.skip(3).collect();
    Ok(WfdbSignalSpec {
        filename: filename.to_string(),
        format,
        byte_offset,
        gain: if gain == 0.0 { DEFAULT_GAIN } else { gain },
        baseline: explicit_baseline.unwrap_or(adc_zero),
        description: (!rest.is_empty()).then(|| rest.join(" ")),
    })
}

/// Parse the text of a single-segment `.hea` file.
pub fn parse_wfdb_header(text: &str) -> Result<WfdbHeader> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    let record = lines.next().context("WFDB header has no record line")?;
    let mut tokens = record.split_whitespace();
    let record_name = tokens.next().context("record line is empty")?;
    if record_name.contains('/') {
        anyhow::bail!("multi-segment record {} is not supported", record_name);
    }
    let signal_count: usize = field(
        tokens.next().context("record line has no signal count")?,
        "signal count",
    )?;
    // fs[/counter_freq[(base_counter)]]
    let fs = match tokens.next() {
        Some(token) => field(token.split('/').next().unwrap_or(token), "sampling frequency")?,
        None => DEFAULT_FS,
    };
    let samples_per_signal = tokens
        .next()
        .map(|token| field(token, "sample count"))
        .transpose()?;

    let signals = lines
        .take(signal_count)
        .enumerate()
        .map(|(idx, line)| parse_signal_line(line).with_context(|| format!("signal {}", idx)))
        .collect::<Result<Vec<_>>>()?;
    if signals.len() != signal_count {
        anyhow::bail!(
            "record line announces {} signals, header lists {}",
            signal_count,
            signals.len()
        );
    }
    Ok(WfdbHeader {
        record_name: record_name.to_string(),
        fs,
        samples_per_signal,
        signals,
    })
}

/// Little-endian 16-bit two's complement samples; a trailing odd byte is ignored.
fn decode_format_16(buf: &[u8]) -> Vec<i16> {
    buf.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Load the specified signal (lead) from a WFDB header/data pair into a TimeSeries.
///
/// Signals stored in format 16 or 212 are supported. Signals sharing a data
/// file are interleaved frame by frame in header order.
pub fn load_wfdb_lead(header_path: &Path, lead: usize) -> Result<TimeSeries> {
    let text = fs::read_to_string(header_path)
        .with_context(|| format!("failed to read WFDB header {}", header_path.display()))?;
    let header = parse_wfdb_header(&text)
        .with_context(|| format!("parsing WFDB header {}", header_path.display()))?;
    let signal = header.signals.get(lead).with_context(|| {
        format!(
            "WFDB record {} contains {} signals, but lead {} was requested",
            header.record_name,
            header.signals.len(),
            lead
        )
    })?;

    let siblings: Vec<usize> = header
        .signals
        .iter()
        .enumerate()
        .filter(|(_, other)| other.filename == signal.filename)
        .map(|(idx, _)| idx)
        .collect();
    if siblings
        .iter()
        .any(|&idx| header.signals[idx].format != signal.format)
    {
        anyhow::bail!("signals in {} mix storage formats", signal.filename);
    }
    let position = siblings.iter().position(|&idx| idx == lead).unwrap_or(0);

    let data_path = header_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&signal.filename);
    let bytes = read_bytes(&data_path)?;
    let body = bytes.get(signal.byte_offset..).with_context(|| {
        format!(
            "byte offset {} is past the end of {}",
            signal.byte_offset,
            data_path.display()
        )
    })?;
    let interleaved = match signal.format {
        StorageFormat::_16bit_twos_complement => decode_format_16(body),
        StorageFormat::_12bit_twos_complement => wfdb_rust::signal::parse_212_format(body),
        other => anyhow::bail!(
            "{}: storage format {:?} is not supported",
            data_path.display(),
            other
        ),
    };

    let frames = interleaved.len() / siblings.len();
    let samples = header
        .samples_per_signal
        .filter(|&n| n > 0)
        .map_or(frames, |n| n.min(frames));
    let data = interleaved
        .iter()
        .skip(position)
        .step_by(siblings.len())
        .take(samples)
        .map(|&raw| (raw as f64 - signal.baseline) / signal.gain)
        .collect();
    Ok(TimeSeries {
        fs: header.fs,
        data,
    })
}

/// Parse MIT annotation binary stream into samples & codes.
pub fn parse_wfdb_annotations(buf: &[u8]) -> Vec<WfdbAnnotation> {
    let mut out = Vec::new();
    let mut idx = 0;
    let mut sample: usize = 0;
    while idx + 2 <= buf.len() {
        let word = u16::from_le_bytes([buf[idx], buf[idx + 1]]);
        idx += 2;
        let code = (word >> 10) as u8;
        let diff = (word & 0x03FF) as usize;
        if code == 0 && diff == 0 {
            break;
        }
        match code {
            // SKIP: 32-bit sample jump, high word first
            59 => {
                if idx + 4 > buf.len() {
                    break;
                }
                let high = u16::from_le_bytes([buf[idx], buf[idx + 1]]) as u32;
                let low = u16::from_le_bytes([buf[idx + 2], buf[idx + 3]]) as u32;
                idx += 4;
                sample = sample.wrapping_add(((high << 16) | low) as usize);
            }
            // NUM, SUB, CHN carry a value in `diff`, not a time step
            60..=62 => {}
            // AUX: `diff` bytes of payload, padded to an even length
            63 => {
                idx += diff + diff % 2;
            }
            _ => {
                sample = sample.wrapping_add(diff);
                out.push(WfdbAnnotation { sample, code });
            }
        }
    }
    out
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Per-minute apnea annotations (`.apn`) as epoch labels, in file order.
pub fn load_apnea_labels(path: &Path) -> Result<Vec<EpochLabel>> {
    let buf = read_bytes(path)?;
    let labels: Vec<EpochLabel> = parse_wfdb_annotations(&buf)
        .iter()
        .map(|ann| EpochLabel(ann.symbol()))
        .collect();
    if labels.is_empty() {
        anyhow::bail!("no annotations found in {}", path.display());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(code: u16, diff: u16) -> [u8; 2] {
        ((code << 10) | diff).to_le_bytes()
    }

    #[test]
    fn parses_simple_annotation_stream() {
        let mut bytes = vec![];
        bytes.extend(word(1, 5));
        bytes.extend(word(2, 10));
        // SKIP forward 5000 samples
        bytes.extend(word(59, 0));
        bytes.extend(0x0000u16.to_le_bytes());
        bytes.extend(0x1388u16.to_le_bytes());
        bytes.extend(word(0, 0));

        let annotations = parse_wfdb_annotations(&bytes);
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].sample, 5);
        assert_eq!(annotations[1].sample, 15);
    }

    #[test]
    fn apnea_minutes_map_to_labels() {
        // one annotation per 6000-sample minute: N, A, A, N
        let mut bytes = vec![];
        bytes.extend(word(1, 0));
        for code in [8u16, 8, 1] {
            bytes.extend(word(59, 0));
            bytes.extend(0x0000u16.to_le_bytes());
            bytes.extend(6000u16.to_le_bytes());
            bytes.extend(word(code, 0));
        }
        // AUX with odd payload is skipped
        bytes.extend(word(63, 3));
        bytes.extend([b'x', b'y', b'z', 0]);
        bytes.extend(word(0, 0));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a01.apn");
        fs::write(&path, &bytes).unwrap();
        let labels = load_apnea_labels(&path).unwrap();
        let symbols: String = labels.iter().map(|l| l.0).collect();
        assert_eq!(symbols, "NAAN");

        let anns = parse_wfdb_annotations(&bytes);
        assert_eq!(anns[3].sample, 18000);
    }

    #[test]
    fn num_sub_chn_do_not_move_the_sample_clock() {
        let mut bytes = vec![];
        bytes.extend(word(1, 100));
        bytes.extend(word(60, 7));
        bytes.extend(word(61, 3));
        bytes.extend(word(62, 1));
        bytes.extend(word(8, 50));
        bytes.extend(word(0, 0));
        let anns = parse_wfdb_annotations(&bytes);
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[1].sample, 150);
    }

    fn write_record(dir: &Path, header: &str, samples: &[i16]) -> std::path::PathBuf {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        fs::write(dir.join("r.dat"), bytes).unwrap();
        let path = dir.join("r.hea");
        fs::write(&path, header).unwrap();
        path
    }

    #[test]
    fn format_16_lead_is_scaled_by_gain() {
        let dir = tempfile::tempdir().unwrap();
        let header = write_record(
            dir.path(),
            "r 1 100 6\nr.dat 16 200 12 0 -7 8148 0 ECG\n",
            &[200, 400, -200, 1000, 0, 600],
        );
        let ts = load_wfdb_lead(&header, 0).unwrap();
        assert_eq!(ts.fs, 100.0);
        assert_eq!(ts.data, vec![1.0, 2.0, -1.0, 5.0, 0.0, 3.0]);
    }

    #[test]
    fn format_16_signals_sharing_a_file_are_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let header = write_record(
            dir.path(),
            "# two leads\nr 2 250\nr.dat 16 100(10)/mV 16 0\nr.dat 16 50 16 0\n",
            &[110, 50, 210, 100, 310, 150],
        );
        let first = load_wfdb_lead(&header, 0).unwrap();
        let second = load_wfdb_lead(&header, 1).unwrap();
        assert_eq!(first.fs, 250.0);
        assert_eq!(first.data, vec![1.0, 2.0, 3.0]);
        assert_eq!(second.data, vec![1.0, 2.0, 3.0]);
        assert!(load_wfdb_lead(&header, 2).is_err());
    }

    #[test]
    fn header_fields_are_parsed() {
        let header = parse_wfdb_header("a01 1 100 2957000\na01.dat 16 200 12 0 -7 8148 0 ECG\n")
            .unwrap();
        assert_eq!(header.record_name, "a01");
        assert_eq!(header.samples_per_signal, Some(2957000));
        let signal = &header.signals[0];
        assert_eq!(signal.format, StorageFormat::_16bit_twos_complement);
        assert_eq!(signal.gain, 200.0);
        assert_eq!(signal.baseline, 0.0);
        assert_eq!(signal.description.as_deref(), Some("ECG"));
    }

    #[test]
    fn unreadable_records_are_errors_not_panics() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_wfdb_lead(&dir.path().join("absent.hea"), 0).is_err());

        let header = dir.path().join("nodata.hea");
        fs::write(&header, "nodata 1 100\nnodata.dat 16 200\n").unwrap();
        let err = load_wfdb_lead(&header, 0).unwrap_err();
        assert!(format!("{err:#}").contains("nodata.dat"));

        let header = write_record(dir.path(), "r 1 100\nr.dat 80 200\n", &[0, 1]);
        let err = load_wfdb_lead(&header, 0).unwrap_err();
        assert!(format!("{err:#}").contains("not supported"));

        assert!(parse_wfdb_header("r two 100\n").is_err());
        assert!(parse_wfdb_header("r 2 100\nr.dat 16 200\n").is_err());
        assert!(parse_wfdb_header("r 1 100\nr.dat 999 200\n").is_err());
    }

    #[test]
    fn empty_annotation_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.apn");
        fs::write(&path, word(0, 0)).unwrap();
        assert!(load_apnea_labels(&path).is_err());
    }
}
