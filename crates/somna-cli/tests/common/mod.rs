#![allow(dead_code)]

use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

pub const FS: f64 = 250.0;
pub const WINDOW: usize = 2500;

/// Gaussian QRS bumps on a slow baseline, one beat every `rr` seconds.
pub fn synthetic_ecg(seconds: f64, rr: f64) -> Vec<f64> {
    use std::f64::consts::PI;
    let samples = (seconds * FS) as usize;
    let beats: Vec<f64> = (0..)
        .map(|k| 0.5 + k as f64 * rr)
        .take_while(|&t| t < seconds)
        .collect();
    (0..samples)
        .map(|i| {
            let t = i as f64 / FS;
            let qrs: f64 = beats
                .iter()
                .map(|&bt| 1.2 * (-0.5 * ((t - bt) / 0.02).powi(2)).exp())
                .sum();
            0.05 * (2.0 * PI * t).sin() + qrs
        })
        .collect()
}

pub fn write_lines<T: ToString>(
    dir: &Path,
    name: &str,
    values: &[T],
) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(name);
    let body: Vec<String> = values.iter().map(ToString::to_string).collect();
    fs::write(&path, body.join("\n"))?;
    Ok(path)
}

pub fn write_labels(dir: &Path, symbols: &str) -> Result<PathBuf, Box<dyn Error>> {
    let lines: Vec<char> = symbols.chars().collect();
    write_lines(dir, "labels.txt", &lines)
}

pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .expect("crates dir")
        .parent()
        .expect("workspace root")
        .to_path_buf()
}

/// Prebuilt ONNX graph from `test_data/`.
pub fn model(name: &str) -> PathBuf {
    workspace_root().join("test_data").join(name)
}

/// Single-lead format-16 WFDB record `<name>.hea` / `<name>.dat`, gain 200.
pub fn write_wfdb_record(
    dir: &Path,
    name: &str,
    samples: &[f64],
) -> Result<PathBuf, Box<dyn Error>> {
    let raw: Vec<u8> = samples
        .iter()
        .flat_map(|x| ((x * 200.0).round() as i16).to_le_bytes())
        .collect();
    fs::write(dir.join(format!("{name}.dat")), raw)?;
    let header = format!(
        "{name} 1 {FS} {}\n{name}.dat 16 200 12 0 0 0 0 ECG\n",
        samples.len()
    );
    let path = dir.join(format!("{name}.hea"));
    fs::write(&path, header)?;
    Ok(path)
}

/// MIT-format `.apn` stream with one annotation per epoch (`A` or `N`).
pub fn write_apnea_annotations(
    dir: &Path,
    name: &str,
    symbols: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let mut bytes = Vec::new();
    for (i, symbol) in symbols.chars().enumerate() {
        let code: u16 = if symbol == 'A' { 8 } else { 1 };
        let step: u16 = if i == 0 { 0 } else { 1000 };
        bytes.extend(((code << 10) | step).to_le_bytes());
    }
    bytes.extend(0u16.to_le_bytes());
    let path = dir.join(format!("{name}.apn"));
    fs::write(&path, bytes)?;
    Ok(path)
}

fn edf_field(out: &mut Vec<u8>, value: &str, width: usize) {
    let mut text = value.as_bytes().to_vec();
    text.resize(width, b' ');
    out.extend_from_slice(&text);
}

/// EDF with 1 s data records at `FS`; every signal spans +-3.2768 over the
/// full 16-bit range, so samples keep four decimals.
pub fn write_edf(dir: &Path, signals: &[(&str, &[f64])]) -> Result<PathBuf, Box<dyn Error>> {
    let per_record = FS as usize;
    let records = signals.first().map_or(0, |(_, s)| s.len() / per_record);
    let mut out = Vec::new();
    edf_field(&mut out, "0", 8);
    edf_field(&mut out, "X X X X", 80);
    edf_field(&mut out, "Startdate 01-MAR-2024 X X X", 80);
    edf_field(&mut out, "01.03.24", 8);
    edf_field(&mut out, "22.30.00", 8);
    edf_field(&mut out, &(256 * (signals.len() + 1)).to_string(), 8);
    edf_field(&mut out, "", 44);
    edf_field(&mut out, &records.to_string(), 8);
    edf_field(&mut out, "1", 8);
    edf_field(&mut out, &signals.len().to_string(), 4);
    let columns: [(usize, &str); 9] = [
        (16, ""),
        (80, ""),
        (8, "mV"),
        (8, "-3.2768"),
        (8, "3.2767"),
        (8, "-32768"),
        (8, "32767"),
        (80, ""),
        (8, ""),
    ];
    for (col, (width, value)) in columns.iter().enumerate() {
        for (label, _) in signals {
            let value = match col {
                0 => label.to_string(),
                8 => per_record.to_string(),
                _ => value.to_string(),
            };
            edf_field(&mut out, &value, *width);
        }
    }
    for _ in signals {
        edf_field(&mut out, "", 32);
    }
    for record in 0..records {
        for (_, samples) in signals {
            for x in &samples[record * per_record..(record + 1) * per_record] {
                out.extend(((x * 10_000.0).round() as i16).to_le_bytes());
            }
        }
    }
    let path = dir.join("session.edf");
    fs::write(&path, out)?;
    Ok(path)
}

pub fn arg(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}
