use crate::signal::{EpochLabel, Events};
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

/// Non-blank, non-comment lines with their 1-based line numbers.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_lines<T>(text: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let out = data_lines(text)
        .map(|(line_no, line)| {
            line.parse::<T>()
                .with_context(|| format!("line {} is not {}: {}", line_no, what, line))
        })
        .collect::<Result<Vec<T>>>()?;
    if out.is_empty() {
        anyhow::bail!("no {} values found", what);
    }
    Ok(out)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Parse newline-delimited floating point samples, ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    parse_lines(text, "f64")
}

pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    parse_f64_series(&read_text(path)?)
}

/// Parse newline-delimited peak sample indices.
pub fn parse_event_indices(text: &str) -> Result<Events> {
    parse_lines(text, "an integer index").map(Events::from_indices)
}

pub fn read_event_indices(path: &Path) -> Result<Events> {
    parse_event_indices(&read_text(path)?)
}

/// Parse one annotation symbol per line (e.g. `A` / `N`).
pub fn parse_epoch_labels(text: &str) -> Result<Vec<EpochLabel>> {
    let labels = data_lines(text)
        .map(|(line_no, line)| {
            let mut chars = line.chars();
            match (chars.next(), chars.next()) {
                (Some(symbol), None) => Ok(EpochLabel(symbol)),
                _ => Err(anyhow::anyhow!(
                    "line {} is not a single annotation symbol: {}",
                    line_no,
                    line
                )),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    if labels.is_empty() {
        anyhow::bail!("no annotation symbols found");
    }
    Ok(labels)
}

pub fn read_epoch_labels(path: &Path) -> Result<Vec<EpochLabel>> {
    parse_epoch_labels(&read_text(path)?)
}
