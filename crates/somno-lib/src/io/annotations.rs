use crate::mask::{AnnotationInterval, AnnotationSet};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;

const START_COLUMNS: [&str; 3] = ["start", "onset", "start_s"];
const DURATION_COLUMNS: [&str; 2] = ["duration", "duration_s"];
const LABEL_COLUMNS: [&str; 4] = ["label", "stage", "code", "trial_type"];

/// Tab-separated for `.tsv`/`.tab`, comma-separated otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => b'\t',
        _ => b',',
    }
}

/// Read a scored-interval table with a header row.
///
/// Recognised columns (case-insensitive): `start`/`onset`, `duration`, and an
/// optional integer `label`/`stage`/`code`. Rows without a label column
/// default to label `1`, which suits event-only tables such as arousal
/// scorings. When `duration` is `None` the set spans to the end of the last
/// interval.
pub fn read_annotation_table(path: &Path, duration: Option<f64>) -> Result<AnnotationSet> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_annotation_table(file, delimiter_for(path), duration)
        .with_context(|| format!("parsing annotations in {}", path.display()))
}

pub fn parse_annotation_table<R: Read>(
    source: R,
    delimiter: u8,
    duration: Option<f64>,
) -> Result<AnnotationSet> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    let start_idx = find_column(&headers, &START_COLUMNS)
        .ok_or_else(|| anyhow!("annotation table needs a start or onset column"))?;
    let duration_idx = find_column(&headers, &DURATION_COLUMNS)
        .ok_or_else(|| anyhow!("annotation table needs a duration column"))?;
    let label_idx = find_column(&headers, &LABEL_COLUMNS);

    let mut intervals = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading annotation row {}", row + 1))?;
        let start = field(&record, start_idx, row, "start")?;
        let length = field(&record, duration_idx, row, "duration")?;
        if length < 0.0 {
            anyhow::bail!("row {} has negative duration {}", row + 1, length);
        }
        let label = match label_idx {
            Some(idx) => field(&record, idx, row, "label")? as i32,
            None => 1,
        };
        intervals.push(AnnotationInterval::new(start, length, label));
    }

    let span = intervals
        .iter()
        .map(AnnotationInterval::end)
        .fold(0.0, f64::max);
    Ok(AnnotationSet::new(duration.unwrap_or(span), intervals))
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

fn field(record: &StringRecord, idx: usize, row: usize, name: &str) -> Result<f64> {
    let raw = record
        .get(idx)
        .ok_or_else(|| anyhow!("row {} is missing the {} column", row + 1, name))?;
    let value = raw
        .parse::<f64>()
        .with_context(|| format!("row {}: {} '{}' is not numeric", row + 1, name, raw))?;
    if !value.is_finite() {
        anyhow::bail!("row {}: {} '{}' is not finite", row + 1, name, raw);
    }
    Ok(value)
}
