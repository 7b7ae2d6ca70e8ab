use crate::assembler::{FeatureSet, COLUMN_NAMES};
use crate::signal::PeakSeries;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct PeakRow {
    time: f64,
    amplitude: f64,
}

/// Read a `time,amplitude` table of detected peaks (seconds, signal units).
pub fn read_peak_table(path: &Path) -> Result<PeakSeries> {
    let file = fs::File::open(path).with_context(|| format!("opening peaks {}", path.display()))?;
    parse_peak_table(file).with_context(|| format!("parsing peaks {}", path.display()))
}

pub fn parse_peak_table<R: Read>(source: R) -> Result<PeakSeries> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(source);
    let mut times = Vec::new();
    let mut amplitudes = Vec::new();
    for (idx, row) in reader.deserialize::<PeakRow>().enumerate() {
        let row = row.with_context(|| format!("parsing peak row {}", idx + 1))?;
        times.push(row.time);
        amplitudes.push(row.amplitude);
    }
    Ok(PeakSeries::new(times, amplitudes)?)
}

pub fn write_peak_table(path: &Path, peaks: &PeakSeries) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = WriterBuilder::new().from_writer(file);
    for (&time, &amplitude) in peaks.times().iter().zip(peaks.amplitudes()) {
        writer.serialize(PeakRow { time, amplitude })?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the feature matrix with `-1` sentinels, plus an `arousal` column when labels exist.
pub fn write_feature_csv<W: Write>(sink: W, set: &FeatureSet) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(sink);
    let mut header: Vec<&str> = COLUMN_NAMES.to_vec();
    if set.labels.is_some() {
        header.push("arousal");
    }
    writer.write_record(&header)?;
    for (i, row) in set.features.rows.iter().enumerate() {
        let mut record: Vec<String> = row.to_legacy().iter().map(f64::to_string).collect();
        if let Some(labels) = &set.labels {
            record.push(labels.labels[i].to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_feature_table(path: &Path, set: &FeatureSet) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_feature_csv(file, set)
}
