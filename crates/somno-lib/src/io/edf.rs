use crate::signal::TimeSeries;
use anyhow::{anyhow, Context, Result};
use edf_reader::file_reader::SyncFileReader;
use edf_reader::sync_reader::SyncEDFReader;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Which EDF signal to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSelector {
    Index(usize),
    /// Case-insensitive match on the trimmed signal label (e.g. `ECG`, `Pleth`).
    Label(String),
}

impl From<&str> for ChannelSelector {
    /// Numeric strings select by index, anything else by label.
    fn from(value: &str) -> Self {
        match value.trim().parse::<usize>() {
            Ok(index) => ChannelSelector::Index(index),
            Err(_) => ChannelSelector::Label(value.trim().to_string()),
        }
    }
}

struct DiskFileReader {
    path: PathBuf,
}

impl SyncFileReader for DiskFileReader {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn open(path: &Path) -> Result<SyncEDFReader<DiskFileReader>> {
    SyncEDFReader::init_with_file_reader(DiskFileReader {
        path: path.to_path_buf(),
    })
    .with_context(|| format!("opening EDF {}", path.display()))
}

/// Load one EDF signal as a `TimeSeries` in physical units.
pub fn load_edf_channel(path: &Path, selector: &ChannelSelector) -> Result<TimeSeries> {
    let reader = open(path)?;
    let channels = &reader.edf_header.channels;
    let channel = match selector {
        ChannelSelector::Index(index) => *index,
        ChannelSelector::Label(label) => channels
            .iter()
            .position(|c| c.label.trim().eq_ignore_ascii_case(label))
            .ok_or_else(|| {
                let labels: Vec<&str> = channels.iter().map(|c| c.label.trim()).collect();
                anyhow!(
                    "{} has no signal labelled '{}' (available: {})",
                    path.display(),
                    label,
                    labels.join(", ")
                )
            })?,
    };
    if channel >= channels.len() {
        return Err(anyhow!(
            "EDF file has {} channels; channel {} is out of range",
            channels.len(),
            channel
        ));
    }
    let total_duration = reader.edf_header.block_duration * reader.edf_header.number_of_blocks;
    let data_matrix = reader
        .read_data_window(0, total_duration)
        .with_context(|| format!("reading samples from {}", path.display()))?;
    let samples = data_matrix
        .get(channel)
        .ok_or_else(|| anyhow!("missing channel data"))?;
    let fs = channels[channel].number_of_samples_in_data_record as f64 * 1000.0
        / reader.edf_header.block_duration as f64;
    log::debug!(
        "loaded {} samples at {} Hz from {} channel {}",
        samples.len(),
        fs,
        path.display(),
        channel
    );
    Ok(TimeSeries {
        fs,
        data: samples.iter().map(|&value| value as f64).collect(),
    })
}
