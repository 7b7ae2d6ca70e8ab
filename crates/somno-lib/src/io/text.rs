//! Plain-text waveforms: one sample per line, `#` comments allowed.

use crate::error::check_rate;
use crate::signal::TimeSeries;
use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;

pub fn parse_waveform(text: &str, fs: f64) -> Result<TimeSeries> {
    let fs = check_rate(fs)?;
    let data = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| {
            line.parse::<f64>()
                .with_context(|| format!("sample on line {} is not a number: {}", idx + 1, line))
        })
        .collect::<Result<Vec<f64>>>()?;
    if data.is_empty() {
        bail!("waveform has no samples");
    }
    Ok(TimeSeries { fs, data })
}

/// Load a waveform sampled at `fs` Hz from `path`, or from stdin when `path` is `None`.
pub fn read_waveform(path: Option<&Path>, fs: f64) -> Result<TimeSeries> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read waveform {}", path.display()))?;
            parse_waveform(&text, fs).with_context(|| format!("parsing {}", path.display()))
        }
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            parse_waveform(&text, fs).context("parsing waveform from stdin")
        }
    }
}
