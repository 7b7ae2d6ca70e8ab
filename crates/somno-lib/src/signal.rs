use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Uniformly sampled waveform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// Detected peaks on a timeline: timestamps in seconds with one amplitude each.
///
/// Timestamps are expected to be strictly increasing. That ordering is the
/// detector's contract and is not re-validated here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakSeries {
    times: Vec<f64>,
    amplitudes: Vec<f64>,
}

/// Heartbeat (R-peak) timestamps and amplitudes.
pub type BeatSeries = PeakSeries;
/// Pulse-waveform peak timestamps and amplitudes.
pub type PulsePeakSeries = PeakSeries;

impl PeakSeries {
    pub fn new(times: Vec<f64>, amplitudes: Vec<f64>) -> PipelineResult<Self> {
        if times.len() != amplitudes.len() {
            return Err(PipelineError::LengthMismatch {
                what: "peak series",
                left: times.len(),
                right: amplitudes.len(),
            });
        }
        Ok(Self { times, amplitudes })
    }

    /// Build a series from sample indices into `ts`, reading amplitudes off the raw samples.
    /// Indices past the end of the waveform are dropped.
    pub fn from_indices(ts: &TimeSeries, indices: &[usize]) -> Self {
        let (times, amplitudes) = indices
            .iter()
            .filter_map(|&idx| ts.data.get(idx).map(|&v| (idx as f64 / ts.fs, v)))
            .unzip();
        Self { times, amplitudes }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<(f64, f64)> {
        Some((*self.times.get(idx)?, *self.amplitudes.get(idx)?))
    }

    /// `round(t * rate)` for each timestamp.
    pub fn sample_indices(&self, rate: f64) -> Vec<usize> {
        self.times
            .iter()
            .map(|t| (t * rate).round().max(0.0) as usize)
            .collect()
    }
}

/// Inter-beat intervals in seconds. The first beat has no predecessor and
/// therefore no interval.
pub fn inter_beat_intervals(beats: &BeatSeries) -> Vec<Option<f64>> {
    let times = beats.times();
    let mut rr = Vec::with_capacity(times.len());
    if !times.is_empty() {
        rr.push(None);
    }
    rr.extend(times.windows(2).map(|w| Some(w[1] - w[0])));
    rr
}
