//! Peak detectors feeding the feature pipeline.
//!
//! The pipeline only depends on the [`BeatDetector`] and [`PulseDetector`]
//! traits; any external algorithm can be plugged in behind them.

pub mod ecg;
mod filter;
pub mod ppg;

use crate::error::PipelineResult;
use crate::signal::{BeatSeries, PeakSeries, PulsePeakSeries, TimeSeries};

pub use ecg::{EcgBeatDetector, EcgDetectorConfig};
pub use ppg::{PpgPulseDetector, PulseDetectorConfig};

/// Finds heartbeats in a cardiac waveform.
pub trait BeatDetector {
    fn detect_beats(&self, ecg: &TimeSeries) -> PipelineResult<BeatSeries>;
}

/// Finds pulse peaks in a pulse (PPG) waveform.
pub trait PulseDetector {
    fn detect_pulses(&self, ppg: &TimeSeries) -> PipelineResult<PulsePeakSeries>;
}

/// Returns a precomputed series regardless of the waveform.
#[derive(Debug, Clone, Default)]
pub struct FixedPeaks(pub PeakSeries);

impl BeatDetector for FixedPeaks {
    fn detect_beats(&self, _ecg: &TimeSeries) -> PipelineResult<BeatSeries> {
        Ok(self.0.clone())
    }
}

impl PulseDetector for FixedPeaks {
    fn detect_pulses(&self, _ppg: &TimeSeries) -> PipelineResult<PulsePeakSeries> {
        Ok(self.0.clone())
    }
}

impl<T: BeatDetector + ?Sized> BeatDetector for &T {
    fn detect_beats(&self, ecg: &TimeSeries) -> PipelineResult<BeatSeries> {
        (**self).detect_beats(ecg)
    }
}

impl<T: PulseDetector + ?Sized> PulseDetector for &T {
    fn detect_pulses(&self, ppg: &TimeSeries) -> PipelineResult<PulsePeakSeries> {
        (**self).detect_pulses(ppg)
    }
}
