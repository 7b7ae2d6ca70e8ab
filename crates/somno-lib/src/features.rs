//! Per-beat cardiac and pulse-linked features.

use crate::error::PipelineResult;
use crate::locator::BeatLocator;
use crate::signal::{inter_beat_intervals, BeatSeries, PulsePeakSeries};
use serde::{Deserialize, Serialize};

/// Pulse peak matched to a beat. Delay and amplitude exist together or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseCorrelate {
    /// Seconds from the beat to the pulse peak (pulse transit time).
    pub transit_delay: f64,
    pub amplitude: f64,
}

/// Feature columns computed for every beat, before trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryFeatures {
    pub inter_beat_intervals: Vec<Option<f64>>,
    pub pulse: Vec<Option<PulseCorrelate>>,
}

impl SecondaryFeatures {
    /// `pulse_duration` closes the search window of the last beat.
    pub fn extract(
        beats: &BeatSeries,
        pulses: &PulsePeakSeries,
        pulse_duration: f64,
    ) -> PipelineResult<Self> {
        Ok(Self {
            inter_beat_intervals: inter_beat_intervals(beats),
            pulse: pulse_correlates(beats, pulses, pulse_duration)?,
        })
    }

    pub fn len(&self) -> usize {
        self.inter_beat_intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inter_beat_intervals.is_empty()
    }

    pub fn missing_correlates(&self) -> usize {
        self.pulse.iter().filter(|p| p.is_none()).count()
    }
}

/// For each beat, the first pulse peak between it and the next beat
/// (`[t_i, t_{i+1})`, or `[t_last, pulse_duration)` for the final beat).
pub fn pulse_correlates(
    beats: &BeatSeries,
    pulses: &PulsePeakSeries,
    pulse_duration: f64,
) -> PipelineResult<Vec<Option<PulseCorrelate>>> {
    let times = beats.times();
    let mut locator = BeatLocator::new(pulses);
    let mut out = Vec::with_capacity(times.len());
    for (i, &beat) in times.iter().enumerate() {
        let until = times.get(i + 1).copied().unwrap_or(pulse_duration);
        let found = locator.locate(beat, until)?;
        out.push(found.map(|m| PulseCorrelate {
            transit_delay: m.time - beat,
            amplitude: m.amplitude,
        }));
    }
    Ok(out)
}
