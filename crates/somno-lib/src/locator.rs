//! Forward-only search for the first pulse peak inside a time window.

use crate::error::{PipelineError, PipelineResult};
use crate::signal::PulsePeakSeries;
use serde::{Deserialize, Serialize};

/// Pulse peak found inside a query window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseMatch {
    /// Position of the peak in the pulse series.
    pub index: usize,
    pub time: f64,
    pub amplitude: f64,
}

/// Answers "first peak in `[t0, t1)`" for a sequence of windows whose `t0`
/// never decreases. The cursor only moves forward, so a full pass over the
/// series costs `O(beats + peaks)`.
#[derive(Debug, Clone)]
pub struct BeatLocator<'a> {
    peaks: &'a PulsePeakSeries,
    cursor: usize,
    last_t0: Option<f64>,
}

impl<'a> BeatLocator<'a> {
    pub fn new(peaks: &'a PulsePeakSeries) -> Self {
        Self {
            peaks,
            cursor: 0,
            last_t0: None,
        }
    }

    /// Index of the first peak not yet ruled out by earlier queries.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// First peak `p` with `t0 <= p < t1`, or `None` when the window holds no peak.
    ///
    /// A window starting before the previous one is rejected rather than
    /// answered from a cursor that has already moved past it.
    pub fn locate(&mut self, t0: f64, t1: f64) -> PipelineResult<Option<PulseMatch>> {
        if let Some(previous) = self.last_t0 {
            if t0 < previous {
                return Err(PipelineError::NonMonotonicQuery { t0, previous });
            }
        }
        self.last_t0 = Some(t0);

        let times = self.peaks.times();
        while self.cursor < times.len() && times[self.cursor] < t0 {
            self.cursor += 1;
        }
        match self.peaks.get(self.cursor) {
            Some((time, amplitude)) if time < t1 => Ok(Some(PulseMatch {
                index: self.cursor,
                time,
                amplitude,
            })),
            _ => Ok(None),
        }
    }
}
