//! Sampling an [`IntervalMask`] at beat timestamps.

use crate::error::{PipelineError, PipelineResult};
use crate::mask::IntervalMask;
use serde::{Deserialize, Serialize};

/// How a timestamp is turned into a mask sample index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexRule {
    /// `round(t * fs)`, matching the sample-index convention of the beat series.
    Round,
    /// `floor(t * fs)`, the sample whose interval contains `t`.
    Truncate,
}

impl IndexRule {
    pub fn index(self, time: f64, fs: f64) -> i64 {
        let position = time * fs;
        match self {
            IndexRule::Round => position.round() as i64,
            IndexRule::Truncate => position.trunc() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnnotationProjector<'a> {
    mask: &'a IntervalMask,
    rule: IndexRule,
}

impl<'a> AnnotationProjector<'a> {
    pub fn new(mask: &'a IntervalMask, rule: IndexRule) -> Self {
        Self { mask, rule }
    }

    /// Sleep-stage projection rounds to the nearest sample.
    pub fn sleep_stage(mask: &'a IntervalMask) -> Self {
        Self::new(mask, IndexRule::Round)
    }

    /// Arousal projection truncates onto the mask grid.
    pub fn arousal(mask: &'a IntervalMask) -> Self {
        Self::new(mask, IndexRule::Truncate)
    }

    /// One class per timestamp. Any index outside the mask fails the whole call.
    pub fn project(&self, times: &[f64]) -> PipelineResult<Vec<i8>> {
        times.iter().map(|&t| self.class_at(t)).collect()
    }

    pub fn class_at(&self, time: f64) -> PipelineResult<i8> {
        let index = self.rule.index(time, self.mask.fs);
        usize::try_from(index)
            .ok()
            .and_then(|i| self.mask.get(i))
            .ok_or(PipelineError::IndexOutOfRange {
                index,
                time,
                len: self.mask.len(),
            })
    }
}
