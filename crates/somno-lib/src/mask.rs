//! Rasterization of interval annotations onto a per-sample class timeline.

use crate::error::{check_duration, check_rate, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Upper bound on mask length; about 48 days at 256 Hz.
pub const MAX_MASK_SAMPLES: usize = 1 << 30;

/// A scored interval: `label` holds from `start` for `duration` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationInterval {
    pub start: f64,
    pub duration: f64,
    pub label: i32,
}

impl AnnotationInterval {
    pub fn new(start: f64, duration: f64, label: i32) -> Self {
        Self {
            start,
            duration,
            label,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Intervals scored over a recording of `duration` seconds. They may overlap
/// or leave gaps; order matters for overlaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub duration: f64,
    pub intervals: Vec<AnnotationInterval>,
}

impl AnnotationSet {
    pub fn new(duration: f64, intervals: Vec<AnnotationInterval>) -> Self {
        Self {
            duration,
            intervals,
        }
    }
}

/// Maps raw annotation labels to output classes.
pub trait ClassRule {
    /// Class of samples no interval covers.
    fn background(&self) -> i8;
    /// Class written for an interval carrying `label`.
    fn classify(&self, label: i32) -> i8;
}

/// Wake `-1`, NREM `0`, REM `1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepStageRule;

impl SleepStageRule {
    pub const WAKE: i8 = -1;
    pub const NREM: i8 = 0;
    pub const REM: i8 = 1;
}

impl ClassRule for SleepStageRule {
    fn background(&self) -> i8 {
        Self::WAKE
    }

    fn classify(&self, label: i32) -> i8 {
        match label {
            i32::MIN..=0 => Self::WAKE,
            1..=4 => Self::NREM,
            _ => Self::REM,
        }
    }
}

/// Any scored interval is an arousal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArousalRule;

impl ClassRule for ArousalRule {
    fn background(&self) -> i8 {
        0
    }

    fn classify(&self, _label: i32) -> i8 {
        1
    }
}

/// Dense class array with one entry per sample over `[0, duration)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalMask {
    pub fs: f64,
    pub classes: Vec<i8>,
}

impl IntervalMask {
    /// Rasterize `set` at `fs` Hz. Intervals are painted in order, so a later
    /// interval wins wherever it overlaps an earlier one. Ranges falling
    /// partly or wholly outside the recording are clipped.
    pub fn rasterize<R: ClassRule + ?Sized>(
        set: &AnnotationSet,
        fs: f64,
        rule: &R,
    ) -> PipelineResult<Self> {
        let fs = check_rate(fs)?;
        let samples = (check_duration(set.duration)? * fs).floor();
        if samples > MAX_MASK_SAMPLES as f64 {
            return Err(PipelineError::MaskTooLong {
                samples,
                fs,
                limit: MAX_MASK_SAMPLES,
            });
        }
        let len = samples as usize;
        let mut classes = vec![rule.background(); len];
        for interval in &set.intervals {
            let start = clip_index(interval.start * fs, len);
            let end = clip_index(interval.end() * fs, len);
            if start < end {
                classes[start..end].fill(rule.classify(interval.label));
            }
        }
        Ok(Self { fs, classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<i8> {
        self.classes.get(index).copied()
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.classes
    }
}

fn clip_index(position: f64, len: usize) -> usize {
    // NaN saturates to 0 through the cast
    position.round().clamp(0.0, len as f64) as usize
}
