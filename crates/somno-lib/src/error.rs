use thiserror::Error;

/// Caller-side precondition failures of the feature pipeline.
///
/// A beat without a matching pulse peak is not an error; it surfaces as
/// `None` in the feature rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("{what}: {left} timestamps but {right} amplitudes")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },
    #[error("locator query at {t0}s precedes the previous query at {previous}s")]
    NonMonotonicQuery { t0: f64, previous: f64 },
    #[error("sample index {index} at {time}s is outside the mask of {len} samples")]
    IndexOutOfRange { index: i64, time: f64, len: usize },
    #[error("sampling rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),
    #[error("need at least two beats to build a feature row, got {0}")]
    TooFewBeats(usize),
    #[error("labeled output requires arousal annotations")]
    MissingArousals,
    #[error("recording duration must be non-negative and finite, got {0}")]
    InvalidDuration(f64),
    #[error("{samples} samples at {fs} Hz exceed the mask limit of {limit}")]
    MaskTooLong { samples: f64, fs: f64, limit: usize },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

pub(crate) fn check_duration(duration: f64) -> PipelineResult<f64> {
    if duration.is_finite() && duration >= 0.0 {
        Ok(duration)
    } else {
        Err(PipelineError::InvalidDuration(duration))
    }
}

pub(crate) fn check_rate(rate: f64) -> PipelineResult<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(PipelineError::InvalidSampleRate(rate))
    }
}
