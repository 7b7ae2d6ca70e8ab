//! First-order filters and helpers shared by the detectors.

use std::f64::consts::PI;

fn rc(cutoff: f64) -> f64 {
    1.0 / (2.0 * PI * cutoff.max(0.01))
}

pub(crate) fn highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let rc = rc(cutoff);
    let alpha = rc / (rc + 1.0 / fs);
    let (mut prev_x, mut prev_y) = (first, first);
    data.iter()
        .map(|&x| {
            prev_y = alpha * (prev_y + x - prev_x);
            prev_x = x;
            prev_y
        })
        .collect()
}

pub(crate) fn lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let alpha = dt / (rc(cutoff) + dt);
    let mut state = first;
    data.iter()
        .map(|&x| {
            state += alpha * (x - state);
            state
        })
        .collect()
}

/// High-pass at `low` then low-pass at `high`; a non-positive `low` or a `high`
/// at or above Nyquist skips that stage.
pub(crate) fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    let stage = if low > 0.0 {
        highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        stage
    } else {
        lowpass(&stage, fs, high)
    }
}

/// Backward difference, first sample 0.
pub(crate) fn derivative(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for (i, w) in data.windows(2).enumerate() {
        out[i + 1] = w[1] - w[0];
    }
    out
}

/// Trailing moving average over `win` samples (divides by `win` from the start).
pub(crate) fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut acc = 0.0;
    data.iter()
        .enumerate()
        .map(|(i, &x)| {
            acc += x;
            if i >= win {
                acc -= data[i - win];
            }
            acc / win as f64
        })
        .collect()
}

/// Index of the largest sample in `data[start..=end]` (clamped), first wins on ties.
pub(crate) fn argmax(data: &[f64], start: usize, end: usize) -> Option<usize> {
    let end = end.min(data.len().checked_sub(1)?);
    let mut best: Option<usize> = None;
    for j in start..=end {
        if best.map_or(true, |b| data[j] > data[b]) {
            best = Some(j);
        }
    }
    best
}

pub(crate) fn samples(seconds: f64, fs: f64) -> usize {
    (seconds * fs).round().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_is_trailing() {
        let out = moving_average(&[2.0, 2.0, 2.0, 4.0], 2);
        assert_eq!(out, vec![1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn derivative_keeps_length() {
        assert_eq!(derivative(&[1.0, 3.0, 2.0]), vec![0.0, 2.0, -1.0]);
        assert!(derivative(&[]).is_empty());
    }

    #[test]
    fn highpass_removes_constant_offset() {
        let out = highpass(&vec![5.0; 500], 100.0, 1.0);
        assert!(out.iter().all(|v| v.abs() < 5.0 + 1e-9));
        assert!(out.last().unwrap().abs() < 1e-6);
    }

    #[test]
    fn argmax_clamps_and_prefers_first() {
        let data = [0.0, 3.0, 1.0, 3.0];
        assert_eq!(argmax(&data, 0, 10), Some(1));
        assert_eq!(argmax(&data, 2, 2), Some(2));
        assert_eq!(argmax(&[], 0, 3), None);
    }
}
