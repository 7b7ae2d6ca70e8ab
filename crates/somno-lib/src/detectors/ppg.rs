use super::filter::{argmax, bandpass, samples};
use super::PulseDetector;
use crate::error::PipelineResult;
use crate::signal::{PeakSeries, PulsePeakSeries, TimeSeries};
use serde::{Deserialize, Serialize};

/// Parameters of the pulse-wave peak detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseDetectorConfig {
    /// Low-pass cutoff applied before peak picking (Hz).
    pub highcut_hz: f64,
    /// Length of the trailing baseline removed from the smoothed wave (seconds).
    pub baseline_window_s: f64,
    /// Minimum spacing between two pulse peaks (seconds).
    pub min_interval_s: f64,
    /// Peaks below this fraction of the largest detrended excursion are ignored.
    pub prominence_ratio: f64,
    /// Half-width of the raw-signal window used to refine each peak (seconds).
    pub refine_window_s: f64,
}

impl Default for PulseDetectorConfig {
    fn default() -> Self {
        Self {
            highcut_hz: 8.0,
            baseline_window_s: 0.75,
            min_interval_s: 0.3,
            prominence_ratio: 0.3,
            refine_window_s: 0.1,
        }
    }
}

/// Systolic peak picker for photoplethysmography. Pulse amplitude is the raw
/// sample at the refined peak.
#[derive(Debug, Clone, Copy, Default)]
pub struct PpgPulseDetector {
    pub config: PulseDetectorConfig,
}

impl PpgPulseDetector {
    pub fn new(config: PulseDetectorConfig) -> Self {
        Self { config }
    }

    pub fn peak_indices(&self, ts: &TimeSeries) -> Vec<usize> {
        let data = &ts.data;
        if data.len() < 3 {
            return Vec::new();
        }
        let cfg = &self.config;
        let fs = ts.fs.max(1.0);
        let smoothed = bandpass(data, fs, 0.0, cfg.highcut_hz);
        let baseline = running_mean(&smoothed, samples(cfg.baseline_window_s, fs));
        let detrended: Vec<f64> = smoothed.iter().zip(&baseline).map(|(s, b)| s - b).collect();

        let top = detrended.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if top <= 0.0 {
            return Vec::new();
        }
        let gate = cfg.prominence_ratio * top;
        let min_gap = samples(cfg.min_interval_s, fs);

        let mut candidates: Vec<(usize, f64)> = Vec::new();
        for i in 1..detrended.len() - 1 {
            let y = detrended[i];
            if y < gate || y <= detrended[i - 1] || y < detrended[i + 1] {
                continue;
            }
            match candidates.last_mut() {
                Some(last) if i - last.0 < min_gap => {
                    if y > last.1 {
                        *last = (i, y);
                    }
                }
                _ => candidates.push((i, y)),
            }
        }

        let reach = samples(cfg.refine_window_s, fs);
        let mut peaks: Vec<usize> = candidates
            .into_iter()
            .filter_map(|(i, _)| argmax(data, i.saturating_sub(reach), i + reach))
            .collect();
        peaks.dedup();
        peaks
    }
}

impl PulseDetector for PpgPulseDetector {
    fn detect_pulses(&self, ppg: &TimeSeries) -> PipelineResult<PulsePeakSeries> {
        let indices = self.peak_indices(ppg);
        Ok(PeakSeries::from_indices(ppg, &indices))
    }
}

/// Trailing mean over at most `win` samples; shorter at the start of the trace.
fn running_mean(data: &[f64], win: usize) -> Vec<f64> {
    let mut acc = 0.0;
    data.iter()
        .enumerate()
        .map(|(i, &x)| {
            acc += x;
            if i >= win {
                acc -= data[i - win];
            }
            acc / (i + 1).min(win) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 100.0;

    fn synthetic_ppg(pulses: &[f64], duration: f64) -> TimeSeries {
        let n = (duration * FS) as usize;
        let data = (0..n)
            .map(|i| {
                let time = i as f64 / FS;
                let wander = 0.05 * (2.0 * PI * 0.2 * time).sin();
                let wave: f64 = pulses
                    .iter()
                    .map(|&p| (-0.5 * ((time - p) / 0.1).powi(2)).exp())
                    .sum();
                2.0 + wander + wave
            })
            .collect();
        TimeSeries { fs: FS, data }
    }

    fn pulse_train(count: usize) -> Vec<f64> {
        (0..count).map(|k| 0.8 + 0.9 * k as f64).collect()
    }

    #[test]
    fn finds_each_systolic_peak() {
        let pulses = pulse_train(10);
        let ts = synthetic_ppg(&pulses, 10.0);
        let found = PpgPulseDetector::default().detect_pulses(&ts).unwrap();
        assert_eq!(found.len(), pulses.len());
        for ((t, amp), truth) in found.times().iter().zip(found.amplitudes()).zip(&pulses) {
            assert!((t - truth).abs() <= 0.011, "peak at {t}, expected {truth}");
            assert!((amp - 3.0).abs() < 0.1, "amplitude {amp}");
        }
    }

    #[test]
    fn dropped_pulse_leaves_a_gap() {
        let mut pulses = pulse_train(10);
        let missing = pulses.remove(4);
        let ts = synthetic_ppg(&pulses, 10.0);
        let found = PpgPulseDetector::default().detect_pulses(&ts).unwrap();
        assert_eq!(found.len(), 9);
        assert!(found.times().iter().all(|t| (t - missing).abs() > 0.3));
    }

    #[test]
    fn flat_signal_has_no_peaks() {
        let ts = TimeSeries {
            fs: FS,
            data: vec![1.5; 500],
        };
        assert!(PpgPulseDetector::default().detect_pulses(&ts).unwrap().is_empty());
    }

    #[test]
    fn running_mean_uses_partial_windows() {
        assert_eq!(running_mean(&[2.0, 4.0, 6.0], 2), vec![2.0, 3.0, 5.0]);
    }
}
