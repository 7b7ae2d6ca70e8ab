use super::filter::{argmax, bandpass, derivative, moving_average, samples};
use super::BeatDetector;
use crate::error::PipelineResult;
use crate::signal::{BeatSeries, PeakSeries, TimeSeries};
use serde::{Deserialize, Serialize};

/// Parameters of the R-peak detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgDetectorConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for EcgDetectorConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.120,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Pan–Tompkins-style R-peak detector. Beat amplitude is the raw ECG sample
/// at the detected R-peak.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcgBeatDetector {
    pub config: EcgDetectorConfig,
}

impl EcgBeatDetector {
    pub fn new(config: EcgDetectorConfig) -> Self {
        Self { config }
    }

    /// Detector with the default filter bank and a custom refractory period (floored at 150 ms).
    pub fn with_min_rr(min_rr_s: f64) -> Self {
        let mut config = EcgDetectorConfig::default();
        config.min_rr_s = min_rr_s.max(0.15);
        Self { config }
    }

    /// R-peak sample indices.
    pub fn r_peak_indices(&self, ts: &TimeSeries) -> Vec<usize> {
        if ts.is_empty() {
            return Vec::new();
        }
        let cfg = &self.config;
        let fs = ts.fs.max(1.0);
        let filtered = bandpass(&ts.data, fs, cfg.lowcut_hz, cfg.highcut_hz);
        let energy: Vec<f64> = derivative(&filtered).iter().map(|d| d * d).collect();
        let envelope = moving_average(&energy, samples(cfg.integration_window_s, fs));

        let peaks = adaptive_peaks(&filtered, &envelope, fs, cfg);
        if peaks.len() < 2 {
            log::debug!(
                "adaptive threshold found {} R-peaks, using fallback picker",
                peaks.len()
            );
            return fallback_peaks(ts, cfg);
        }
        peaks
    }
}

impl BeatDetector for EcgBeatDetector {
    fn detect_beats(&self, ecg: &TimeSeries) -> PipelineResult<BeatSeries> {
        let indices = self.r_peak_indices(ecg);
        Ok(PeakSeries::from_indices(ecg, &indices))
    }
}

/// Envelope threshold tracking running signal and noise levels. After each
/// crossing the precise R sample is searched back in the band-passed trace.
fn adaptive_peaks(
    filtered: &[f64],
    envelope: &[f64],
    fs: f64,
    cfg: &EcgDetectorConfig,
) -> Vec<usize> {
    if filtered.is_empty() || envelope.is_empty() {
        return Vec::new();
    }
    let refractory = samples(cfg.min_rr_s, fs);
    let search = samples(cfg.search_back_s, fs);

    let warmup = envelope.len().min((fs as usize).max(1));
    let seed = envelope[..warmup].iter().sum::<f64>() / warmup as f64;
    let mut signal_level = seed;
    let mut noise_level = seed * 0.5;
    let threshold = |signal: f64, noise: f64| noise + cfg.threshold_scale * (signal - noise).max(0.0);
    let mut level = threshold(signal_level, noise_level);

    let mut last_crossing: Option<usize> = None;
    let mut peaks = Vec::new();
    for (i, &sample) in envelope.iter().enumerate() {
        let ready = last_crossing.map_or(true, |last| i - last >= refractory);
        if sample >= level && ready {
            if let Some(idx) = argmax(filtered, i.saturating_sub(search), i) {
                peaks.push(idx);
            }
            last_crossing = Some(i);
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }
        level = threshold(signal_level, noise_level);
    }

    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

/// Local maxima of the signal above its 150 ms moving average, spaced by the refractory period.
fn fallback_peaks(ts: &TimeSeries, cfg: &EcgDetectorConfig) -> Vec<usize> {
    let data = &ts.data;
    if data.len() < 3 {
        return Vec::new();
    }
    let min_gap = (cfg.min_rr_s * ts.fs).max(1.0) as usize;
    let baseline = moving_average(data, ((0.150 * ts.fs) as usize).max(1));
    let detrended: Vec<f64> = data.iter().zip(&baseline).map(|(x, m)| x - m).collect();

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..data.len() - 1 {
        let y = detrended[i];
        let is_max = y > 0.0 && y > detrended[i - 1] && y > detrended[i + 1];
        if is_max && peaks.last().map_or(true, |&last| i - last >= min_gap) {
            peaks.push(i);
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn beat_times(rr: &[f64]) -> Vec<f64> {
        let mut t = 0.5;
        let mut beats = vec![t];
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        beats
    }

    fn synthetic_ecg(fs: f64, beats: &[f64]) -> TimeSeries {
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let n = (duration * fs) as usize;
        let data = (0..n)
            .map(|i| {
                let time = i as f64 / fs;
                let wander = 0.05 * (2.0 * PI * time).sin();
                let qrs: f64 = beats
                    .iter()
                    .map(|&bt| 1.2 * (-0.5 * ((time - bt) / 0.02).powi(2)).exp())
                    .sum();
                wander + qrs
            })
            .collect();
        TimeSeries { fs, data }
    }

    #[test]
    fn detects_regular_beats() {
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let beats = beat_times(&rr);
        let ts = synthetic_ecg(250.0, &beats);
        let detected = EcgBeatDetector::with_min_rr(0.3).detect_beats(&ts).unwrap();
        assert_eq!(detected.len(), beats.len());
        for (found, truth) in detected.times().iter().zip(&beats) {
            assert!((found - truth).abs() < 0.1, "beat at {found}, expected {truth}");
        }
        assert!(detected.times().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn default_config_finds_every_beat() {
        let rr = [0.9, 0.85, 0.88, 0.86, 0.82, 0.81, 0.8];
        let beats = beat_times(&rr);
        let ts = synthetic_ecg(250.0, &beats);
        let detected = EcgBeatDetector::default().detect_beats(&ts).unwrap();
        assert_eq!(detected.len(), rr.len() + 1);
        assert_eq!(detected.amplitudes().len(), detected.len());
    }

    #[test]
    fn empty_waveform_has_no_beats() {
        let ts = TimeSeries {
            fs: 250.0,
            data: Vec::new(),
        };
        assert!(EcgBeatDetector::default().detect_beats(&ts).unwrap().is_empty());
    }

    #[test]
    fn config_fills_missing_fields_from_defaults() {
        let cfg: EcgDetectorConfig = serde_json::from_str(r#"{"min_rr_s": 0.3}"#).unwrap();
        assert_eq!(cfg.min_rr_s, 0.3);
        assert_eq!(cfg.highcut_hz, 15.0);
    }
}
