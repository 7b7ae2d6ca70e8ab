//! Orchestration of detectors, feature extraction and annotation projection
//! into the aligned feature matrix and arousal labels.

use crate::detectors::{
    BeatDetector, EcgBeatDetector, EcgDetectorConfig, PpgPulseDetector, PulseDetector,
    PulseDetectorConfig,
};
use crate::error::{check_rate, PipelineError, PipelineResult};
use crate::features::{PulseCorrelate, SecondaryFeatures};
use crate::mask::{AnnotationSet, ArousalRule, IntervalMask, SleepStageRule};
use crate::projector::AnnotationProjector;
use crate::signal::{BeatSeries, PulsePeakSeries, TimeSeries};
use log::debug;
use serde::{Deserialize, Serialize};

/// Value written for an absent measurement in the flat (legacy) layout.
pub const SENTINEL: f64 = -1.0;

/// Column names of [`FeatureRow::to_legacy`], in order.
pub const COLUMN_NAMES: [&str; 6] = ["index", "rr", "rwa", "ptt", "pwa", "ss"];

/// Everything the assembler needs besides the inputs themselves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rate used to express beat timestamps as sample indices in the first column.
    pub sample_rate_hz: f64,
    pub ecg: EcgDetectorConfig,
    pub pulse: PulseDetectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 256.0,
            ecg: EcgDetectorConfig::default(),
            pulse: PulseDetectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Features plus arousal labels (training data).
    Labeled,
    /// Features only (inference on unscored recordings).
    Unlabeled,
}

/// One usable beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub sample_index: usize,
    pub inter_beat_interval: f64,
    pub beat_amplitude: f64,
    /// `None` when no pulse peak follows the beat before the next one.
    pub pulse: Option<PulseCorrelate>,
    pub sleep_stage: i8,
}

impl FeatureRow {
    pub fn pulse_transit_delay(&self) -> Option<f64> {
        self.pulse.map(|p| p.transit_delay)
    }

    pub fn pulse_amplitude(&self) -> Option<f64> {
        self.pulse.map(|p| p.amplitude)
    }

    /// Flat row in [`COLUMN_NAMES`] order with [`SENTINEL`] for a missing pulse.
    pub fn to_legacy(&self) -> [f64; 6] {
        [
            self.sample_index as f64,
            self.inter_beat_interval,
            self.beat_amplitude,
            self.pulse_transit_delay().unwrap_or(SENTINEL),
            self.pulse_amplitude().unwrap_or(SENTINEL),
            f64::from(self.sleep_stage),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_legacy_rows(&self) -> Vec<[f64; 6]> {
        self.rows.iter().map(FeatureRow::to_legacy).collect()
    }
}

/// Arousal label (0 or 1) per feature row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVector {
    pub labels: Vec<u8>,
}

impl LabelVector {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Assembled output. `labels`, when present, has exactly one entry per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub features: FeatureMatrix,
    pub labels: Option<LabelVector>,
}

impl FeatureSet {
    pub fn summary(&self) -> FeatureSummary {
        let rows = self.features.len();
        let missing_pulse = self.features.rows.iter().filter(|r| r.pulse.is_none()).count();
        FeatureSummary {
            rows,
            missing_pulse,
            missing_pulse_ratio: if rows > 0 {
                missing_pulse as f64 / rows as f64
            } else {
                0.0
            },
            arousal_rows: self
                .labels
                .as_ref()
                .map(|l| l.labels.iter().filter(|&&v| v == 1).count()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub rows: usize,
    pub missing_pulse: usize,
    pub missing_pulse_ratio: f64,
    pub arousal_rows: Option<usize>,
}

/// Peak series and annotations for one recording, detection already done.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInputs<'a> {
    pub beats: &'a BeatSeries,
    pub pulses: &'a PulsePeakSeries,
    /// Length of the pulse recording in seconds; bounds the last beat's window.
    pub pulse_duration: f64,
    /// Rate the annotation masks are rasterized at.
    pub annotation_rate: f64,
    pub sleep_stages: &'a AnnotationSet,
    pub arousals: Option<&'a AnnotationSet>,
}

/// Raw waveforms and annotations of one recording.
#[derive(Debug, Clone)]
pub struct Recording {
    pub id: String,
    pub ecg: TimeSeries,
    pub ppg: TimeSeries,
    pub sleep_stages: AnnotationSet,
    pub arousals: Option<AnnotationSet>,
}

pub struct FeatureAssembler<B, P> {
    config: PipelineConfig,
    beat_detector: B,
    pulse_detector: P,
}

impl FeatureAssembler<EcgBeatDetector, PpgPulseDetector> {
    /// Assembler using the built-in ECG and PPG detectors configured from `config`.
    pub fn with_default_detectors(config: PipelineConfig) -> Self {
        Self::new(
            config,
            EcgBeatDetector::new(config.ecg),
            PpgPulseDetector::new(config.pulse),
        )
    }
}

impl<B: BeatDetector, P: PulseDetector> FeatureAssembler<B, P> {
    pub fn new(config: PipelineConfig, beat_detector: B, pulse_detector: P) -> Self {
        Self {
            config,
            beat_detector,
            pulse_detector,
        }
    }

    /// Detect peaks in both waveforms, then assemble. Annotation masks are
    /// rasterized at the ECG sampling rate.
    pub fn run(&self, recording: &Recording, mode: OutputMode) -> PipelineResult<FeatureSet> {
        let beats = self.beat_detector.detect_beats(&recording.ecg)?;
        let pulses = self.pulse_detector.detect_pulses(&recording.ppg)?;
        debug!(
            "{}: detected {} beats and {} pulse peaks",
            recording.id,
            beats.len(),
            pulses.len()
        );
        self.assemble(
            AssemblyInputs {
                beats: &beats,
                pulses: &pulses,
                pulse_duration: recording.ppg.duration(),
                annotation_rate: recording.ecg.fs,
                sleep_stages: &recording.sleep_stages,
                arousals: recording.arousals.as_ref(),
            },
            mode,
        )
    }

    /// Build the feature matrix from already detected peaks. The first beat
    /// has no inter-beat interval and is dropped from features and labels
    /// alike, leaving `beats.len() - 1` rows.
    pub fn assemble(
        &self,
        inputs: AssemblyInputs<'_>,
        mode: OutputMode,
    ) -> PipelineResult<FeatureSet> {
        let index_rate = check_rate(self.config.sample_rate_hz)?;
        let beats = inputs.beats;
        if beats.len() < 2 {
            return Err(PipelineError::TooFewBeats(beats.len()));
        }
        let arousals = match mode {
            OutputMode::Labeled => Some(inputs.arousals.ok_or(PipelineError::MissingArousals)?),
            OutputMode::Unlabeled => None,
        };

        let secondary = SecondaryFeatures::extract(beats, inputs.pulses, inputs.pulse_duration)?;
        debug!(
            "{} of {} beats have no pulse peak before the next beat",
            secondary.missing_correlates(),
            secondary.len()
        );

        let stage_mask =
            IntervalMask::rasterize(inputs.sleep_stages, inputs.annotation_rate, &SleepStageRule)?;
        let stages = AnnotationProjector::sleep_stage(&stage_mask).project(beats.times())?;

        let sample_indices = beats.sample_indices(index_rate);
        let rows = secondary
            .inter_beat_intervals
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, rr)| FeatureRow {
                sample_index: sample_indices[i],
                inter_beat_interval: rr.unwrap_or(SENTINEL),
                beat_amplitude: beats.amplitudes()[i],
                pulse: secondary.pulse[i],
                sleep_stage: stages[i],
            })
            .collect();
        let features = FeatureMatrix { rows };

        let labels = match arousals {
            Some(set) => {
                let mask = IntervalMask::rasterize(set, inputs.annotation_rate, &ArousalRule)?;
                let per_beat = AnnotationProjector::arousal(&mask).project(beats.times())?;
                Some(LabelVector {
                    labels: per_beat[1..].iter().map(|&c| c as u8).collect(),
                })
            }
            None => None,
        };

        debug!(
            "assembled {} rows ({:?} mode) from {} beats",
            features.len(),
            mode,
            beats.len()
        );
        Ok(FeatureSet { features, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::FixedPeaks;
    use crate::error::PipelineError;
    use crate::mask::AnnotationInterval;
    use crate::signal::PeakSeries;

    fn scenario() -> (PeakSeries, PeakSeries, AnnotationSet, AnnotationSet) {
        let beats = PeakSeries::new(vec![1.0, 2.0, 3.5], vec![1.1, 1.2, 1.3]).unwrap();
        let pulses = PeakSeries::new(vec![1.2, 3.6], vec![0.5, 0.9]).unwrap();
        let stages = AnnotationSet::new(
            10.0,
            vec![
                AnnotationInterval::new(0.0, 3.0, 0),
                AnnotationInterval::new(3.0, 7.0, 5),
            ],
        );
        let arousals = AnnotationSet::new(10.0, vec![AnnotationInterval::new(1.5, 1.0, 1)]);
        (beats, pulses, stages, arousals)
    }

    fn assembler() -> FeatureAssembler<FixedPeaks, FixedPeaks> {
        let config = PipelineConfig {
            sample_rate_hz: 10.0,
            ..PipelineConfig::default()
        };
        FeatureAssembler::new(config, FixedPeaks::default(), FixedPeaks::default())
    }

    #[test]
    fn labeled_scenario_trims_first_beat() {
        let (beats, pulses, stages, arousals) = scenario();
        let set = assembler()
            .assemble(
                AssemblyInputs {
                    beats: &beats,
                    pulses: &pulses,
                    pulse_duration: 10.0,
                    annotation_rate: 1.0,
                    sleep_stages: &stages,
                    arousals: Some(&arousals),
                },
                OutputMode::Labeled,
            )
            .unwrap();

        assert_eq!(set.features.len(), beats.len() - 1);
        let labels = set.labels.as_ref().unwrap();
        assert_eq!(labels.len(), set.features.len());
        assert_eq!(labels.labels, vec![1, 0]);

        let first = set.features.rows[0];
        assert_eq!(first.sample_index, 20);
        assert_eq!(first.inter_beat_interval, 1.0);
        assert_eq!(first.beat_amplitude, 1.2);
        assert_eq!(first.pulse, None);
        assert_eq!(first.sleep_stage, -1);
        assert_eq!(first.to_legacy(), [20.0, 1.0, 1.2, -1.0, -1.0, -1.0]);

        let second = set.features.rows[1];
        assert_eq!(second.sample_index, 35);
        assert_eq!(second.inter_beat_interval, 1.5);
        assert!((second.pulse_transit_delay().unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(second.pulse_amplitude(), Some(0.9));
        assert_eq!(second.sleep_stage, 1);

        let summary = set.summary();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.missing_pulse, 1);
        assert_eq!(summary.arousal_rows, Some(1));
    }

    #[test]
    fn unlabeled_mode_ignores_arousals() {
        let (beats, pulses, stages, arousals) = scenario();
        let inputs = AssemblyInputs {
            beats: &beats,
            pulses: &pulses,
            pulse_duration: 10.0,
            annotation_rate: 1.0,
            sleep_stages: &stages,
            arousals: Some(&arousals),
        };
        let set = assembler().assemble(inputs, OutputMode::Unlabeled).unwrap();
        assert!(set.labels.is_none());
        assert_eq!(set.features.len(), 2);
        assert_eq!(set.summary().arousal_rows, None);
    }

    #[test]
    fn labeled_mode_requires_arousals() {
        let (beats, pulses, stages, _) = scenario();
        let inputs = AssemblyInputs {
            beats: &beats,
            pulses: &pulses,
            pulse_duration: 10.0,
            annotation_rate: 1.0,
            sleep_stages: &stages,
            arousals: None,
        };
        assert_eq!(
            assembler().assemble(inputs, OutputMode::Labeled),
            Err(PipelineError::MissingArousals)
        );
    }

    #[test]
    fn single_beat_is_rejected() {
        let (_, pulses, stages, _) = scenario();
        let beats = PeakSeries::new(vec![1.0], vec![1.0]).unwrap();
        let inputs = AssemblyInputs {
            beats: &beats,
            pulses: &pulses,
            pulse_duration: 10.0,
            annotation_rate: 1.0,
            sleep_stages: &stages,
            arousals: None,
        };
        assert_eq!(
            assembler().assemble(inputs, OutputMode::Unlabeled),
            Err(PipelineError::TooFewBeats(1))
        );
    }

    #[test]
    fn beat_past_annotations_fails_loudly() {
        let (_, pulses, _, _) = scenario();
        let beats = PeakSeries::new(vec![1.0, 2.0, 12.0], vec![1.0; 3]).unwrap();
        let stages = AnnotationSet::new(10.0, Vec::new());
        let inputs = AssemblyInputs {
            beats: &beats,
            pulses: &pulses,
            pulse_duration: 15.0,
            annotation_rate: 1.0,
            sleep_stages: &stages,
            arousals: None,
        };
        assert!(matches!(
            assembler().assemble(inputs, OutputMode::Unlabeled),
            Err(PipelineError::IndexOutOfRange { index: 12, .. })
        ));
    }

    #[test]
    fn every_missing_pulse_has_both_sentinels() {
        let times: Vec<f64> = (0..40).map(|i| 0.5 + 0.8 * i as f64).collect();
        let beats = PeakSeries::new(times.clone(), vec![1.0; times.len()]).unwrap();
        // a pulse peak after every third beat only
        let pulse_times: Vec<f64> = times.iter().step_by(3).map(|t| t + 0.25).collect();
        let pulses = PeakSeries::new(pulse_times.clone(), vec![0.4; pulse_times.len()]).unwrap();
        let stages = AnnotationSet::new(40.0, Vec::new());
        let arousals = AnnotationSet::new(40.0, Vec::new());
        let set = assembler()
            .assemble(
                AssemblyInputs {
                    beats: &beats,
                    pulses: &pulses,
                    pulse_duration: 40.0,
                    annotation_rate: 4.0,
                    sleep_stages: &stages,
                    arousals: Some(&arousals),
                },
                OutputMode::Labeled,
            )
            .unwrap();
        assert_eq!(set.features.len(), 39);
        assert_eq!(set.labels.as_ref().unwrap().len(), 39);
        for row in set.features.to_legacy_rows() {
            assert_eq!(row[3] == SENTINEL, row[4] == SENTINEL);
        }
        assert_eq!(set.summary().missing_pulse, 26);
    }

    #[test]
    fn run_uses_the_detectors() {
        let (beats, pulses, stages, arousals) = scenario();
        let recording = Recording {
            id: "fake".into(),
            ecg: TimeSeries {
                fs: 2.0,
                data: vec![0.0; 20],
            },
            ppg: TimeSeries {
                fs: 2.0,
                data: vec![0.0; 20],
            },
            sleep_stages: stages,
            arousals: Some(arousals),
        };
        let assembler = FeatureAssembler::new(
            PipelineConfig::default(),
            FixedPeaks(beats),
            FixedPeaks(pulses),
        );
        let set = assembler.run(&recording, OutputMode::Labeled).unwrap();
        assert_eq!(set.features.len(), 2);
        assert_eq!(set.features.rows[1].pulse_amplitude(), Some(0.9));
        assert_eq!(set.labels.unwrap().labels, vec![1, 0]);
    }
}
