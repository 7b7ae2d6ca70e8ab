use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, unbounded};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use somno_lib::{
    io::{
        annotations::read_annotation_table,
        edf::{load_edf_channel, ChannelSelector},
        peaks::{read_peak_table, write_feature_table},
    },
    AssemblyInputs, FeatureAssembler, FeatureSet, FeatureSummary, OutputMode, PipelineConfig,
    Recording,
};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BatchManifest {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default, rename = "recording")]
    pub recordings: Vec<RecordingEntry>,
}

/// One `[[recording]]` entry. Peaks come either from `beats` + `pulse_peaks`
/// tables or from detection on the `edf` channels.
#[derive(Debug, Deserialize, Clone)]
pub struct RecordingEntry {
    pub id: String,
    #[serde(default)]
    pub edf: Option<PathBuf>,
    #[serde(default = "default_ecg_channel")]
    pub ecg_channel: String,
    #[serde(default = "default_ppg_channel")]
    pub ppg_channel: String,
    #[serde(default)]
    pub beats: Option<PathBuf>,
    #[serde(default)]
    pub pulse_peaks: Option<PathBuf>,
    /// Recording length in seconds; defaults to the ECG length or the scored span.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub pulse_duration: Option<f64>,
    pub sleep_stages: PathBuf,
    #[serde(default)]
    pub arousals: Option<PathBuf>,
}

fn default_ecg_channel() -> String {
    "ECG".into()
}

fn default_ppg_channel() -> String {
    "Pleth".into()
}

impl RecordingEntry {
    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.sleep_stages);
        for path in [
            &mut self.edf,
            &mut self.beats,
            &mut self.pulse_peaks,
            &mut self.arousals,
        ]
        .into_iter()
        .flatten()
        {
            join(path);
        }
    }

    pub fn mode(&self) -> OutputMode {
        if self.arousals.is_some() {
            OutputMode::Labeled
        } else {
            OutputMode::Unlabeled
        }
    }
}

/// Parse a TOML manifest; relative paths are taken relative to the manifest's directory.
pub fn read_manifest(path: &Path) -> Result<BatchManifest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let mut manifest: BatchManifest = toml::from_str(&contents)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for recording in &mut manifest.recordings {
        recording.resolve_paths(base);
    }
    Ok(manifest)
}

/// Build the feature set for one recording.
pub fn process_recording(entry: &RecordingEntry, config: &PipelineConfig) -> Result<FeatureSet> {
    let assembler = FeatureAssembler::with_default_detectors(*config);
    let mode = entry.mode();
    match (&entry.beats, &entry.pulse_peaks, &entry.edf) {
        (Some(beats_path), Some(pulses_path), _) => {
            let beats = read_peak_table(beats_path)?;
            let pulses = read_peak_table(pulses_path)?;
            let sleep_stages = read_annotation_table(&entry.sleep_stages, entry.duration)?;
            let duration = sleep_stages.duration;
            let arousals = entry
                .arousals
                .as_deref()
                .map(|path| read_annotation_table(path, Some(duration)))
                .transpose()?;
            let inputs = AssemblyInputs {
                beats: &beats,
                pulses: &pulses,
                pulse_duration: entry.pulse_duration.unwrap_or(duration),
                annotation_rate: config.sample_rate_hz,
                sleep_stages: &sleep_stages,
                arousals: arousals.as_ref(),
            };
            Ok(assembler.assemble(inputs, mode)?)
        }
        (_, _, Some(edf)) => {
            if entry.pulse_duration.is_some() {
                bail!(
                    "recording '{}': pulse_duration only applies to peak tables; \
                     with an edf file it is the length of the {} channel",
                    entry.id,
                    entry.ppg_channel
                );
            }
            let ecg = load_edf_channel(edf, &ChannelSelector::from(entry.ecg_channel.as_str()))?;
            let ppg = load_edf_channel(edf, &ChannelSelector::from(entry.ppg_channel.as_str()))?;
            let duration = entry.duration.unwrap_or_else(|| ecg.duration());
            let sleep_stages = read_annotation_table(&entry.sleep_stages, Some(duration))?;
            let arousals = entry
                .arousals
                .as_deref()
                .map(|path| read_annotation_table(path, Some(duration)))
                .transpose()?;
            let recording = Recording {
                id: entry.id.clone(),
                ecg,
                ppg,
                sleep_stages,
                arousals,
            };
            Ok(assembler.run(&recording, mode)?)
        }
        _ => bail!(
            "recording '{}' needs either beats and pulse_peaks tables or an edf file",
            entry.id
        ),
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub out_dir: PathBuf,
    /// Reprocess recordings whose output already exists.
    pub force: bool,
    /// Worker threads; at least one is used.
    pub jobs: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordingStatus {
    Completed { summary: FeatureSummary },
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordingReport {
    pub id: String,
    pub output: PathBuf,
    pub elapsed_s: f64,
    #[serde(flatten)]
    pub status: RecordingStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchReport {
    pub start_time_unix: f64,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub recordings: Vec<RecordingReport>,
}

impl BatchReport {
    fn from_reports(start_time_unix: f64, recordings: Vec<RecordingReport>) -> Self {
        let (mut completed, mut skipped, mut failed) = (0, 0, 0);
        for report in &recordings {
            match report.status {
                RecordingStatus::Completed { .. } => completed += 1,
                RecordingStatus::Skipped => skipped += 1,
                RecordingStatus::Failed { .. } => failed += 1,
            }
        }
        Self {
            start_time_unix,
            total: recordings.len(),
            completed,
            skipped,
            failed,
            recordings,
        }
    }
}

pub fn output_path(out_dir: &Path, id: &str) -> PathBuf {
    out_dir.join(format!("{}.csv", id.replace(['/', '\\', ' '], "-")))
}

/// Process every recording of the manifest. A failing recording is logged
/// and reported; it never stops the others, even when it panics. The report
/// is also written to `<out_dir>/report.json`.
pub fn run_batch(manifest: &BatchManifest, options: &BatchOptions) -> Result<BatchReport> {
    run_batch_with(manifest, options, process_recording)
}

fn run_batch_with<F>(
    manifest: &BatchManifest,
    options: &BatchOptions,
    process: F,
) -> Result<BatchReport>
where
    F: Fn(&RecordingEntry, &PipelineConfig) -> Result<FeatureSet> + Sync,
{
    fs::create_dir_all(&options.out_dir)
        .with_context(|| format!("creating {}", options.out_dir.display()))?;
    let start_time_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.0);

    let mut pending = Vec::new();
    let mut reports: Vec<(usize, RecordingReport)> = Vec::new();
    for (idx, entry) in manifest.recordings.iter().enumerate() {
        let output = output_path(&options.out_dir, &entry.id);
        if output.exists() && !options.force {
            info!("{} already completed", entry.id);
            reports.push((
                idx,
                RecordingReport {
                    id: entry.id.clone(),
                    output,
                    elapsed_s: 0.0,
                    status: RecordingStatus::Skipped,
                },
            ));
        } else {
            pending.push((idx, entry, output));
        }
    }
    info!(
        "{} recording(s) remaining, {} already completed",
        pending.len(),
        reports.len()
    );

    let jobs = options.jobs.max(1).min(pending.len().max(1));
    let (job_tx, job_rx) = bounded(jobs);
    let (done_tx, done_rx) = unbounded();
    std::thread::scope(|scope| {
        for _ in 0..jobs {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let config = &manifest.pipeline;
            let process = &process;
            scope.spawn(move || {
                for (idx, entry, output) in job_rx {
                    let report = process_and_write(process, entry, config, output);
                    if done_tx.send((idx, report)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);
        for job in pending {
            if job_tx.send(job).is_err() {
                warn!("batch workers stopped before all recordings were queued");
                break;
            }
        }
        drop(job_tx);
    });
    reports.extend(done_rx.iter());
    reports.sort_by_key(|(idx, _)| *idx);

    let report = BatchReport::from_reports(
        start_time_unix,
        reports.into_iter().map(|(_, r)| r).collect(),
    );
    info!(
        "batch finished: {} completed, {} skipped, {} failed",
        report.completed, report.skipped, report.failed
    );
    write_report(&options.out_dir.join("report.json"), &report)?;
    Ok(report)
}

fn process_and_write<F>(
    process: &F,
    entry: &RecordingEntry,
    config: &PipelineConfig,
    output: PathBuf,
) -> RecordingReport
where
    F: Fn(&RecordingEntry, &PipelineConfig) -> Result<FeatureSet>,
{
    let clock = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        process(entry, config)
            .and_then(|set| write_feature_table(&output, &set).map(|_| set.summary()))
    }))
    .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))));
    let elapsed_s = clock.elapsed().as_secs_f64();
    let status = match result {
        Ok(summary) => {
            info!(
                "{} preprocessed in {:.2}s ({} rows, {:.1}% without pulse peak)",
                entry.id,
                elapsed_s,
                summary.rows,
                summary.missing_pulse_ratio * 100.0
            );
            RecordingStatus::Completed { summary }
        }
        Err(err) => {
            error!("{} failed: {:#}", entry.id, err);
            RecordingStatus::Failed {
                error: format!("{:#}", err),
            }
        }
    };
    RecordingReport {
        id: entry.id.clone(),
        output,
        elapsed_s,
        status,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

pub fn write_report(path: &Path, report: &BatchReport) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

pub fn read_report(path: &Path) -> Result<BatchReport> {
    let file = fs::File::open(path).with_context(|| format!("opening report {}", path.display()))?;
    let report = serde_json::from_reader(file)
        .with_context(|| format!("parsing report {}", path.display()))?;
    Ok(report)
}
