use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use somno_batch::{process_recording, read_manifest, run_batch, BatchOptions, RecordingEntry};
use somno_lib::{
    detectors::{
        BeatDetector, EcgBeatDetector, EcgDetectorConfig, PpgPulseDetector, PulseDetector,
        PulseDetectorConfig,
    },
    io::{
        annotations::read_annotation_table,
        edf::{load_edf_channel, ChannelSelector},
        peaks::{write_feature_table, write_peak_table},
        text::read_waveform,
    },
    mask::{ArousalRule, IntervalMask, SleepStageRule},
    PeakSeries, PipelineConfig, PipelineResult, TimeSeries,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "somno",
    version,
    about = "Beat-aligned cardiac and pulse features from overnight recordings"
)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MaskRule {
    #[value(name = "sleep-stage")]
    SleepStage,
    #[value(name = "arousal")]
    Arousal,
}

/// A waveform from newline-delimited text (stdin or --input) or from an EDF channel.
#[derive(Args)]
struct WaveformArgs {
    #[arg(long, default_value_t = 256.0)]
    fs: f64,
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    edf: Option<PathBuf>,
    /// EDF signal label or index
    #[arg(long)]
    channel: Option<String>,
    /// Also write the peaks as a time,amplitude table
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct FeaturesArgs {
    /// Pre-detected beats (time,amplitude table)
    #[arg(long, requires = "pulse_peaks")]
    beats: Option<PathBuf>,
    /// Pre-detected pulse peaks (time,amplitude table)
    #[arg(long, requires = "beats")]
    pulse_peaks: Option<PathBuf>,
    /// EDF recording to run both detectors on
    #[arg(long, conflicts_with_all = ["beats", "pulse_peaks"])]
    edf: Option<PathBuf>,
    #[arg(long, default_value = "ECG")]
    ecg_channel: String,
    #[arg(long, default_value = "Pleth")]
    ppg_channel: String,
    #[arg(long)]
    sleep_stages: PathBuf,
    /// Arousal scoring; produces a labeled table when given
    #[arg(long)]
    arousals: Option<PathBuf>,
    /// Recording length in seconds
    #[arg(long)]
    duration: Option<f64>,
    /// Length of the pulse recording in seconds (defaults to --duration);
    /// with --edf the pulse channel's own length is used
    #[arg(long, conflicts_with = "edf")]
    pulse_duration: Option<f64>,
    /// Rate of the sample-index column
    #[arg(long, default_value_t = 256.0)]
    fs: f64,
    /// Write a CSV table instead of printing JSON
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect R-peaks in an ECG waveform and print them as JSON
    DetectBeats {
        #[command(flatten)]
        waveform: WaveformArgs,
        #[arg(long)]
        min_rr_s: Option<f64>,
    },
    /// Detect systolic peaks in a pulse waveform and print them as JSON
    DetectPulses {
        #[command(flatten)]
        waveform: WaveformArgs,
        #[arg(long)]
        min_interval_s: Option<f64>,
    },
    /// Assemble the beat-aligned feature table of one recording
    Features(FeaturesArgs),
    /// Rasterize an annotation table and print the class array as JSON
    Mask {
        #[arg(long)]
        annotations: PathBuf,
        #[arg(long)]
        duration: Option<f64>,
        #[arg(long, default_value_t = 1.0)]
        fs: f64,
        #[arg(long, default_value = "sleep-stage")]
        rule: MaskRule,
    },
    /// Process every recording of a TOML manifest
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        /// Reprocess recordings that already have an output table
        #[arg(long)]
        force: bool,
        #[arg(long, default_value_t = 1)]
        jobs: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();
    match cli.command {
        Commands::DetectBeats { waveform, min_rr_s } => {
            let mut config = EcgDetectorConfig::default();
            if let Some(min_rr_s) = min_rr_s {
                config.min_rr_s = min_rr_s;
            }
            let detector = EcgBeatDetector::new(config);
            cmd_detect(&waveform, "ECG", |ts| detector.detect_beats(ts))?
        }
        Commands::DetectPulses {
            waveform,
            min_interval_s,
        } => {
            let mut config = PulseDetectorConfig::default();
            if let Some(min_interval_s) = min_interval_s {
                config.min_interval_s = min_interval_s;
            }
            let detector = PpgPulseDetector::new(config);
            cmd_detect(&waveform, "Pleth", |ts| detector.detect_pulses(ts))?
        }
        Commands::Features(args) => cmd_features(args)?,
        Commands::Mask {
            annotations,
            duration,
            fs,
            rule,
        } => cmd_mask(&annotations, duration, fs, rule)?,
        Commands::Batch {
            manifest,
            out_dir,
            force,
            jobs,
        } => cmd_batch(&manifest, out_dir, force, jobs)?,
    }
    Ok(())
}

fn load_waveform(args: &WaveformArgs, default_channel: &str) -> Result<TimeSeries> {
    if let Some(edf) = &args.edf {
        let channel = args.channel.as_deref().unwrap_or(default_channel);
        load_edf_channel(edf, &ChannelSelector::from(channel))
    } else {
        read_waveform(args.input.as_deref(), args.fs)
    }
}

fn cmd_detect(
    args: &WaveformArgs,
    default_channel: &str,
    detect: impl FnOnce(&TimeSeries) -> PipelineResult<PeakSeries>,
) -> Result<()> {
    let ts = load_waveform(args, default_channel)?;
    let peaks = detect(&ts)?;
    info!("{} peaks in {:.1}s of signal", peaks.len(), ts.duration());
    if let Some(out) = &args.out {
        write_peak_table(out, &peaks)?;
    }
    println!("{}", serde_json::to_string(&peaks)?);
    Ok(())
}

fn cmd_features(args: FeaturesArgs) -> Result<()> {
    if args.edf.is_none() && args.beats.is_none() {
        bail!("either --beats/--pulse-peaks or --edf is required");
    }
    let entry = RecordingEntry {
        id: args
            .sleep_stages
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".into()),
        edf: args.edf,
        ecg_channel: args.ecg_channel,
        ppg_channel: args.ppg_channel,
        beats: args.beats,
        pulse_peaks: args.pulse_peaks,
        duration: args.duration,
        pulse_duration: args.pulse_duration,
        sleep_stages: args.sleep_stages,
        arousals: args.arousals,
    };
    let config = PipelineConfig {
        sample_rate_hz: args.fs,
        ..PipelineConfig::default()
    };
    let set = process_recording(&entry, &config)?;
    let summary = set.summary();
    info!(
        "{} rows, {} without pulse peak",
        summary.rows, summary.missing_pulse
    );
    match &args.out {
        Some(out) => write_feature_table(out, &set)?,
        None => println!("{}", serde_json::to_string(&set)?),
    }
    Ok(())
}

fn cmd_mask(path: &Path, duration: Option<f64>, fs: f64, rule: MaskRule) -> Result<()> {
    let set = read_annotation_table(path, duration)?;
    let mask = match rule {
        MaskRule::SleepStage => IntervalMask::rasterize(&set, fs, &SleepStageRule)?,
        MaskRule::Arousal => IntervalMask::rasterize(&set, fs, &ArousalRule)?,
    };
    println!("{}", serde_json::to_string(&mask)?);
    Ok(())
}

fn cmd_batch(manifest: &Path, out_dir: PathBuf, force: bool, jobs: usize) -> Result<()> {
    let manifest = read_manifest(manifest)?;
    let report = run_batch(
        &manifest,
        &BatchOptions {
            out_dir,
            force,
            jobs,
        },
    )?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
