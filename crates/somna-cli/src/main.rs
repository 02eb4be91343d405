use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use somna_lib::{
    classifier::OnnxClassifier,
    config::AnalysisConfig,
    detectors::{PanTompkinsDetector, PeakDetector},
    io::{
        edf::{self as edf_io, ChannelRef},
        manifest, text as text_io, wfdb as wfdb_io,
    },
    metrics::{HeartMetrics, RatioOfRatiosSpO2, SimulatedSpO2, SpO2Estimator},
    pipeline::{Recording, SessionAnalyzer, SessionMetadata},
    segment::segment_signal,
    signal::{EpochLabel, TimeSeries},
};
use rayon::prelude::*;
use std::{
    any::Any,
    io::{self, Read},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

#[derive(Parser)]
#[command(
    name = "somna",
    version,
    about = "Sleep apnea session analysis: AHI, heart metrics, SpO2 and sleep stage"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where to read the raw single-channel signal from.
#[derive(Args, Debug)]
struct SignalArgs {
    /// Sampling frequency for newline-delimited input (Hz)
    #[arg(long, default_value_t = 100.0)]
    fs: f64,
    /// Newline-delimited samples; stdin when no source is given
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    wfdb_header: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    wfdb_lead: usize,
    #[arg(long)]
    edf: Option<PathBuf>,
    /// EDF signal index or label
    #[arg(long, default_value = "0")]
    edf_channel: ChannelRef,
}

/// Where to read per-epoch annotations from.
#[derive(Args, Debug)]
struct LabelArgs {
    /// One symbol per line (`A` marks an apnea minute)
    #[arg(long)]
    labels: Option<PathBuf>,
    /// WFDB `.apn` annotation file
    #[arg(long)]
    apnea_annotations: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnalyzerArgs {
    /// Pretrained classifier (ONNX, input `[N, window_size, 1]`)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Analysis settings (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    window_size: Option<usize>,
    #[arg(long)]
    event_threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect heartbeats and print their sample indices
    FindPeaks {
        #[command(flatten)]
        signal: SignalArgs,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Heart rate / HRV from a peak list or from detected beats
    HeartMetrics {
        #[command(flatten)]
        signal: SignalArgs,
        /// Newline-delimited peak indices; detection runs when omitted
        #[arg(long)]
        peaks: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Report how a recording splits into annotated windows
    Segment {
        #[command(flatten)]
        signal: SignalArgs,
        #[command(flatten)]
        labels: LabelArgs,
        /// Window size falls back to this file, then to the default
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        window_size: Option<usize>,
    },
    /// Analyze one session and print its summary
    Analyze {
        #[command(flatten)]
        signal: SignalArgs,
        #[command(flatten)]
        labels: LabelArgs,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
        #[arg(long)]
        patient: String,
        /// Session date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        session_date: Option<NaiveDate>,
        /// Seed for the simulated SpO2 placeholder
        #[arg(long)]
        spo2_seed: Option<u64>,
        /// Red PPG channel for a measured SpO2 estimate (needs --ppg-ir)
        #[arg(long, requires = "ppg_ir")]
        ppg_red: Option<PathBuf>,
        #[arg(long, requires = "ppg_red")]
        ppg_ir: Option<PathBuf>,
    },
    /// Analyze every session of a CSV manifest across worker threads
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
        #[arg(long)]
        workers: Option<usize>,
        /// Base seed; session `i` uses `seed + i`
        #[arg(long, default_value_t = 0)]
        spo2_seed: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::FindPeaks { signal, config } => cmd_find_peaks(&signal, config.as_deref())?,
        Commands::HeartMetrics {
            signal,
            peaks,
            config,
        } => cmd_heart_metrics(&signal, peaks.as_deref(), config.as_deref())?,
        Commands::Segment {
            signal,
            labels,
            config,
            window_size,
        } => cmd_segment(&signal, &labels, config.as_deref(), window_size)?,
        Commands::Analyze {
            signal,
            labels,
            analyzer,
            patient,
            session_date,
            spo2_seed,
            ppg_red,
            ppg_ir,
        } => {
            let ppg = ppg_red.zip(ppg_ir);
            cmd_analyze(
                &signal,
                &labels,
                &analyzer,
                patient,
                session_date,
                spo2_seed,
                ppg.as_ref().map(|(red, ir)| (red.as_path(), ir.as_path())),
            )?
        }
        Commands::Batch {
            manifest,
            analyzer,
            workers,
            spo2_seed,
        } => cmd_batch(&manifest, &analyzer, workers, spo2_seed)?,
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

fn load_time_series(args: &SignalArgs) -> Result<TimeSeries> {
    if let Some(header) = &args.wfdb_header {
        wfdb_io::load_wfdb_lead(header, args.wfdb_lead)
    } else if let Some(edf) = &args.edf {
        edf_io::load_edf_channel(edf, &args.edf_channel)
    } else {
        let data = read_samples(args.input.as_deref())?;
        Ok(TimeSeries::new(args.fs, data))
    }
}

fn load_labels(args: &LabelArgs) -> Result<Vec<EpochLabel>> {
    match (&args.apnea_annotations, &args.labels) {
        (Some(apn), _) => wfdb_io::load_apnea_labels(apn),
        (None, Some(path)) => text_io::read_epoch_labels(path),
        (None, None) => bail!("either --labels or --apnea-annotations is required"),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_toml_file(path),
        None => Ok(AnalysisConfig::default()),
    }
}

fn build_analyzer(args: &AnalyzerArgs) -> Result<SessionAnalyzer> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(window_size) = args.window_size {
        config.window_size = window_size;
    }
    if let Some(threshold) = args.event_threshold {
        config.event_threshold = threshold;
    }
    config.validate()?;

    let detector = PanTompkinsDetector::new(config.detector);
    let window_size = config.window_size;
    let mut builder = SessionAnalyzer::builder(config).detector(Arc::new(detector));
    match &args.model {
        Some(path) => {
            let model = OnnxClassifier::from_file(path, window_size)?;
            builder = builder.classifier(Arc::new(model));
        }
        None => warn!("no --model given; event classification is unavailable"),
    }
    Ok(builder.build())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_find_peaks(signal: &SignalArgs, config: Option<&Path>) -> Result<()> {
    let ts = load_time_series(signal)?;
    let cfg = load_config(config)?;
    let events = PanTompkinsDetector::new(cfg.detector).detect(&ts)?;
    print_json(&events)
}

fn cmd_heart_metrics(
    signal: &SignalArgs,
    peaks: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    let (events, fs) = match peaks {
        Some(path) => (text_io::read_event_indices(path)?, signal.fs),
        None => {
            let ts = load_time_series(signal)?;
            let cfg = load_config(config)?;
            (PanTompkinsDetector::new(cfg.detector).detect(&ts)?, ts.fs)
        }
    };
    let metrics = HeartMetrics::from_peaks(&events, fs)?;
    print_json(&metrics)
}

#[derive(Serialize)]
struct SegmentReport {
    window_size: usize,
    segments: usize,
    apnea_segments: usize,
    dropped_epochs: usize,
}

fn cmd_segment(
    signal: &SignalArgs,
    labels: &LabelArgs,
    config: Option<&Path>,
    window_size: Option<usize>,
) -> Result<()> {
    let window_size = match window_size {
        Some(window_size) => window_size,
        None => load_config(config)?.window_size,
    };
    let ts = load_time_series(signal)?;
    let labels = load_labels(labels)?;
    let seg = segment_signal(&ts.data, &labels, window_size)?;
    let report = SegmentReport {
        window_size,
        segments: seg.len(),
        apnea_segments: seg.segments.iter().filter(|s| s.label == 1).count(),
        dropped_epochs: seg.dropped_epochs,
    };
    print_json(&report)
}

fn cmd_analyze(
    signal: &SignalArgs,
    labels: &LabelArgs,
    analyzer_args: &AnalyzerArgs,
    patient: String,
    session_date: Option<NaiveDate>,
    spo2_seed: Option<u64>,
    ppg: Option<(&Path, &Path)>,
) -> Result<()> {
    let analyzer = build_analyzer(analyzer_args)?;
    let recording = Recording::new(load_time_series(signal)?, load_labels(labels)?);
    let metadata = SessionMetadata {
        patient_id: patient,
        session_date: session_date.unwrap_or_else(|| Local::now().date_naive()),
    };
    let mut spo2: Box<dyn SpO2Estimator> = match (ppg, spo2_seed) {
        (Some((red, ir)), _) => Box::new(RatioOfRatiosSpO2::new(
            text_io::read_f64_series(red)?,
            text_io::read_f64_series(ir)?,
        )),
        (None, Some(seed)) => Box::new(SimulatedSpO2::seeded(seed)),
        (None, None) => Box::new(SimulatedSpO2::from_entropy()),
    };
    let summary = analyzer.analyze(&recording, metadata, spo2.as_mut())?;
    print_json(&summary)
}

#[derive(Serialize)]
struct BatchFailure<'a> {
    patient_id: &'a str,
    session_date: NaiveDate,
    error: String,
}

fn cmd_batch(
    manifest_path: &Path,
    analyzer_args: &AnalyzerArgs,
    workers: Option<usize>,
    spo2_seed: u64,
) -> Result<()> {
    let analyzer = build_analyzer(analyzer_args)?;
    let entries = manifest::read_manifest(manifest_path)?;
    let workers = workers
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()))
        .clamp(1, entries.len());
    info!("analyzing {} sessions on {} workers", entries.len(), workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("failed to start batch workers")?;
    let results: Vec<Result<String>> = pool.install(|| {
        entries
            .par_iter()
            .enumerate()
            .map(|(idx, entry)| {
                let seed = spo2_seed.wrapping_add(idx as u64);
                panic::catch_unwind(AssertUnwindSafe(|| analyze_entry(&analyzer, entry, seed)))
                    .unwrap_or_else(|payload| Err(panic_error(payload)))
            })
            .collect()
    });

    let mut failures = 0;
    for (entry, result) in entries.iter().zip(results) {
        match result {
            Ok(line) => println!("{}", line),
            Err(err) => {
                failures += 1;
                print_json(&BatchFailure {
                    patient_id: &entry.metadata.patient_id,
                    session_date: entry.metadata.session_date,
                    error: format!("{:#}", err),
                })?;
            }
        }
    }
    if failures > 0 {
        warn!("{} of {} sessions failed", failures, entries.len());
    }
    Ok(())
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    anyhow::anyhow!("session analysis panicked: {}", msg)
}

fn analyze_entry(
    analyzer: &SessionAnalyzer,
    entry: &manifest::SessionEntry,
    seed: u64,
) -> Result<String> {
    let signal = wfdb_io::load_wfdb_lead(&entry.header, entry.lead)?;
    let labels = wfdb_io::load_apnea_labels(&entry.annotations)?;
    let recording = Recording::new(signal, labels);
    let summary = analyzer.analyze(
        &recording,
        entry.metadata.clone(),
        &mut SimulatedSpO2::seeded(seed),
    )?;
    Ok(serde_json::to_string(&summary)?)
}
