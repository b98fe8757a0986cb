use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use vitals_lib::{
    detectors::{
        estimate_period, extract_peaks_and_hr, segment_waveforms_with_config, HeartRateSample,
        HeartbeatAnalysis, PanTompkins, PeakRecord, SegmenterConfig, WaveRecord,
    },
    filter::{apply_fir, design_highpass_fir, design_highpass_fir_with_window, StreamingFir},
    io::{csv as csv_io, text as text_io},
    pipeline::{analyze, PipelineConfig, TimedWave},
    signal::TimeSeries,
    synth::{simulate_case, CaseProfile},
    timebase::{align, Channels},
};

#[derive(Parser)]
#[command(
    name = "vitals",
    version,
    about = "Filtering, heartbeat and arterial-pressure analysis for physiological recordings"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Design a high-pass FIR and print its coefficients
    DesignFir {
        #[arg(long, default_value_t = 20.0)]
        cutoff_hz: f64,
        #[arg(long, default_value_t = 500.0)]
        fs: f64,
        #[arg(long, default_value_t = 100)]
        length: usize,
        /// Frequency bins of the design window
        #[arg(long, default_value_t = 5000)]
        window: usize,
    },
    /// High-pass filter newline-delimited samples from stdin or --input
    Filter {
        #[arg(long, default_value_t = 500.0)]
        fs: f64,
        #[arg(long, default_value_t = 20.0)]
        cutoff_hz: f64,
        #[arg(long, default_value_t = 100)]
        length: usize,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Detect heartbeats and instantaneous heart rate in an ECG series
    FindPeaks {
        #[arg(long, default_value_t = 500.0)]
        fs: f64,
        #[arg(long, default_value_t = 20.0)]
        cutoff_hz: f64,
        #[arg(long, default_value_t = 100)]
        length: usize,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Beat sample indices to use instead of the built-in detector
        #[arg(long)]
        annotations: Option<PathBuf>,
        /// Run detection on the raw samples
        #[arg(long)]
        no_filter: bool,
    },
    /// Split an arterial pressure series into cardiac cycles
    SegmentAbp {
        #[arg(long, default_value_t = 500.0)]
        fs: f64,
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML file with segmenter settings
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Align channel CSVs and run the full analysis over a window
    Analyze {
        /// Channel as NAME=PATH (repeatable)
        #[arg(long = "channel", value_parser = parse_channel_arg, required = true)]
        channels: Vec<(String, PathBuf)>,
        /// TOML pipeline configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Analyse the window around a named event from the configuration
        #[arg(long, conflicts_with_all = ["start_s", "end_s"])]
        event: Option<String>,
        #[arg(long)]
        start_s: Option<f64>,
        #[arg(long)]
        end_s: Option<f64>,
        /// Write the merged table (input and derived channels) as CSV
        #[arg(long)]
        out: Option<PathBuf>,
        /// Interpolate gaps in the written table
        #[arg(long, requires = "out")]
        dense: bool,
    },
    /// Write a synthetic multi-rate case as channel CSVs
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 72.0)]
        heart_rate_bpm: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Push samples through the streaming filter one at a time
    Replay {
        #[arg(long, default_value_t = 500.0)]
        fs: f64,
        #[arg(long, default_value_t = 20.0)]
        cutoff_hz: f64,
        #[arg(long, default_value_t = 100)]
        length: usize,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Pause between samples
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::DesignFir {
            cutoff_hz,
            fs,
            length,
            window,
        } => cmd_design_fir(cutoff_hz, fs, length, window)?,
        Commands::Filter {
            fs,
            cutoff_hz,
            length,
            input,
        } => cmd_filter(fs, cutoff_hz, length, input.as_deref())?,
        Commands::FindPeaks {
            fs,
            cutoff_hz,
            length,
            input,
            annotations,
            no_filter,
        } => cmd_find_peaks(
            fs,
            cutoff_hz,
            length,
            input.as_deref(),
            annotations.as_deref(),
            no_filter,
        )?,
        Commands::SegmentAbp { fs, input, config } => {
            cmd_segment_abp(fs, input.as_deref(), config.as_deref())?
        }
        Commands::Analyze {
            channels,
            config,
            event,
            start_s,
            end_s,
            out,
            dense,
        } => cmd_analyze(
            &channels,
            config.as_deref(),
            event.as_deref(),
            start_s,
            end_s,
            out.as_deref(),
            dense,
        )?,
        Commands::Simulate {
            out,
            duration_s,
            heart_rate_bpm,
            seed,
        } => cmd_simulate(&out, duration_s, heart_rate_bpm, seed)?,
        Commands::Replay {
            fs,
            cutoff_hz,
            length,
            input,
            interval_ms,
        } => cmd_replay(fs, cutoff_hz, length, input.as_deref(), interval_ms)?,
    }
    Ok(())
}

fn parse_channel_arg(arg: &str) -> std::result::Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got `{arg}`")),
    }
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

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
}

#[derive(Serialize)]
struct FirSummary {
    cutoff_hz: f64,
    fs: f64,
    length: usize,
    group_delay: usize,
    dc_gain: f64,
    coefficients: Vec<f64>,
}

fn cmd_design_fir(cutoff_hz: f64, fs: f64, length: usize, window: usize) -> Result<()> {
    let taps = design_highpass_fir_with_window(cutoff_hz, fs, length, window)?;
    let summary = FirSummary {
        cutoff_hz,
        fs,
        length: taps.len(),
        group_delay: taps.group_delay(),
        dc_gain: taps.dc_gain(),
        coefficients: taps.as_slice().to_vec(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_filter(fs: f64, cutoff_hz: f64, length: usize, input: Option<&Path>) -> Result<()> {
    let samples = read_samples(input)?;
    let taps = design_highpass_fir(cutoff_hz, fs, length)?;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for y in apply_fir(&samples, &taps) {
        writeln!(out, "{y}")?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct PeaksSummary {
    fs: f64,
    filtered: bool,
    peaks: Vec<PeakRecord>,
    heart_rate: Vec<HeartRateSample>,
    mean_bpm: Option<f64>,
}

fn cmd_find_peaks(
    fs: f64,
    cutoff_hz: f64,
    length: usize,
    input: Option<&Path>,
    annotations: Option<&Path>,
    no_filter: bool,
) -> Result<()> {
    let samples = read_samples(input)?;
    let signal = if no_filter {
        samples
    } else {
        let taps = design_highpass_fir(cutoff_hz, fs, length)?;
        // drop the group delay so indices refer to the input samples
        let mut filtered = apply_fir(&samples, &taps);
        filtered.drain(..taps.group_delay().min(filtered.len()));
        filtered
    };
    let series = TimeSeries { fs, data: signal };

    let analysis: HeartbeatAnalysis = match annotations {
        Some(path) => {
            let indices = text_io::read_event_indices(path)?;
            log::info!("using {} annotated beats from {}", indices.len(), path.display());
            let annotated = move |_: &[f64], _: f64| indices.clone();
            extract_peaks_and_hr(&series.data, &series.timestamps(), fs, &annotated)?
        }
        None => {
            let detector = PanTompkins::default();
            extract_peaks_and_hr(&series.data, &series.timestamps(), fs, &detector)?
        }
    };
    let summary = PeaksSummary {
        fs,
        filtered: !no_filter,
        mean_bpm: analysis.mean_bpm(),
        peaks: analysis.peaks,
        heart_rate: analysis.heart_rate,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct SegmentSummary {
    fs: f64,
    period_samples: Option<usize>,
    waves: Vec<WaveRecord>,
}

fn cmd_segment_abp(fs: f64, input: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let pressure = read_samples(input)?;
    let cfg: SegmenterConfig = match config {
        Some(path) => read_toml(path)?,
        None => SegmenterConfig::default(),
    };
    let summary = SegmentSummary {
        fs,
        period_samples: estimate_period(&pressure, fs, &cfg),
        waves: segment_waveforms_with_config(&pressure, fs, &cfg),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct AnalyzeSummary {
    window_s: [f64; 2],
    rows: usize,
    channels: Vec<String>,
    beats: usize,
    mean_bpm: Option<f64>,
    tachycardic: Vec<HeartRateSample>,
    low_amplitude_peaks: Vec<PeakRecord>,
    filter_delay_s: f64,
    heartbeat: HeartbeatAnalysis,
    waves: Vec<TimedWave>,
}

fn cmd_analyze(
    channel_args: &[(String, PathBuf)],
    config: Option<&Path>,
    event: Option<&str>,
    start_s: Option<f64>,
    end_s: Option<f64>,
    out: Option<&Path>,
    dense: bool,
) -> Result<()> {
    let config: PipelineConfig = match config {
        Some(path) => read_toml(path)?,
        None => PipelineConfig::default(),
    };
    let mut channels = Channels::new();
    for (name, path) in channel_args {
        let series = csv_io::read_channel_csv(path)
            .with_context(|| format!("loading channel {name}"))?;
        log::info!("{name}: {} samples from {}", series.len(), path.display());
        channels.insert(name.clone(), series);
    }
    let table = align(&channels);

    let (start, end) = match event {
        Some(name) => config.event_window(name).with_context(|| {
            let known: Vec<&String> = config.events.keys().collect();
            format!("unknown event `{name}` (configured: {known:?})")
        })?,
        None => (
            start_s.unwrap_or(f64::NEG_INFINITY),
            end_s.unwrap_or(f64::INFINITY),
        ),
    };
    if end <= start {
        bail!("empty analysis window [{start}, {end})");
    }
    let window = table.slice_time(start, end);
    if window.is_empty() {
        bail!("no samples inside [{start}, {end})");
    }

    let detector = PanTompkins::new(config.detector);
    let analysis = analyze(&window, &config, &detector)?;

    if let Some(path) = out {
        let file = fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        let table = if dense {
            analysis.playback_table()
        } else {
            analysis.table.clone()
        };
        csv_io::write_table_csv(io::BufWriter::new(file), &table)?;
    }

    let timestamps = window.timestamps();
    let summary = AnalyzeSummary {
        window_s: [timestamps[0], timestamps[timestamps.len() - 1]],
        rows: analysis.table.len(),
        channels: analysis.table.channel_names().map(String::from).collect(),
        beats: analysis.heartbeat.peaks.len(),
        mean_bpm: analysis.heartbeat.mean_bpm(),
        tachycardic: analysis.heartbeat.tachycardic(config.alerts.tachycardia_bpm),
        low_amplitude_peaks: analysis
            .heartbeat
            .low_amplitude_peaks(config.alerts.low_amplitude_peak),
        filter_delay_s: analysis.filter_delay_s,
        heartbeat: analysis.heartbeat,
        waves: analysis.waves,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct SimulateSummary {
    out: PathBuf,
    seed: u64,
    beats: usize,
    channels: BTreeMap<String, usize>,
}

fn cmd_simulate(out: &Path, duration_s: f64, heart_rate_bpm: f64, seed: u64) -> Result<()> {
    if !(duration_s > 0.0) || !(heart_rate_bpm > 0.0) {
        bail!("duration and heart rate must be positive");
    }
    let profile = CaseProfile {
        duration_s,
        heart_rate_bpm,
        ..CaseProfile::default()
    };
    let case = simulate_case(&profile, seed);
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let mut written = BTreeMap::new();
    for (name, series) in case.channels() {
        let path = out.join(format!("{name}.csv"));
        csv_io::write_channel_csv(&path, &series)?;
        written.insert(name, series.len());
    }
    let summary = SimulateSummary {
        out: out.to_path_buf(),
        seed,
        beats: case.beat_times.len(),
        channels: written,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_replay(
    fs: f64,
    cutoff_hz: f64,
    length: usize,
    input: Option<&Path>,
    interval_ms: u64,
) -> Result<()> {
    let series = TimeSeries {
        fs,
        data: read_samples(input)?,
    };
    let filter = StreamingFir::new(design_highpass_fir(cutoff_hz, fs, length)?);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "time,value")?;
    let pause = Duration::from_millis(interval_ms);
    for (t, y) in series
        .timestamps()
        .into_iter()
        .zip(filter.filter_iter(series.data.iter().copied()))
    {
        writeln!(out, "{t},{y}")?;
        if !pause.is_zero() {
            out.flush()?;
            thread::sleep(pause);
        }
    }
    out.flush()?;
    Ok(())
}
