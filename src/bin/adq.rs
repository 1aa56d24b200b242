use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use ad_volume_reducer::actuator::{MemorySink, PlaybackSink};
use ad_volume_reducer::analysis::classifier::LinearModelParams;
use ad_volume_reducer::analysis::{AnalysisWindow, FeatureExtractor, WindowBuilder};
use ad_volume_reducer::clock::ManualTimeSource;
use ad_volume_reducer::protocol::settings::ClassifierParams;
use ad_volume_reducer::protocol::{
    ContextId, Endpoint, Envelope, Message, SettingsRecord, StateSnapshot,
};
use ad_volume_reducer::telemetry::{self, MetricEvent};
use ad_volume_reducer::{AppConfig, Detector, ReplayTap};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "adq",
    about = "Offline harness for the ad volume reducer pipeline"
)]
struct Cli {
    /// Log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one JSON feature vector per sampling window
    Features {
        #[arg(long)]
        wav: PathBuf,
        /// Milliseconds between windows
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Run the full detector pipeline against a recording and print its decisions
    Replay {
        #[arg(long)]
        wav: PathBuf,
        /// Logistic-regression export; the rule heuristic is used without it
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long, default_value_t = 50)]
        sensitivity: u8,
        /// Runtime configuration (sampling, smoothing, fades)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Start from a volume other than 100
        #[arg(long, default_value_t = 100.0)]
        initial_volume: f32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Features { wav, interval_ms } => run_features(&wav, interval_ms),
        Commands::Replay {
            wav,
            model,
            sensitivity,
            config,
            initial_volume,
        } => run_replay(&wav, model, sensitivity, config, initial_volume),
    }
}

fn run_features(wav: &Path, interval_ms: u64) -> Result<ExitCode> {
    let windows = load_windows(wav, interval_ms)?;
    let extractor = FeatureExtractor::new();

    let mut previous = None;
    for window in &windows {
        let features = extractor.extract(window, previous.as_ref());
        println!("{}", serde_json::to_string(&features)?);
        previous = Some(features);
    }
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ReplayEvent {
    Status { t_ms: u64, status: String },
    Volume { t_ms: u64, volume: f32 },
    Summary {
        windows: usize,
        status_changes: usize,
        final_volume: f32,
        telemetry: TelemetrySummary,
    },
}

#[derive(Serialize)]
struct TelemetrySummary {
    total_events: u64,
    error_events: u64,
    avg_cycle_ms: Option<f32>,
    max_cycle_ms: Option<f32>,
}

impl TelemetrySummary {
    fn collect() -> Self {
        let snapshot = telemetry::hub().snapshot();
        let latency = snapshot.recent.iter().rev().find_map(|event| match event {
            MetricEvent::Latency { avg_ms, max_ms, .. } => Some((*avg_ms, *max_ms)),
            _ => None,
        });
        Self {
            total_events: snapshot.total_events,
            error_events: snapshot.error_events,
            avg_cycle_ms: latency.map(|(avg, _)| avg),
            max_cycle_ms: latency.map(|(_, max)| max),
        }
    }
}

fn state_snapshot(settings: &SettingsRecord) -> Envelope {
    Envelope::new(
        ContextId::coordinator(),
        Message::StateSnapshot(StateSnapshot {
            settings: settings.clone(),
            statuses: Vec::new(),
        }),
    )
}

fn run_replay(
    wav: &Path,
    model: Option<PathBuf>,
    sensitivity: u8,
    config_path: Option<PathBuf>,
    initial_volume: f32,
) -> Result<ExitCode> {
    let config = config_path
        .map(AppConfig::load_from_file)
        .unwrap_or_default();
    let interval = config.detector.sample_interval();
    let windows = load_windows(wav, config.detector.sample_interval_ms)?;
    let window_count = windows.len();

    let mut settings = SettingsRecord::default();
    settings.classifier.sensitivity = sensitivity;
    if let Some(path) = model {
        let params = LinearModelParams::load_from_file(&path)
            .with_context(|| format!("loading model {}", path.display()))?;
        settings.classifier.params = ClassifierParams::LogisticRegression(params);
    }
    let settings = settings.normalized();

    let clock = Arc::new(ManualTimeSource::new());
    let (coordinator, mut coordinator_rx) =
        Endpoint::channel(ContextId::coordinator(), config.protocol.inbox_capacity);
    let mut detector = Detector::new(
        ContextId::new("replay"),
        &config,
        coordinator,
        Box::new(ReplayTap::new(windows)),
        clock.clone(),
    );
    let sink = Arc::new(MemorySink::new(initial_volume.clamp(0.0, 100.0) / 100.0));
    detector.actuator_mut().attach_sink(sink.clone());

    detector.handle(state_snapshot(&settings));

    let fade_tick = detector.fade_tick();
    let mut status_changes = 0;
    let mut elapsed = Duration::ZERO;
    let mut last_volume = sink.volume();

    for _ in 0..window_count {
        clock.advance(interval);
        elapsed += interval;
        detector.on_sample_tick();

        while let Ok(envelope) = coordinator_rx.try_recv() {
            match envelope.message {
                Message::StatusChanged(report) => {
                    status_changes += 1;
                    emit(&ReplayEvent::Status {
                        t_ms: elapsed.as_millis() as u64,
                        status: format!("{:?}", report.status).to_lowercase(),
                    })?;
                }
                // Periodic re-query; answer as the coordinator would
                Message::QueryState => detector.handle(state_snapshot(&settings)),
                _ => {}
            }
        }

        // Fades finish well inside one sampling interval
        let mut fade_elapsed = Duration::ZERO;
        while detector.is_fading() && fade_elapsed < interval {
            clock.advance(fade_tick);
            fade_elapsed += fade_tick;
            detector.tick_fade();
        }

        let volume = sink.volume();
        if (volume - last_volume).abs() > f32::EPSILON {
            last_volume = volume;
            emit(&ReplayEvent::Volume {
                t_ms: elapsed.as_millis() as u64,
                volume: volume * 100.0,
            })?;
        }
    }

    emit(&ReplayEvent::Summary {
        windows: window_count,
        status_changes,
        final_volume: sink.volume() * 100.0,
        telemetry: TelemetrySummary::collect(),
    })?;
    Ok(ExitCode::from(0))
}

fn emit(event: &ReplayEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

/// One analysis window per `interval_ms` of audio
fn load_windows(wav: &Path, interval_ms: u64) -> Result<Vec<AnalysisWindow>> {
    let (pcm, sample_rate) = read_wav(wav)?;
    let builder = WindowBuilder::new();
    let hop = ((sample_rate as u64 * interval_ms.max(1)) / 1000).max(1) as usize;

    let mut windows = Vec::new();
    let mut start = 0;
    while start + builder.frame_len() <= pcm.len() {
        let timestamp_ms = (start as u64 * 1000) / sample_rate as u64;
        windows.push(builder.from_pcm(&pcm[start..], timestamp_ms));
        start += hop;
    }

    tracing::info!(
        "[Replay] {} windows from {} ({} Hz)",
        windows.len(),
        wav.display(),
        sample_rate
    );
    Ok(windows)
}

/// Read a WAV file as mono f32, averaging channels
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            match spec.bits_per_sample {
                8 | 16 | 24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / max).map_err(|err| anyhow!(err)))
                    .collect::<Result<Vec<f32>>>()?,
                other => {
                    return Err(anyhow!(
                        "Unsupported bits per sample {} in {}",
                        other,
                        path.display()
                    ))
                }
            }
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}
