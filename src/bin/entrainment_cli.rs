use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use crossbeam::channel::{unbounded, Receiver};
use spatial_entrainment::audio_io::CpalSink;
use spatial_entrainment::config::{EngineConfig, CONFIG};
use spatial_entrainment::config_store;
use spatial_entrainment::engine::{AudioEngine, PlaybackMode};
use spatial_entrainment::session::Session;

/// Play, record or inspect a spatial entrainment session
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Engine config file (defaults to $ENTRAINMENT_CONFIG or config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a session through the default output device
    Play(PlayArgs),
    /// Record a session to a WAV file
    Record(RecordArgs),
    /// Render a short block and print its levels
    Preview(PreviewArgs),
    /// Write a session document with default channels
    InitSession(OutArgs),
    /// Generate a default config file and exit
    GenerateConfig(OutArgs),
}

#[derive(ClapArgs)]
struct SessionArg {
    /// Path to the session JSON file; defaults are used when omitted
    #[arg(long)]
    session: Option<PathBuf>,
}

#[derive(ClapArgs)]
struct PlayArgs {
    #[command(flatten)]
    session: SessionArg,
    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long, value_parser = parse_seconds)]
    seconds: Option<Duration>,
}

#[derive(ClapArgs)]
struct RecordArgs {
    #[command(flatten)]
    session: SessionArg,
    /// Output WAV path, relative paths land in the configured output dir
    #[arg(long)]
    out: PathBuf,
    /// Override the session's recording duration
    #[arg(long)]
    duration: Option<f64>,
    /// Render as fast as possible instead of in real time
    #[arg(long, default_value_t = false)]
    fast: bool,
}

#[derive(ClapArgs)]
struct PreviewArgs {
    #[command(flatten)]
    session: SessionArg,
    /// Number of frames to render
    #[arg(long, default_value_t = 4410)]
    frames: usize,
}

#[derive(ClapArgs)]
struct OutArgs {
    /// Output path
    #[arg(long)]
    out: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_or_default(path),
        None => CONFIG.clone(),
    };
    match cli.command {
        Commands::Play(args) => play(config, args)?,
        Commands::Record(args) => record(config, args)?,
        Commands::Preview(args) => preview(config, args)?,
        Commands::InitSession(args) => {
            config_store::save_file(&Session::new(), &args.out)?;
            println!("Wrote default session to {}", args.out.display());
        }
        Commands::GenerateConfig(args) => {
            EngineConfig::generate_default(&args.out)?;
            println!("Generated default config at {}", args.out.display());
        }
    }
    Ok(())
}

/// Non-negative, finite seconds that fit in a `Duration`.
fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{arg}: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{arg}: {e}"))
}

fn load_session(arg: &SessionArg) -> Result<Session, Box<dyn std::error::Error>> {
    let Some(path) = &arg.session else {
        return Ok(Session::new());
    };
    let loaded = config_store::load_file(path)?;
    for issue in &loaded.issues {
        eprintln!("warning: {issue}");
    }
    Ok(loaded.session)
}

fn interrupt_channel() -> Result<Receiver<()>, Box<dyn std::error::Error>> {
    let (tx, rx) = unbounded();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    Ok(rx)
}

fn play(config: EngineConfig, args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = load_session(&args.session)?;
    let sink = CpalSink::new(config.live_block_frames);
    let mut engine = AudioEngine::new(config, session, Box::new(sink));
    let stop = interrupt_channel()?;

    if engine.start_playback()? == PlaybackMode::VisualOnly {
        eprintln!("warning: no audio device, playing silently");
    }
    match args.seconds {
        Some(limit) => {
            println!(
                "Playing for {:.1}s... press Ctrl+C to stop early",
                limit.as_secs_f64()
            );
            let _ = stop.recv_timeout(limit);
        }
        None => {
            println!("Playing... press Ctrl+C to stop");
            let _ = stop.recv();
        }
    }
    engine.stop_playback()?;
    if engine.take_clip_warning() {
        eprintln!("warning: output clipped");
    }
    Ok(())
}

fn record(mut config: EngineConfig, args: RecordArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.fast {
        config.realtime_recording = false;
    }
    let session = load_session(&args.session)?;
    let duration = args.duration.unwrap_or(session.recording_duration());
    let sink = CpalSink::new(config.live_block_frames);
    let mut engine = AudioEngine::new(config, session, Box::new(sink));
    let stop = interrupt_channel()?;

    let start = std::time::Instant::now();
    engine.start_recording(duration, &args.out)?;
    let summary = loop {
        if let Some(result) = engine.poll_recording() {
            break result?;
        }
        match stop.recv_timeout(Duration::from_millis(500)) {
            Ok(()) => break engine.stop_recording()?,
            Err(_) => {
                let pct = engine.recording_progress().unwrap_or(1.0) * 100.0;
                eprint!("\rRecording... {pct:5.1}%");
            }
        }
    };
    eprintln!();
    println!(
        "Wrote {:.2}s ({} frames) to {} in {:.2}s",
        summary.duration,
        summary.frames_written,
        summary.path.display(),
        start.elapsed().as_secs_f32()
    );
    if engine.take_clip_warning() {
        eprintln!("warning: recording clipped");
    }
    Ok(())
}

fn preview(config: EngineConfig, args: PreviewArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = load_session(&args.session)?;
    let sink = CpalSink::new(config.live_block_frames);
    let engine = AudioEngine::new(config, session, Box::new(sink));
    let block = engine.preview(args.frames);

    let (mut peak_l, mut peak_r, mut sum_l, mut sum_r) = (0.0f32, 0.0f32, 0.0f64, 0.0f64);
    for frame in block.chunks_exact(2) {
        peak_l = peak_l.max(frame[0].abs());
        peak_r = peak_r.max(frame[1].abs());
        sum_l += (frame[0] as f64).powi(2);
        sum_r += (frame[1] as f64).powi(2);
    }
    let n = args.frames.max(1) as f64;
    println!("frames: {}", args.frames);
    println!("left:  peak {:.4}  rms {:.4}", peak_l, (sum_l / n).sqrt());
    println!("right: peak {:.4}  rms {:.4}", peak_r, (sum_r / n).sqrt());
    if engine.take_clip_warning() {
        println!("clipped: yes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_must_fit_a_duration() {
        assert_eq!(parse_seconds("2.5"), Ok(Duration::from_millis(2500)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));
        for bad in ["inf", "NaN", "-1", "1e300", "soon"] {
            assert!(parse_seconds(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn play_rejects_an_unbounded_limit() {
        assert!(Cli::try_parse_from(["entrainment_cli", "play", "--seconds", "inf"]).is_err());
        let cli = Cli::try_parse_from(["entrainment_cli", "play", "--seconds", "1.5"]).unwrap();
        match cli.command {
            Commands::Play(args) => assert_eq!(args.seconds, Some(Duration::from_millis(1500))),
            _ => panic!("expected play"),
        }
    }
}
