// Command-line harness for the lumascope pipelines. It loads the shared config,
// applies flag overrides, starts the requested pipelines against the best source
// it can find (a frame directory, a microphone, or the synthetic stubs) and runs
// until Ctrl-C or the optional duration elapses.

mod sinks;
mod telemetry;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use lumascope::sources::image_sequence::ImageSequenceSource;
use lumascope::sources::memory::LogFrameSink;
use lumascope::sources::synthetic::{SyntheticAudioSource, SyntheticFrameSource};
use lumascope::sources::{
    AcquisitionStrategy, AudioSource, AudioStrategy, FrameSink, FrameSource, FrameStrategy, XySink,
};
use lumascope::{LumascopeConfig, PipelineController, PipelineResult, TickStats};

use sinks::{LogXySink, PngFrameSink, PngXySink};
use telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(about = "Run the lumascope video and audio pipelines", version)]
struct Cli {
    /// TOML config file (defaults to $LUMASCOPE_CONFIG, then built-in defaults).
    #[arg(long, env = "LUMASCOPE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long = "duration-secs")]
    duration_secs: Option<f64>,

    /// Write PNG snapshots here. Without it results are only logged.
    #[arg(long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Write one snapshot every N ticks.
    #[arg(long = "snapshot-every", default_value_t = 30)]
    snapshot_every: u64,

    #[command(flatten)]
    knobs: Knobs,

    #[command(subcommand)]
    command: Command,
}

/// Live knobs that override the config file.
#[derive(Debug, Args)]
struct Knobs {
    #[arg(long = "brightness-threshold")]
    brightness_threshold: Option<f64>,
    #[arg(long = "diff-threshold")]
    diff_threshold: Option<u8>,
    #[arg(long = "min-movement-pixels")]
    min_movement_pixels: Option<usize>,
    #[arg(long = "aux-light", default_value_t = false)]
    auxiliary_light: bool,
    #[arg(long = "center-frequency")]
    center_frequency: Option<f64>,
    #[arg(long)]
    bandwidth: Option<f64>,
    #[arg(long = "visual-gain")]
    visual_gain: Option<f64>,
}

impl Knobs {
    fn apply(&self, cfg: &mut LumascopeConfig) {
        if let Some(v) = self.brightness_threshold {
            cfg.video_tuning.brightness_threshold = v;
        }
        if let Some(v) = self.diff_threshold {
            cfg.video_tuning.diff_threshold = v;
        }
        if let Some(v) = self.min_movement_pixels {
            cfg.video_tuning.min_movement_pixels = v;
        }
        if self.auxiliary_light {
            cfg.video.auxiliary_light = true;
        }
        if let Some(v) = self.center_frequency {
            cfg.audio_tuning.center_frequency = v;
        }
        if let Some(v) = self.bandwidth {
            cfg.audio_tuning.bandwidth = v;
        }
        if let Some(v) = self.visual_gain {
            cfg.audio_tuning.visual_gain = v;
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Track bright moving regions.
    Video(VideoArgs),
    /// Render the filtered stereo XY trace.
    Audio(AudioArgs),
    /// Run both pipelines side by side.
    Both {
        #[command(flatten)]
        video: VideoArgs,
        #[command(flatten)]
        audio: AudioArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct VideoArgs {
    /// Replay PNG/JPEG files from this directory instead of the synthetic camera.
    #[arg(long = "frames-dir")]
    frames_dir: Option<PathBuf>,

    /// Start the frame directory over when it runs out.
    #[arg(long = "loop", default_value_t = false)]
    looping: bool,
}

#[derive(Debug, Clone, Args)]
struct AudioArgs {
    /// Capture from the default microphone (needs the `live-audio` feature).
    #[arg(long, default_value_t = false)]
    live: bool,

    /// Phase offset of the synthetic right channel, in degrees.
    #[arg(long = "phase-degrees", default_value_t = 90.0)]
    phase_degrees: f64,
}

fn frame_strategies(args: &VideoArgs, width: u32, height: u32) -> Vec<FrameStrategy> {
    let mut strategies = Vec::new();
    if let Some(dir) = args.frames_dir.clone() {
        let looping = args.looping;
        strategies.push(AcquisitionStrategy::new(
            format!("frames from {}", dir.display()),
            move || {
                let source = ImageSequenceSource::open(&dir, width, height)?.looping(looping);
                Ok(Box::new(source) as Box<dyn FrameSource>)
            },
        ));
    }
    strategies.push(AcquisitionStrategy::new("synthetic camera", move || {
        Ok(Box::new(SyntheticFrameSource::new(width, height)) as Box<dyn FrameSource>)
    }));
    strategies
}

fn audio_strategies(args: &AudioArgs, sample_rate: u32) -> Vec<AudioStrategy> {
    let mut strategies = Vec::new();
    if args.live {
        strategies.push(live_strategy());
    }
    let phase = args.phase_degrees.to_radians();
    strategies.push(AcquisitionStrategy::new("synthetic tones", move || {
        let source = SyntheticAudioSource::new(sample_rate).with_phase_offset(phase);
        Ok(Box::new(source) as Box<dyn AudioSource>)
    }));
    strategies
}

#[cfg(feature = "live-audio")]
fn live_strategy() -> AudioStrategy {
    AcquisitionStrategy::new("default microphone", || {
        let source = lumascope::sources::live_audio::LiveAudioSource::open_default()?;
        Ok(Box::new(source) as Box<dyn AudioSource>)
    })
}

#[cfg(not(feature = "live-audio"))]
fn live_strategy() -> AudioStrategy {
    AcquisitionStrategy::new("default microphone", || {
        anyhow::bail!("built without the `live-audio` feature")
    })
}

fn frame_sink(cli: &Cli) -> anyhow::Result<Box<dyn FrameSink>> {
    Ok(match &cli.output_dir {
        Some(dir) => Box::new(PngFrameSink::new(dir.join("video"), cli.snapshot_every)?),
        None => Box::new(LogFrameSink::default()),
    })
}

fn xy_sink(cli: &Cli) -> anyhow::Result<Box<dyn XySink>> {
    Ok(match &cli.output_dir {
        Some(dir) => Box::new(PngXySink::new(dir.join("audio"), cli.snapshot_every)?),
        None => Box::new(LogXySink),
    })
}

fn start_video(
    controller: &mut PipelineController,
    cfg: &LumascopeConfig,
    cli: &Cli,
    args: &VideoArgs,
) -> anyhow::Result<()> {
    let strategies = frame_strategies(args, cfg.video.width, cfg.video.height);
    controller
        .start_video(&cfg.video, cfg.video_tuning, strategies, frame_sink(cli)?)
        .context("starting video pipeline")
}

fn start_audio(
    controller: &mut PipelineController,
    cfg: &LumascopeConfig,
    cli: &Cli,
    args: &AudioArgs,
) -> anyhow::Result<()> {
    let strategies = audio_strategies(args, cfg.audio.sample_rate);
    controller
        .start_audio(&cfg.audio, cfg.audio_tuning, strategies, xy_sink(cli)?)
        .context("starting audio pipeline")
}

fn report(name: &str, stats: Option<PipelineResult<TickStats>>) -> bool {
    match stats {
        Some(Ok(stats)) => {
            println!(
                "{name}: {} ticks processed, {} skipped, {} with motion",
                stats.processed, stats.skipped, stats.detections
            );
            true
        }
        Some(Err(err)) => {
            eprintln!("{name}: {err}");
            false
        }
        None => true,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format, cli.verbose);

    let mut cfg = LumascopeConfig::load_from(cli.config.as_deref())?;
    cli.knobs.apply(&mut cfg);
    cfg.validate()?;
    tracing::debug!(?cfg, "configuration loaded");

    let mut controller = PipelineController::new();
    match &cli.command {
        Command::Video(args) => start_video(&mut controller, &cfg, &cli, args)?,
        Command::Audio(args) => start_audio(&mut controller, &cfg, &cli, args)?,
        Command::Both { video, audio } => {
            start_video(&mut controller, &cfg, &cli, video)?;
            if let Err(err) = start_audio(&mut controller, &cfg, &cli, audio) {
                controller.stop_all().await;
                return Err(err);
            }
        }
    }

    match cli.duration_secs {
        Some(secs) => {
            let limit = Duration::try_from_secs_f64(secs).context("invalid --duration-secs")?;
            tokio::select! {
                signal = tokio::signal::ctrl_c() => signal?,
                _ = tokio::time::sleep(limit) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    tracing::info!("shutting down");
    let (video, audio) = controller.stop_all().await;
    let video_ok = report("video", video);
    let audio_ok = report("audio", audio);
    if !(video_ok && audio_ok) {
        anyhow::bail!("a pipeline task failed");
    }
    Ok(())
}
