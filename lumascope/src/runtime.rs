// THEORY:
// The `runtime` module turns the per-tick pipelines into long-running services.
// Each started pipeline gets exactly one tokio task, and that task is the only
// owner of the pipeline's state, its source and its sink. Nothing is shared and
// nothing is locked.
//
// Key architectural principles:
// 1.  **Ticks are serialized by the trigger**: a task waits on its `Ticker`, runs a
//     whole synchronous tick, then waits again. A tick can never overlap the next.
//     If a tick overruns, the missed ticks are skipped, not queued.
// 2.  **Stop between ticks**: the stop signal is a `watch` channel raced against
//     the ticker with a biased `select!`. It is only observed while the task is
//     waiting, so a tick in progress always finishes.
// 3.  **Live knobs**: `VideoConfig` / `AudioConfig` updates travel over their own
//     `watch` channels. The task picks up the latest value right before a tick, so
//     a change is effective from the next tick and intermediate values coalesce.
// 4.  **Independent pipelines**: video and audio run on separate tasks with
//     separate tickers and share no state.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::{AudioConfig, AudioSettings, VideoConfig, VideoSettings, period_from_hz};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{AudioPipeline, TickOutcome, VideoPipeline};
use crate::sources::{
    AudioSource, AudioStrategy, Capability, FrameSink, FrameSource, FrameStrategy, XySink,
    acquire_audio_source, acquire_frame_source,
};

/// A fixed-rate trigger. Each subscriber gets its own independent `Ticker`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSource {
    period: Duration,
}

impl TickSource {
    pub fn new(period: Duration) -> PipelineResult<Self> {
        if period.is_zero() {
            return Err(PipelineError::Config("tick period must be non-zero".into()));
        }
        Ok(Self { period })
    }

    pub fn from_hz(hz: f64) -> PipelineResult<Self> {
        Self::new(period_from_hz("tick rate", hz)?)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Must be called from within a tokio runtime. Dropping the `Ticker` is the
    /// unsubscribe.
    pub fn subscribe(&self) -> Ticker {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Ticker { interval }
    }
}

/// One subscription to a `TickSource`. The first tick fires immediately.
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// Counters returned when a pipeline task stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub processed: u64,
    pub skipped: u64,
    /// Video only: processed ticks that reported a centroid.
    pub detections: u64,
}

impl TickStats {
    fn record<R>(&mut self, outcome: &TickOutcome<R>, detected: impl FnOnce(&R) -> bool) {
        match outcome {
            TickOutcome::Processed(r) => {
                self.processed += 1;
                if detected(r) {
                    self.detections += 1;
                }
            }
            TickOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// The running task of one pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: JoinHandle<TickStats>,
}

impl PipelineHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the task and waits for the current tick (if any) to complete.
    ///
    /// Fails with `TaskFailed` if the task panicked, so a crash is never mistaken
    /// for a pipeline that simply ran no ticks.
    pub async fn stop(self) -> PipelineResult<TickStats> {
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(stats) => {
                tracing::info!(
                    pipeline = self.name,
                    processed = stats.processed,
                    skipped = stats.skipped,
                    detections = stats.detections,
                    "pipeline stopped"
                );
                Ok(stats)
            }
            Err(err) => {
                tracing::error!(pipeline = self.name, error = %err, "pipeline task failed");
                Err(PipelineError::TaskFailed {
                    pipeline: self.name,
                    reason: err.to_string(),
                })
            }
        }
    }
}

/// Waits for the next tick. Returns `false` once a stop has been requested.
async fn next_tick(ticker: &mut Ticker, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        // A dropped sender also means stop.
        changed = stop.changed() => changed.is_ok() && !*stop.borrow(),
        _ = ticker.tick() => true,
    }
}

fn latest<T: Copy>(rx: &mut watch::Receiver<T>) -> Option<T> {
    match rx.has_changed() {
        Ok(true) => Some(*rx.borrow_and_update()),
        _ => None,
    }
}

async fn run_video(
    mut pipeline: VideoPipeline,
    mut source: Box<dyn FrameSource>,
    mut sink: Box<dyn FrameSink>,
    ticks: TickSource,
    mut config: watch::Receiver<VideoConfig>,
    mut stop: watch::Receiver<bool>,
) -> TickStats {
    let mut ticker = ticks.subscribe();
    let mut stats = TickStats::default();

    while next_tick(&mut ticker, &mut stop).await {
        if let Some(update) = latest(&mut config) {
            tracing::debug!(?update, "video config updated");
            pipeline.set_config(update);
        }
        let outcome = pipeline.tick(source.as_mut(), sink.as_mut());
        stats.record(&outcome, |result| result.is_motion());
    }
    stats
}

async fn run_audio(
    mut pipeline: AudioPipeline,
    mut source: Box<dyn AudioSource>,
    mut sink: Box<dyn XySink>,
    ticks: TickSource,
    mut config: watch::Receiver<AudioConfig>,
    mut stop: watch::Receiver<bool>,
) -> TickStats {
    let mut ticker = ticks.subscribe();
    let mut stats = TickStats::default();

    while next_tick(&mut ticker, &mut stop).await {
        if let Some(update) = latest(&mut config) {
            tracing::debug!(?update, "audio config updated");
            pipeline.set_config(update);
        }
        let outcome = pipeline.tick(source.as_mut(), sink.as_mut());
        stats.record(&outcome, |_| false);
    }
    stats
}

struct Running<C> {
    handle: PipelineHandle,
    config: watch::Sender<C>,
}

/// Owns the lifecycle of both pipelines.
///
/// `start_*` must be called from within a tokio runtime.
pub struct PipelineController {
    video: Option<Running<VideoConfig>>,
    audio: Option<Running<AudioConfig>>,
    video_config: VideoConfig,
    audio_config: AudioConfig,
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineController {
    pub fn new() -> Self {
        Self {
            video: None,
            audio: None,
            video_config: VideoConfig::default(),
            audio_config: AudioConfig::default(),
        }
    }

    pub fn is_video_running(&self) -> bool {
        self.video.is_some()
    }

    pub fn is_audio_running(&self) -> bool {
        self.audio.is_some()
    }

    pub fn video_config(&self) -> VideoConfig {
        self.video_config
    }

    pub fn audio_config(&self) -> AudioConfig {
        self.audio_config
    }

    /// Acquires a frame source and starts ticking at `settings.tick_hz`.
    ///
    /// Fails with `SourceUnavailable` if every strategy fails. A missing auxiliary
    /// light only degrades.
    pub fn start_video(
        &mut self,
        settings: &VideoSettings,
        config: VideoConfig,
        strategies: Vec<FrameStrategy>,
        sink: Box<dyn FrameSink>,
    ) -> PipelineResult<()> {
        if self.video.is_some() {
            return Err(PipelineError::AlreadyRunning("video"));
        }
        let ticks = TickSource::new(settings.tick_period()?)?;
        let mut source = acquire_frame_source(strategies)?;

        if source.dimensions() != (settings.width, settings.height) {
            tracing::warn!(
                source = source.name(),
                source_size = ?source.dimensions(),
                expected = ?(settings.width, settings.height),
                "source geometry differs; its frames will be rejected"
            );
        }
        if settings.auxiliary_light {
            if let Err(err) = source.enable_capability(Capability::AuxiliaryLight) {
                tracing::warn!(source = source.name(), error = %err, "continuing without auxiliary light");
            }
        }

        let pipeline = VideoPipeline::new(settings, config);
        let (config_tx, config_rx) = watch::channel(config);
        let (stop_tx, stop_rx) = watch::channel(false);

        tracing::info!(
            source = source.name(),
            width = settings.width,
            height = settings.height,
            tick_hz = settings.tick_hz,
            "video pipeline started"
        );
        let task = tokio::spawn(run_video(pipeline, source, sink, ticks, config_rx, stop_rx));

        self.video_config = config;
        self.video = Some(Running {
            handle: PipelineHandle {
                name: "video",
                stop: stop_tx,
                task,
            },
            config: config_tx,
        });
        Ok(())
    }

    /// Acquires an audio source and starts ticking at `settings.tick_hz`. The
    /// filter is designed for the rate the source reports.
    pub fn start_audio(
        &mut self,
        settings: &AudioSettings,
        config: AudioConfig,
        strategies: Vec<AudioStrategy>,
        sink: Box<dyn XySink>,
    ) -> PipelineResult<()> {
        if self.audio.is_some() {
            return Err(PipelineError::AlreadyRunning("audio"));
        }
        config.validate()?;
        let ticks = TickSource::new(settings.tick_period()?)?;
        let source = acquire_audio_source(strategies)?;

        let sample_rate = source.sample_rate();
        if sample_rate != settings.sample_rate {
            tracing::debug!(
                requested = settings.sample_rate,
                actual = sample_rate,
                "audio source runs at its own sample rate"
            );
        }

        let pipeline = AudioPipeline::new(settings, sample_rate, config);
        let (config_tx, config_rx) = watch::channel(config);
        let (stop_tx, stop_rx) = watch::channel(false);

        tracing::info!(
            source = source.name(),
            sample_rate,
            window = settings.window_size,
            tick_hz = settings.tick_hz,
            "audio pipeline started"
        );
        let task = tokio::spawn(run_audio(pipeline, source, sink, ticks, config_rx, stop_rx));

        self.audio_config = config;
        self.audio = Some(Running {
            handle: PipelineHandle {
                name: "audio",
                stop: stop_tx,
                task,
            },
            config: config_tx,
        });
        Ok(())
    }

    /// Replaces the video knobs; effective from the next tick if running, and
    /// used as the default for the next start otherwise.
    pub fn update_video(&mut self, config: VideoConfig) {
        self.video_config = config;
        if let Some(running) = &self.video {
            let _ = running.config.send(config);
        }
    }

    /// Replaces the audio knobs. Both filter channels are retuned together.
    pub fn update_audio(&mut self, config: AudioConfig) -> PipelineResult<()> {
        config.validate()?;
        self.audio_config = config;
        if let Some(running) = &self.audio {
            let _ = running.config.send(config);
        }
        Ok(())
    }

    /// `None` if the video pipeline was not running.
    pub async fn stop_video(&mut self) -> Option<PipelineResult<TickStats>> {
        match self.video.take() {
            Some(running) => Some(running.handle.stop().await),
            None => None,
        }
    }

    /// The sink keeps the last surface it was given; nothing is cleared.
    pub async fn stop_audio(&mut self) -> Option<PipelineResult<TickStats>> {
        match self.audio.take() {
            Some(running) => Some(running.handle.stop().await),
            None => None,
        }
    }

    /// Stops both pipelines concurrently. Returns `(video, audio)` stats.
    pub async fn stop_all(
        &mut self,
    ) -> (
        Option<PipelineResult<TickStats>>,
        Option<PipelineResult<TickStats>>,
    ) {
        let video = self.video.take();
        let audio = self.audio.take();
        futures::future::join(
            async move {
                match video {
                    Some(running) => Some(running.handle.stop().await),
                    None => None,
                }
            },
            async move {
                match audio {
                    Some(running) => Some(running.handle.stop().await),
                    None => None,
                }
            },
        )
        .await
    }
}
