// THEORY:
// The `pipeline` module is the per-tick API of the engine. It wires the numeric
// core into two state structs, one per pipeline, each owning everything that must
// survive from one tick to the next and nothing else:
//
// - `VideoPipeline` owns the classifier, the temporal tracker (and through it the
//   previous mask) and the live `VideoConfig`.
// - `AudioPipeline` owns the stereo bandpass state, the waveform ring, the
//   renderer and the drawing surface.
//
// A `tick` is one synchronous unit of work: ask the source for data, run the core,
// hand the results to the sink. It never blocks and never panics on bad input.
// Anything that goes wrong at the I/O boundary turns the tick into a logged
// `Skipped` outcome instead of an error, so a flaky camera degrades the output
// rather than killing the loop. Scheduling lives in `runtime`.

use image::RgbaImage;

use crate::config::{AudioConfig, AudioSettings, VideoConfig, VideoSettings};
use crate::core_modules::Frame;
use crate::core_modules::bandpass::{BandpassParams, DualChannelBandpass};
use crate::core_modules::bright_mask::{BrightMask, BrightnessClassifier};
use crate::core_modules::diff_tracker::{DetectionResult, Overlay, TemporalDiffTracker};
use crate::core_modules::marker;
use crate::core_modules::waveform::{StereoFrame, WaveformSampler};
use crate::core_modules::xy_renderer::{XyPath, XyRenderer, blank_surface};
use crate::error::{PipelineError, PipelineResult};
use crate::sources::{AudioSource, FrameSink, FrameSource, SourceStatus, XySink};

/// Why a tick did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SourceStalled,
    SourceEnded,
    /// The source reported an error for this tick.
    SourceFault,
    DimensionMismatch,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome<R> {
    Processed(R),
    Skipped(SkipReason),
}

impl<R> TickOutcome<R> {
    pub fn is_processed(&self) -> bool {
        matches!(self, TickOutcome::Processed(_))
    }

    pub fn processed(self) -> Option<R> {
        match self {
            TickOutcome::Processed(r) => Some(r),
            TickOutcome::Skipped(_) => None,
        }
    }
}

/// Everything the video core produces for one frame.
#[derive(Debug, Clone)]
pub struct VideoAnalysis {
    pub result: DetectionResult,
    /// The input frame with the centroid marker drawn, if any.
    pub annotated: Frame,
    pub overlay: Overlay,
}

/// Brightness classification, temporal diff and centroid for a fixed-size stream.
#[derive(Debug)]
pub struct VideoPipeline {
    width: u32,
    height: u32,
    classifier: BrightnessClassifier,
    tracker: TemporalDiffTracker,
    config: VideoConfig,
}

impl VideoPipeline {
    pub fn new(settings: &VideoSettings, config: VideoConfig) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            classifier: BrightnessClassifier::new(config.brightness_threshold),
            tracker: TemporalDiffTracker::new(),
            config,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn config(&self) -> VideoConfig {
        self.config
    }

    /// Takes effect from the next processed frame.
    pub fn set_config(&mut self, config: VideoConfig) {
        self.classifier.set_threshold(config.brightness_threshold);
        self.config = config;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    /// The mask of the last processed frame.
    pub fn last_mask(&self) -> Option<&BrightMask> {
        self.tracker.previous_mask()
    }

    /// Runs the core on one frame. Only fails on a frame of the wrong size, in
    /// which case the tracker is left untouched.
    pub fn process_frame(&mut self, frame: &Frame) -> PipelineResult<VideoAnalysis> {
        let (actual_width, actual_height) = frame.dimensions();
        if (actual_width, actual_height) != (self.width, self.height) {
            return Err(PipelineError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width,
                actual_height,
            });
        }

        let mask = self.classifier.classify(frame);
        let (result, overlay) = self.tracker.update(mask, &self.config);
        let annotated = marker::annotate(frame, &result);

        Ok(VideoAnalysis {
            result,
            annotated,
            overlay,
        })
    }

    /// Pulls one frame from `source`, analyses it and presents it to `sink`.
    pub fn tick<S, K>(&mut self, source: &mut S, sink: &mut K) -> TickOutcome<DetectionResult>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        match source.status() {
            SourceStatus::Ready => {}
            SourceStatus::Stalled => {
                tracing::debug!(source = source.name(), "{}", PipelineError::SourceStalled);
                return TickOutcome::Skipped(SkipReason::SourceStalled);
            }
            SourceStatus::Ended => {
                tracing::debug!(source = source.name(), "source ended; skipping tick");
                return TickOutcome::Skipped(SkipReason::SourceEnded);
            }
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(source = source.name(), error = %err, "frame source fault");
                return TickOutcome::Skipped(SkipReason::SourceFault);
            }
        };

        let analysis = match self.process_frame(&frame) {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!(source = source.name(), error = %err, "rejecting frame");
                return TickOutcome::Skipped(SkipReason::DimensionMismatch);
            }
        };

        if let Err(err) = sink.present(&analysis.annotated, &analysis.overlay, &analysis.result) {
            let err = PipelineError::Sink(err.to_string());
            tracing::warn!(error = %err, "frame sink failed");
        }

        TickOutcome::Processed(analysis.result)
    }
}

/// Stereo bandpass, sample window and XY rendering for one stream.
#[derive(Debug)]
pub struct AudioPipeline {
    filter: DualChannelBandpass,
    sampler: WaveformSampler,
    renderer: XyRenderer,
    config: AudioConfig,
    surface: RgbaImage,
    path: XyPath,
    scratch: Vec<StereoFrame>,
}

impl AudioPipeline {
    /// `sample_rate` is the rate the source actually delivers, which may differ
    /// from the requested one.
    pub fn new(settings: &AudioSettings, sample_rate: u32, config: AudioConfig) -> Self {
        let params = BandpassParams::from_bandwidth(config.center_frequency, config.bandwidth);
        Self {
            filter: DualChannelBandpass::new(sample_rate, params),
            sampler: WaveformSampler::new(settings.window_size),
            renderer: XyRenderer::new(config.visual_gain),
            config,
            surface: blank_surface(settings.surface_width, settings.surface_height),
            path: XyPath::new(),
            scratch: Vec::with_capacity(settings.window_size),
        }
    }

    pub fn config(&self) -> AudioConfig {
        self.config
    }

    /// Retunes both filter channels at once and updates the gain.
    pub fn set_config(&mut self, config: AudioConfig) {
        self.filter.configure(config.center_frequency, config.bandwidth);
        self.renderer.set_visual_gain(config.visual_gain);
        self.config = config;
    }

    pub fn filter_params(&self) -> BandpassParams {
        self.filter.params()
    }

    pub fn sample_rate(&self) -> u32 {
        self.filter.sample_rate()
    }

    /// Filters raw frames and appends them to the window.
    pub fn ingest(&mut self, frames: &[StereoFrame]) {
        for &frame in frames {
            let filtered = self.filter.process(frame);
            self.sampler.push(filtered);
        }
    }

    /// Repaints the surface from the current window.
    pub fn render(&mut self) -> &XyPath {
        let window = self.sampler.capture();
        self.path = self.renderer.render(&window, &mut self.surface);
        &self.path
    }

    /// The last rendered picture. Stays in place after the pipeline stops.
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn path(&self) -> &XyPath {
        &self.path
    }

    /// Drains `source`, renders, and presents to `sink`. Returns how many frames
    /// were ingested.
    pub fn tick<S, K>(&mut self, source: &mut S, sink: &mut K) -> TickOutcome<usize>
    where
        S: AudioSource + ?Sized,
        K: XySink + ?Sized,
    {
        match source.status() {
            SourceStatus::Ready => {}
            SourceStatus::Stalled => {
                tracing::debug!(source = source.name(), "{}", PipelineError::SourceStalled);
                return TickOutcome::Skipped(SkipReason::SourceStalled);
            }
            SourceStatus::Ended => {
                tracing::debug!(source = source.name(), "source ended; skipping tick");
                return TickOutcome::Skipped(SkipReason::SourceEnded);
            }
        }

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        if let Err(err) = source.drain(&mut scratch) {
            tracing::warn!(source = source.name(), error = %err, "audio source fault");
            self.scratch = scratch;
            return TickOutcome::Skipped(SkipReason::SourceFault);
        }
        self.ingest(&scratch);
        let ingested = scratch.len();
        self.scratch = scratch;

        self.render();
        if let Err(err) = sink.present(&self.surface, &self.path) {
            let err = PipelineError::Sink(err.to_string());
            tracing::warn!(error = %err, "xy sink failed");
        }

        TickOutcome::Processed(ingested)
    }
}
