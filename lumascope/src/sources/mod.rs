// THEORY:
// The `sources` module is the boundary between the real-time core and everything
// that touches hardware or the outside world. The core only ever talks to the four
// collaborator traits defined here:
//
// - `FrameSource` hands out RGBA frames of a fixed size.
// - `AudioSource` hands out whatever stereo frames arrived since the last drain.
// - `FrameSink` receives the annotated frame, the overlay, and the detection result.
// - `XySink` receives the rendered oscilloscope surface and its path.
//
// Implementations report failures with `anyhow`, because each backend has its own
// error zoo. The pipeline maps those into `PipelineError` at the boundary.
//
// Device selection is not a heuristic buried in a source. Callers build an ordered
// list of `AcquisitionStrategy` values ("the configured camera", "any camera",
// "the synthetic stub") and `acquire` tries them in order until one succeeds.

use image::RgbaImage;

use crate::core_modules::Frame;
use crate::core_modules::diff_tracker::{DetectionResult, Overlay};
use crate::core_modules::waveform::StereoFrame;
use crate::core_modules::xy_renderer::XyPath;
use crate::error::{PipelineError, PipelineResult};

pub mod image_sequence;
#[cfg(feature = "live-audio")]
pub mod live_audio;
pub mod memory;
pub mod synthetic;

/// Whether a source can produce data on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Ready,
    /// Temporarily has nothing to give (paused, buffering). Ticks are skipped.
    Stalled,
    /// Will never produce again. Ticks are skipped until the pipeline is stopped.
    Ended,
}

/// Optional hardware features a source may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// A torch or fill light next to the camera.
    AuxiliaryLight,
}

pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Width and height of every frame this source produces.
    fn dimensions(&self) -> (u32, u32);

    fn status(&self) -> SourceStatus;

    fn next_frame(&mut self) -> anyhow::Result<Frame>;

    /// Turns on an optional feature. The default is "not supported".
    fn enable_capability(&mut self, capability: Capability) -> PipelineResult<()> {
        Err(PipelineError::UnsupportedCapability(capability))
    }
}

pub trait AudioSource: Send {
    fn name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    fn status(&self) -> SourceStatus;

    /// Appends every frame received since the previous drain to `out`.
    fn drain(&mut self, out: &mut Vec<StereoFrame>) -> anyhow::Result<()>;
}

pub trait FrameSink: Send {
    fn present(
        &mut self,
        annotated: &Frame,
        overlay: &Overlay,
        result: &DetectionResult,
    ) -> anyhow::Result<()>;
}

pub trait XySink: Send {
    fn present(&mut self, surface: &RgbaImage, path: &XyPath) -> anyhow::Result<()>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }
    fn status(&self) -> SourceStatus {
        (**self).status()
    }
    fn next_frame(&mut self) -> anyhow::Result<Frame> {
        (**self).next_frame()
    }
    fn enable_capability(&mut self, capability: Capability) -> PipelineResult<()> {
        (**self).enable_capability(capability)
    }
}

impl<T: AudioSource + ?Sized> AudioSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
    fn status(&self) -> SourceStatus {
        (**self).status()
    }
    fn drain(&mut self, out: &mut Vec<StereoFrame>) -> anyhow::Result<()> {
        (**self).drain(out)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn present(
        &mut self,
        annotated: &Frame,
        overlay: &Overlay,
        result: &DetectionResult,
    ) -> anyhow::Result<()> {
        (**self).present(annotated, overlay, result)
    }
}

impl<T: XySink + ?Sized> XySink for Box<T> {
    fn present(&mut self, surface: &RgbaImage, path: &XyPath) -> anyhow::Result<()> {
        (**self).present(surface, path)
    }
}

type Opener<S> = Box<dyn FnOnce() -> anyhow::Result<Box<S>> + Send>;

/// One way of obtaining a source, tried at most once.
pub struct AcquisitionStrategy<S: ?Sized> {
    label: String,
    open: Opener<S>,
}

pub type FrameStrategy = AcquisitionStrategy<dyn FrameSource>;
pub type AudioStrategy = AcquisitionStrategy<dyn AudioSource>;

impl<S: ?Sized> AcquisitionStrategy<S> {
    pub fn new<F>(label: impl Into<String>, open: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Box<S>> + Send + 'static,
    {
        Self {
            label: label.into(),
            open: Box::new(open),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<S: ?Sized> std::fmt::Debug for AcquisitionStrategy<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionStrategy")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Tries each strategy in order; the first success wins.
pub fn acquire<S: ?Sized>(strategies: Vec<AcquisitionStrategy<S>>) -> PipelineResult<Box<S>> {
    if strategies.is_empty() {
        return Err(PipelineError::SourceUnavailable(
            "no acquisition strategies configured".into(),
        ));
    }

    let mut failures = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        match (strategy.open)() {
            Ok(source) => {
                tracing::info!(strategy = %strategy.label, "source acquired");
                return Ok(source);
            }
            Err(err) => {
                tracing::warn!(strategy = %strategy.label, error = %err, "acquisition strategy failed");
                failures.push(format!("{}: {err}", strategy.label));
            }
        }
    }

    Err(PipelineError::SourceUnavailable(failures.join("; ")))
}

pub fn acquire_frame_source(strategies: Vec<FrameStrategy>) -> PipelineResult<Box<dyn FrameSource>> {
    acquire(strategies)
}

pub fn acquire_audio_source(strategies: Vec<AudioStrategy>) -> PipelineResult<Box<dyn AudioSource>> {
    acquire(strategies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::synthetic::SyntheticFrameSource;

    #[test]
    fn first_successful_strategy_wins() {
        let strategies: Vec<FrameStrategy> = vec![
            AcquisitionStrategy::new("broken camera", || anyhow::bail!("device busy")),
            AcquisitionStrategy::new("stub", || {
                Ok(Box::new(SyntheticFrameSource::new(32, 24)) as Box<dyn FrameSource>)
            }),
            AcquisitionStrategy::new("never tried", || panic!("must not be called")),
        ];
        let source = acquire_frame_source(strategies).expect("stub should open");
        assert_eq!(source.dimensions(), (32, 24));
    }

    #[test]
    fn exhausted_strategies_are_source_unavailable() {
        let strategies: Vec<AudioStrategy> = vec![
            AcquisitionStrategy::new("mic", || anyhow::bail!("permission denied")),
            AcquisitionStrategy::new("line in", || anyhow::bail!("no such device")),
        ];
        match acquire_audio_source(strategies) {
            Err(PipelineError::SourceUnavailable(msg)) => {
                assert!(msg.contains("permission denied"));
                assert!(msg.contains("line in"));
            }
            Err(other) => panic!("expected SourceUnavailable, got {other}"),
            Ok(_) => panic!("no strategy should have succeeded"),
        }
        assert!(matches!(
            acquire_audio_source(Vec::new()),
            Err(PipelineError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn capabilities_are_unsupported_by_default() {
        struct Bare;
        impl FrameSource for Bare {
            fn name(&self) -> &str {
                "bare"
            }
            fn dimensions(&self) -> (u32, u32) {
                (1, 1)
            }
            fn status(&self) -> SourceStatus {
                SourceStatus::Ready
            }
            fn next_frame(&mut self) -> anyhow::Result<Frame> {
                Ok(Frame::new(1, 1))
            }
        }
        assert!(matches!(
            Bare.enable_capability(Capability::AuxiliaryLight),
            Err(PipelineError::UnsupportedCapability(Capability::AuxiliaryLight))
        ));
    }
}
