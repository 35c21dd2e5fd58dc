// In-memory and log-only sinks. The recording sinks keep their history behind an
// `Arc<Mutex<_>>` so a test (or a UI thread) can read what the pipeline presented
// while the pipeline task still owns the sink.

use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbaImage;

use super::{FrameSink, XySink};
use crate::core_modules::Frame;
use crate::core_modules::diff_tracker::{DetectionResult, Overlay};
use crate::core_modules::xy_renderer::XyPath;

/// One `FrameSink::present` call.
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    pub annotated: Frame,
    pub overlay: Overlay,
    pub result: DetectionResult,
}

/// One `XySink::present` call.
#[derive(Debug, Clone)]
pub struct PresentedTrace {
    pub surface: RgbaImage,
    pub path: XyPath,
}

fn lock<T>(history: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
    history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps every presented frame. Clones share the same history.
#[derive(Debug, Clone, Default)]
pub struct RecordingFrameSink {
    history: Arc<Mutex<Vec<PresentedFrame>>>,
}

impl RecordingFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.history).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn results(&self) -> Vec<DetectionResult> {
        lock(&self.history).iter().map(|p| p.result).collect()
    }

    pub fn last(&self) -> Option<PresentedFrame> {
        lock(&self.history).last().cloned()
    }
}

impl FrameSink for RecordingFrameSink {
    fn present(
        &mut self,
        annotated: &Frame,
        overlay: &Overlay,
        result: &DetectionResult,
    ) -> anyhow::Result<()> {
        lock(&self.history).push(PresentedFrame {
            annotated: annotated.clone(),
            overlay: overlay.clone(),
            result: *result,
        });
        Ok(())
    }
}

/// Keeps every presented XY surface. Clones share the same history.
#[derive(Debug, Clone, Default)]
pub struct RecordingXySink {
    history: Arc<Mutex<Vec<PresentedTrace>>>,
}

impl RecordingXySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.history).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<PresentedTrace> {
        lock(&self.history).last().cloned()
    }
}

impl XySink for RecordingXySink {
    fn present(&mut self, surface: &RgbaImage, path: &XyPath) -> anyhow::Result<()> {
        lock(&self.history).push(PresentedTrace {
            surface: surface.clone(),
            path: path.clone(),
        });
        Ok(())
    }
}

/// Writes the status line of each detection to the log and discards the pixels.
#[derive(Debug, Clone, Default)]
pub struct LogFrameSink {
    last_was_motion: bool,
}

impl FrameSink for LogFrameSink {
    fn present(
        &mut self,
        _annotated: &Frame,
        _overlay: &Overlay,
        result: &DetectionResult,
    ) -> anyhow::Result<()> {
        // Only state changes and ongoing motion are interesting.
        if result.is_motion() {
            tracing::info!(moved = result.moved_pixel_count, "{result}");
        } else if self.last_was_motion {
            tracing::info!("{result}");
        }
        self.last_was_motion = result.is_motion();
        Ok(())
    }
}
