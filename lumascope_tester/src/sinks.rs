// Sinks that turn pipeline output into files on disk, so a run can be inspected
// after the fact. Only every Nth presented tick is written to keep the disk quiet
// at 30/60 Hz.

use std::path::{Path, PathBuf};

use anyhow::Context;
use image::{ImageEncoder, RgbaImage};

use lumascope::core_modules::Frame;
use lumascope::core_modules::diff_tracker::{DetectionResult, Overlay};
use lumascope::core_modules::xy_renderer::XyPath;
use lumascope::sources::memory::LogFrameSink;
use lumascope::sources::{FrameSink, XySink};

/// Encodes an RGBA image as PNG.
pub fn save_png(path: &Path, image: &RgbaImage) -> anyhow::Result<()> {
    let output = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let encoder = image::codecs::png::PngEncoder::new(std::io::BufWriter::new(output));
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| format!("encoding {}", path.display()))?;
    Ok(())
}

fn snapshot_due(presented: u64, every: u64) -> bool {
    every > 0 && presented % every == 0
}

/// Writes `frame_NNNNNN.png` and `overlay_NNNNNN.png` every `every` ticks, and
/// logs the status line of every tick.
pub struct PngFrameSink {
    dir: PathBuf,
    every: u64,
    presented: u64,
    log: LogFrameSink,
}

impl PngFrameSink {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self {
            dir,
            every,
            presented: 0,
            log: LogFrameSink::default(),
        })
    }
}

impl FrameSink for PngFrameSink {
    fn present(
        &mut self,
        annotated: &Frame,
        overlay: &Overlay,
        result: &DetectionResult,
    ) -> anyhow::Result<()> {
        self.log.present(annotated, overlay, result)?;
        let n = self.presented;
        self.presented += 1;
        if !snapshot_due(n, self.every) {
            return Ok(());
        }
        save_png(&self.dir.join(format!("frame_{n:06}.png")), annotated)?;
        save_png(&self.dir.join(format!("overlay_{n:06}.png")), overlay)
    }
}

/// Writes `xy_NNNNNN.png` every `every` ticks.
pub struct PngXySink {
    dir: PathBuf,
    every: u64,
    presented: u64,
}

impl PngXySink {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self {
            dir,
            every,
            presented: 0,
        })
    }
}

impl XySink for PngXySink {
    fn present(&mut self, surface: &RgbaImage, _path: &XyPath) -> anyhow::Result<()> {
        let n = self.presented;
        self.presented += 1;
        if !snapshot_due(n, self.every) {
            return Ok(());
        }
        save_png(&self.dir.join(format!("xy_{n:06}.png")), surface)
    }
}

/// Logs the extent of each trace at debug level.
#[derive(Debug, Default)]
pub struct LogXySink;

impl XySink for LogXySink {
    fn present(&mut self, _surface: &RgbaImage, path: &XyPath) -> anyhow::Result<()> {
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        for point in path {
            min_x = min_x.min(point.x);
            max_x = max_x.max(point.x);
        }
        tracing::debug!(points = path.len(), min_x, max_x, "xy trace");
        Ok(())
    }
}
