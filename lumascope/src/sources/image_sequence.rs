// THEORY:
// A `FrameSource` that replays a directory of still images. Files are taken in
// lexical order, decoded with the `image` crate and resized to the pipeline's
// fixed geometry, so a recorded scene can be pushed through the tracker without a
// camera attached.

use std::path::{Path, PathBuf};

use anyhow::Context;
use image::imageops::{self, FilterType};

use super::{FrameSource, SourceStatus};
use crate::core_modules::Frame;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug)]
pub struct ImageSequenceSource {
    name: String,
    files: Vec<PathBuf>,
    width: u32,
    height: u32,
    next: usize,
    looping: bool,
}

impl ImageSequenceSource {
    /// Lists the image files in `dir`. Fails if there are none.
    pub fn open(dir: impl AsRef<Path>, width: u32, height: u32) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        files.sort();

        anyhow::ensure!(!files.is_empty(), "no PNG or JPEG files in {}", dir.display());
        tracing::debug!(dir = %dir.display(), frames = files.len(), "image sequence opened");

        Ok(Self {
            name: format!("image sequence {}", dir.display()),
            files,
            width,
            height,
            next: 0,
            looping: false,
        })
    }

    /// Start over from the first file instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn status(&self) -> SourceStatus {
        if self.next < self.files.len() || self.looping {
            SourceStatus::Ready
        } else {
            SourceStatus::Ended
        }
    }

    fn next_frame(&mut self) -> anyhow::Result<Frame> {
        if self.next >= self.files.len() {
            anyhow::ensure!(self.looping, "image sequence exhausted");
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;

        let frame = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .into_rgba8();
        if frame.dimensions() == (self.width, self.height) {
            Ok(frame)
        } else {
            Ok(imageops::resize(&frame, self.width, self.height, FilterType::Triangle))
        }
    }
}
