// The synchronous numeric core. Nothing in here performs I/O, allocates threads,
// or can fail: every function is total over well-formed frames and samples.

pub mod bandpass;
pub mod bright_mask;
pub mod diff_tracker;
pub mod marker;
pub mod pixel;
pub mod waveform;
pub mod xy_renderer;

/// A raw RGBA camera frame, 4 bytes per pixel, row-major.
pub type Frame = image::RgbaImage;
