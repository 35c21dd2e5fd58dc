// THEORY:
// Deterministic stand-ins for a camera and a microphone. Both are always
// available, so they make a good last entry in a strategy list and are what the
// tests drive the pipelines with. Each carries a `PauseHandle` that can be
// flipped from another thread to simulate a source that stops delivering for a
// while and then comes back.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::Rgba;

use super::{AudioSource, Capability, FrameSource, SourceStatus};
use crate::core_modules::Frame;
use crate::core_modules::waveform::StereoFrame;
use crate::error::PipelineResult;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const LIT_BACKGROUND: Rgba<u8> = Rgba([40, 40, 40, 255]);
const SQUARE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Shared pause switch for a running synthetic source.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn pause(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A bright square sliding across a black frame, wrapping at the right edge.
#[derive(Debug)]
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    square: u32,
    step: u32,
    produced: u64,
    frame_limit: Option<u64>,
    light_on: bool,
    paused: PauseHandle,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            square: 16,
            step: 4,
            produced: 0,
            frame_limit: None,
            light_on: false,
            paused: PauseHandle::default(),
        }
    }

    pub fn with_square(mut self, side: u32, step: u32) -> Self {
        self.square = side;
        self.step = step;
        self
    }

    /// Report `Ended` after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.paused.clone()
    }

    pub fn light_on(&self) -> bool {
        self.light_on
    }

    /// Top-left corner of the square in frame number `n`.
    pub fn square_origin(&self, n: u64) -> (u32, u32) {
        let span = self.width.saturating_sub(self.square).max(1) as u64;
        let x = (n * self.step as u64 % span) as u32;
        let y = self.height.saturating_sub(self.square) / 2;
        (x, y)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn name(&self) -> &str {
        "synthetic camera"
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn status(&self) -> SourceStatus {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            SourceStatus::Ended
        } else if self.paused.is_paused() {
            SourceStatus::Stalled
        } else {
            SourceStatus::Ready
        }
    }

    fn next_frame(&mut self) -> anyhow::Result<Frame> {
        let background = if self.light_on {
            LIT_BACKGROUND
        } else {
            BACKGROUND
        };
        let mut frame = Frame::from_pixel(self.width, self.height, background);
        let (x0, y0) = self.square_origin(self.produced);
        for y in y0..(y0 + self.square).min(self.height) {
            for x in x0..(x0 + self.square).min(self.width) {
                frame.put_pixel(x, y, SQUARE);
            }
        }
        self.produced += 1;
        Ok(frame)
    }

    fn enable_capability(&mut self, capability: Capability) -> PipelineResult<()> {
        match capability {
            Capability::AuxiliaryLight => {
                self.light_on = true;
                Ok(())
            }
        }
    }
}

/// Two sine tones, one per channel, with a fixed phase offset between them.
///
/// Equal frequencies with a quarter-period offset trace a circle; zero offset
/// traces a diagonal line.
#[derive(Debug, Clone)]
pub struct SyntheticAudioSource {
    sample_rate: u32,
    left_frequency: f64,
    right_frequency: f64,
    phase_offset: f64,
    amplitude: f32,
    frames_per_drain: usize,
    position: u64,
    paused: PauseHandle,
}

impl SyntheticAudioSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            left_frequency: 135.0,
            right_frequency: 135.0,
            phase_offset: FRAC_PI_2,
            amplitude: 0.5,
            frames_per_drain: (sample_rate / 60).max(1) as usize,
            position: 0,
            paused: PauseHandle::default(),
        }
    }

    pub fn with_tones(mut self, left_frequency: f64, right_frequency: f64) -> Self {
        self.left_frequency = left_frequency;
        self.right_frequency = right_frequency;
        self
    }

    /// Phase of the right channel relative to the left, in radians.
    pub fn with_phase_offset(mut self, radians: f64) -> Self {
        self.phase_offset = radians;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// How many frames each `drain` delivers.
    pub fn with_frames_per_drain(mut self, frames: usize) -> Self {
        self.frames_per_drain = frames;
        self
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.paused.clone()
    }

    fn sample(&self, n: u64) -> StereoFrame {
        let t = n as f64 / self.sample_rate.max(1) as f64;
        let amplitude = self.amplitude as f64;
        StereoFrame {
            left: (amplitude * (TAU * self.left_frequency * t).sin()) as f32,
            right: (amplitude * (TAU * self.right_frequency * t + self.phase_offset).sin()) as f32,
        }
    }
}

impl AudioSource for SyntheticAudioSource {
    fn name(&self) -> &str {
        "synthetic tones"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn status(&self) -> SourceStatus {
        if self.paused.is_paused() {
            SourceStatus::Stalled
        } else {
            SourceStatus::Ready
        }
    }

    fn drain(&mut self, out: &mut Vec<StereoFrame>) -> anyhow::Result<()> {
        out.reserve(self.frames_per_drain);
        for _ in 0..self.frames_per_drain {
            out.push(self.sample(self.position));
            self.position += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_moves_between_frames() {
        let mut source = SyntheticFrameSource::new(64, 32).with_square(8, 4);
        let first = source.next_frame().expect("frame");
        let second = source.next_frame().expect("frame");
        assert_eq!(*first.get_pixel(0, 12), SQUARE);
        assert_eq!(*second.get_pixel(0, 12), BACKGROUND);
        assert_eq!(*second.get_pixel(4, 12), SQUARE);
        assert_eq!(*second.get_pixel(11, 12), SQUARE);
    }

    #[test]
    fn pause_stalls_and_limit_ends() {
        let mut source = SyntheticFrameSource::new(16, 16).with_frame_limit(1);
        let pause = source.pause_handle();
        pause.pause();
        assert_eq!(source.status(), SourceStatus::Stalled);
        pause.resume();
        assert_eq!(source.status(), SourceStatus::Ready);
        source.next_frame().expect("frame");
        assert_eq!(source.status(), SourceStatus::Ended);
    }

    #[test]
    fn auxiliary_light_is_supported() {
        let mut source = SyntheticFrameSource::new(16, 16).with_square(4, 1);
        source
            .enable_capability(Capability::AuxiliaryLight)
            .expect("light");
        assert!(source.light_on());
        // Square sits at x 0..4, y 6..10 in the first frame.
        assert_eq!(source.square_origin(0), (0, 6));
        let frame = source.next_frame().expect("frame");
        assert_eq!(*frame.get_pixel(15, 0), LIT_BACKGROUND);
        assert_eq!(*frame.get_pixel(1, 7), SQUARE);
    }

    #[test]
    fn paused_tones_stall_and_resume_in_phase() {
        let mut source = SyntheticAudioSource::new(48_000).with_frames_per_drain(10);
        let pause = source.pause_handle();
        pause.pause();
        assert_eq!(source.status(), SourceStatus::Stalled);
        pause.resume();
        assert_eq!(source.status(), SourceStatus::Ready);
        let mut out = Vec::new();
        source.drain(&mut out).expect("drain");
        assert_eq!(out[0], SyntheticAudioSource::new(48_000).sample(0));
    }

    #[test]
    fn tones_keep_phase_across_drains() {
        let mut source = SyntheticAudioSource::new(48_000).with_frames_per_drain(100);
        let mut a = Vec::new();
        source.drain(&mut a).expect("drain");
        source.drain(&mut a).expect("drain");
        assert_eq!(a.len(), 200);

        let reference = SyntheticAudioSource::new(48_000);
        assert_eq!(a[150], reference.sample(150));
        // Quarter-period offset: right starts at the peak.
        assert!((a[0].right - 0.5).abs() < 1e-6);
        assert_eq!(a[0].left, 0.0);
    }
}
