// THEORY:
// The `WaveformSampler` is the audio pipeline's short-term memory. Samples arrive
// in bursts of arbitrary size (whatever the device callback delivered since the
// last tick) but the renderer always wants the same number of points. The sampler
// bridges the two with a fixed-size ring of stereo frames.
//
// Key architectural principles:
// 1.  **Frames, not channels**: left and right are stored together as one
//     `StereoFrame`, so a captured window can never mix sample indices from the
//     two channels.
// 2.  **Latest wins**: the ring keeps only the newest `window_size` frames. Older
//     samples are overwritten and never rendered.
// 3.  **Zero prefix**: until the ring has filled once, the unfilled slots read as
//     silence. A freshly started pipeline therefore draws a dot at the center
//     rather than nothing at all.

/// One left/right sample pair taken at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

/// Two equal-length channel buffers captured from the same frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleWindow {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl SampleWindow {
    /// Returns `None` if the channel lengths differ.
    pub fn new(left: Vec<f32>, right: Vec<f32>) -> Option<Self> {
        (left.len() == right.len()).then_some(Self { left, right })
    }

    pub fn silent(len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn iter(&self) -> impl Iterator<Item = StereoFrame> + '_ {
        self.left
            .iter()
            .zip(&self.right)
            .map(|(&left, &right)| StereoFrame { left, right })
    }
}

/// Fixed-size ring of the most recent filtered frames.
#[derive(Debug, Clone)]
pub struct WaveformSampler {
    ring: Vec<StereoFrame>,
    /// Slot the next frame will be written to; also the oldest frame once full.
    write: usize,
}

impl WaveformSampler {
    /// A zero-length window is bumped to one frame.
    pub fn new(window_size: usize) -> Self {
        Self {
            ring: vec![StereoFrame::default(); window_size.max(1)],
            write: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.ring.len()
    }

    pub fn push(&mut self, frame: StereoFrame) {
        self.ring[self.write] = frame;
        self.write = (self.write + 1) % self.ring.len();
    }

    pub fn extend<I: IntoIterator<Item = StereoFrame>>(&mut self, frames: I) {
        for frame in frames {
            self.push(frame);
        }
    }

    /// The last `window_size` frames, oldest first.
    pub fn capture(&self) -> SampleWindow {
        let n = self.ring.len();
        let mut left = Vec::with_capacity(n);
        let mut right = Vec::with_capacity(n);
        let (newer, older) = self.ring.split_at(self.write);
        for frame in older.iter().chain(newer) {
            left.push(frame.left);
            right.push(frame.right);
        }
        SampleWindow { left, right }
    }

    pub fn clear(&mut self) {
        self.ring.fill(StereoFrame::default());
        self.write = 0;
    }
}

/// Splits an interleaved device buffer into stereo frames.
///
/// Mono input is duplicated into both channels; channels beyond the second are
/// dropped. A trailing partial frame is ignored.
pub fn interleaved_to_stereo<T, F>(data: &[T], channels: usize, convert: F) -> Vec<StereoFrame>
where
    T: Copy,
    F: Fn(T) -> f32,
{
    if channels == 0 {
        return Vec::new();
    }
    data.chunks_exact(channels)
        .map(|chunk| {
            let left = convert(chunk[0]);
            let right = if channels > 1 { convert(chunk[1]) } else { left };
            StereoFrame { left, right }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(left: f32, right: f32) -> StereoFrame {
        StereoFrame { left, right }
    }

    #[test]
    fn empty_sampler_captures_silence() {
        let sampler = WaveformSampler::new(8);
        let window = sampler.capture();
        assert_eq!(window.len(), 8);
        assert!(window.left().iter().all(|&v| v == 0.0));
        assert!(window.right().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn partial_fill_keeps_zero_prefix() {
        let mut sampler = WaveformSampler::new(4);
        sampler.extend([frame(0.1, -0.1), frame(0.2, -0.2)]);
        let window = sampler.capture();
        assert_eq!(window.left(), &[0.0, 0.0, 0.1, 0.2]);
        assert_eq!(window.right(), &[0.0, 0.0, -0.1, -0.2]);
    }

    #[test]
    fn overflow_keeps_latest_in_order() {
        let mut sampler = WaveformSampler::new(3);
        sampler.extend((1..=7).map(|i| frame(i as f32, -(i as f32))));
        let window = sampler.capture();
        assert_eq!(window.left(), &[5.0, 6.0, 7.0]);
        assert_eq!(window.right(), &[-5.0, -6.0, -7.0]);
    }

    #[test]
    fn window_channels_have_equal_length() {
        assert!(SampleWindow::new(vec![0.0; 3], vec![0.0; 2]).is_none());
        let window = SampleWindow::new(vec![1.0, 2.0], vec![3.0, 4.0]).expect("equal lengths");
        let frames: Vec<_> = window.iter().collect();
        assert_eq!(frames, vec![frame(1.0, 3.0), frame(2.0, 4.0)]);
    }

    #[test]
    fn clear_resets_to_silence() {
        let mut sampler = WaveformSampler::new(2);
        sampler.extend([frame(1.0, 1.0), frame(1.0, 1.0)]);
        sampler.clear();
        assert_eq!(sampler.capture(), SampleWindow::silent(2));
    }

    #[test]
    fn interleaved_buffers_are_split_per_frame() {
        let stereo = interleaved_to_stereo(&[1i16, 2, 3, 4, 5], 2, |v| v as f32);
        assert_eq!(stereo, vec![frame(1.0, 2.0), frame(3.0, 4.0)]);

        let mono = interleaved_to_stereo(&[0.5f32, -0.5], 1, |v| v);
        assert_eq!(mono, vec![frame(0.5, 0.5), frame(-0.5, -0.5)]);

        let quad = interleaved_to_stereo(&[1.0f32, 2.0, 3.0, 4.0], 4, |v| v);
        assert_eq!(quad, vec![frame(1.0, 2.0)]);

        assert!(interleaved_to_stereo(&[1.0f32], 0, |v| v).is_empty());
    }
}
