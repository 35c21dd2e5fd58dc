// THEORY:
// The `BrightMask` is the only piece of per-frame data the video pipeline keeps
// across ticks. It collapses an RGBA frame into one byte per pixel, 255 for
// "bright" and 0 for "dark", so the temporal layer can diff two frames without
// caring about color at all.
//
// Key properties:
// 1.  **Fixed geometry**: a mask always holds exactly width × height bytes, and
//     index `i` maps to pixel (i mod width, i div width).
// 2.  **Binary values**: only 0 and 255 ever appear. Constructors enforce this.
// 3.  **Owned snapshots**: a mask is a plain owned buffer. When the tracker keeps
//     the current mask as "previous", it takes ownership of it, so next tick's
//     mask can never alias the stored one.
//
// The `BrightnessClassifier` is the stateless producer of masks.

use crate::core_modules::Frame;
use crate::core_modules::pixel::pixel::{CHANNELS, Luminance, Pixel};

pub const BRIGHT: u8 = 255;
pub const DARK: u8 = 0;

/// One byte per pixel, each either `BRIGHT` or `DARK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrightMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BrightMask {
    /// An all-dark mask.
    pub fn dark(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![DARK; width as usize * height as usize],
        }
    }

    /// Wraps raw mask bytes. Returns `None` if the length does not match the
    /// geometry or a byte is neither 0 nor 255.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected || data.iter().any(|&v| v != DARK && v != BRIGHT) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn is_bright(&self, index: usize) -> bool {
        self.data.get(index).is_some_and(|&v| v == BRIGHT)
    }

    pub fn bright_count(&self) -> usize {
        self.data.iter().filter(|&&v| v == BRIGHT).count()
    }

    /// Pixel coordinates for a flat index.
    pub fn coordinates(&self, index: usize) -> (u32, u32) {
        let width = self.width as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    pub fn same_geometry(&self, other: &BrightMask) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Stateless frame → mask converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessClassifier {
    threshold: Luminance,
}

impl BrightnessClassifier {
    pub fn new(threshold: Luminance) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Luminance {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: Luminance) {
        self.threshold = threshold;
    }

    /// Marks every pixel whose BT.709 luminance strictly exceeds the threshold.
    pub fn classify(&self, frame: &Frame) -> BrightMask {
        let data = frame
            .as_raw()
            .chunks_exact(CHANNELS)
            .map(|bytes| {
                if Pixel::from(bytes).is_bright(self.threshold) {
                    BRIGHT
                } else {
                    DARK
                }
            })
            .collect();

        BrightMask {
            width: frame.width(),
            height: frame.height(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gray_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn gray_boundary_matches_default_threshold() {
        let classifier = BrightnessClassifier::new(200.0);
        let at = classifier.classify(&gray_frame(4, 4, 200));
        let above = classifier.classify(&gray_frame(4, 4, 201));
        assert!(at.as_slice().iter().all(|&v| v == DARK));
        assert!(above.as_slice().iter().all(|&v| v == BRIGHT));
    }

    #[test]
    fn mask_length_matches_frame_geometry() {
        let classifier = BrightnessClassifier::new(200.0);
        let mask = classifier.classify(&gray_frame(640, 480, 0));
        assert_eq!(mask.len(), 640 * 480);
        assert_eq!(mask.width(), 640);
        assert_eq!(mask.height(), 480);
        assert_eq!(mask.bright_count(), 0);
    }

    #[test]
    fn index_maps_to_row_major_coordinates() {
        let mut frame = gray_frame(5, 3, 0);
        frame.put_pixel(3, 2, Rgba([255, 255, 255, 255]));
        let mask = BrightnessClassifier::new(200.0).classify(&frame);
        let index = 2 * 5 + 3;
        assert!(mask.is_bright(index));
        assert_eq!(mask.coordinates(index), (3, 2));
        assert_eq!(mask.bright_count(), 1);
    }

    #[test]
    fn threshold_change_takes_effect() {
        let frame = gray_frame(2, 2, 150);
        let mut classifier = BrightnessClassifier::new(200.0);
        assert_eq!(classifier.classify(&frame).bright_count(), 0);
        classifier.set_threshold(100.0);
        assert_eq!(classifier.classify(&frame).bright_count(), 4);
    }

    #[test]
    fn from_raw_rejects_bad_input() {
        assert!(BrightMask::from_raw(2, 2, vec![0, 255, 0]).is_none());
        assert!(BrightMask::from_raw(2, 2, vec![0, 255, 0, 7]).is_none());
        assert!(BrightMask::from_raw(2, 2, vec![0, 255, 0, 255]).is_some());
    }
}
