// THEORY:
// The `diff_tracker` module adds memory to the video pipeline. A single mask says
// where the scene is bright; two consecutive masks say where something bright has
// just appeared. The tracker keeps exactly one previous mask and compares every
// new mask against it.
//
// Key architectural principles:
// 1.  **Two-state lifecycle**: the tracker starts `WarmingUp` with no history. The
//     first mask it sees is stored and reported as "no motion". From then on it is
//     `Tracking` and never goes back.
// 2.  **Asymmetric motion rule**: a pixel is "moved" only if its mask value changed
//     by more than the diff threshold AND it is bright now. Pixels that were bright
//     and turned dark are ignored, so the centroid follows lights that appear or
//     move, never the trail they leave behind.
// 3.  **Single centroid**: all moved pixels are pooled into one arithmetic mean.
//     The centroid exists only when the moved count strictly exceeds the minimum,
//     which also keeps the division away from zero.
// 4.  **Ownership handoff**: after every tick the current mask is moved into the
//     tracker as the new previous mask, whatever the detection outcome.
//
// Every tick also produces an overlay the same size as the frame: moved pixels are
// opaque green, everything else is fully transparent.

use std::fmt;

use image::Rgba;

use crate::config::VideoConfig;
use crate::core_modules::bright_mask::{BRIGHT, BrightMask};

/// Overlay color for pixels that newly became bright.
pub const MOVED_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
/// Overlay color for every other pixel.
pub const STILL_COLOR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Same-size RGBA visualization of the moved pixels.
pub type Overlay = image::RgbaImage;

/// Integer centroid of the moved pixels, rounded half-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Centroid {
    pub x: u32,
    pub y: u32,
}

/// The per-tick output of the temporal layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionResult {
    pub moved_pixel_count: usize,
    /// Present only when `moved_pixel_count` exceeds the configured minimum.
    pub centroid: Option<Centroid>,
}

impl DetectionResult {
    pub fn no_motion() -> Self {
        Self::default()
    }

    pub fn is_motion(&self) -> bool {
        self.centroid.is_some()
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.centroid {
            Some(c) => write!(
                f,
                "tracking: motion detected ({} px) at ({}, {})",
                self.moved_pixel_count, c.x, c.y
            ),
            None => write!(f, "no motion detected"),
        }
    }
}

#[derive(Debug, Clone)]
enum TrackerState {
    WarmingUp,
    Tracking { previous: BrightMask },
}

/// Compares each mask with the one before it.
#[derive(Debug, Clone)]
pub struct TemporalDiffTracker {
    state: TrackerState,
}

impl Default for TemporalDiffTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalDiffTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::WarmingUp,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackerState::Tracking { .. })
    }

    /// The mask stored at the end of the last tick.
    pub fn previous_mask(&self) -> Option<&BrightMask> {
        match &self.state {
            TrackerState::WarmingUp => None,
            TrackerState::Tracking { previous } => Some(previous),
        }
    }

    /// Diffs `current` against the stored mask, then keeps `current` for next tick.
    ///
    /// Callers must keep the geometry fixed; a mask of a different size restarts
    /// the comparison as if it were the first tick.
    pub fn update(&mut self, current: BrightMask, config: &VideoConfig) -> (DetectionResult, Overlay) {
        let mut overlay = Overlay::from_pixel(current.width(), current.height(), STILL_COLOR);

        let result = match &self.state {
            TrackerState::Tracking { previous } if previous.same_geometry(&current) => {
                Self::diff(previous, &current, config, &mut overlay)
            }
            TrackerState::Tracking { .. } => {
                tracing::warn!(
                    width = current.width(),
                    height = current.height(),
                    "mask geometry changed; skipping comparison for this tick"
                );
                DetectionResult::no_motion()
            }
            TrackerState::WarmingUp => DetectionResult::no_motion(),
        };

        self.state = TrackerState::Tracking { previous: current };
        (result, overlay)
    }

    fn diff(
        previous: &BrightMask,
        current: &BrightMask,
        config: &VideoConfig,
        overlay: &mut Overlay,
    ) -> DetectionResult {
        let mut sum_x: u64 = 0;
        let mut sum_y: u64 = 0;
        let mut count: usize = 0;

        for (i, (&now, &before)) in current
            .as_slice()
            .iter()
            .zip(previous.as_slice())
            .enumerate()
        {
            if now.abs_diff(before) > config.diff_threshold && now == BRIGHT {
                let (x, y) = current.coordinates(i);
                sum_x += x as u64;
                sum_y += y as u64;
                count += 1;
                overlay.put_pixel(x, y, MOVED_COLOR);
            }
        }

        let centroid = (count > config.min_movement_pixels).then(|| Centroid {
            x: round_half_up(sum_x, count as u64),
            y: round_half_up(sum_y, count as u64),
        });

        DetectionResult {
            moved_pixel_count: count,
            centroid,
        }
    }
}

/// floor(sum / count + 1/2), computed exactly in integers. `count` must be non-zero.
fn round_half_up(sum: u64, count: u64) -> u32 {
    ((2 * sum + count) / (2 * count)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::bright_mask::DARK;

    fn mask_with_rect(width: u32, height: u32, x0: u32, x1: u32, y0: u32, y1: u32) -> BrightMask {
        let mut data = vec![DARK; (width * height) as usize];
        for y in y0..y1 {
            for x in x0..x1 {
                data[(y * width + x) as usize] = BRIGHT;
            }
        }
        BrightMask::from_raw(width, height, data).expect("valid mask")
    }

    #[test]
    fn first_tick_never_reports_motion() {
        let mut tracker = TemporalDiffTracker::new();
        let (result, overlay) =
            tracker.update(mask_with_rect(64, 64, 0, 64, 0, 64), &VideoConfig::default());
        assert_eq!(result, DetectionResult::no_motion());
        assert!(overlay.pixels().all(|p| *p == STILL_COLOR));
        assert!(tracker.is_tracking());
    }

    #[test]
    fn identical_masks_report_nothing() {
        let mut tracker = TemporalDiffTracker::new();
        let config = VideoConfig::default();
        let mask = mask_with_rect(64, 64, 10, 40, 10, 40);
        tracker.update(mask.clone(), &config);
        let (result, _) = tracker.update(mask, &config);
        assert_eq!(result.moved_pixel_count, 0);
        assert!(result.centroid.is_none());
    }

    #[test]
    fn newly_bright_rectangle_centroid_is_its_center() {
        let mut tracker = TemporalDiffTracker::new();
        let config = VideoConfig::default();
        tracker.update(BrightMask::dark(100, 100), &config);
        // 20 x 10 = 200 pixels; mean x = 29.5, mean y = 54.5
        let (result, overlay) = tracker.update(mask_with_rect(100, 100, 20, 40, 50, 60), &config);
        assert_eq!(result.moved_pixel_count, 200);
        assert_eq!(result.centroid, Some(Centroid { x: 30, y: 55 }));
        assert_eq!(*overlay.get_pixel(20, 50), MOVED_COLOR);
        assert_eq!(*overlay.get_pixel(39, 59), MOVED_COLOR);
        assert_eq!(*overlay.get_pixel(40, 59), STILL_COLOR);
    }

    #[test]
    fn count_equal_to_minimum_yields_no_centroid() {
        let mut tracker = TemporalDiffTracker::new();
        let config = VideoConfig {
            min_movement_pixels: 100,
            ..VideoConfig::default()
        };
        tracker.update(BrightMask::dark(50, 50), &config);
        let (result, _) = tracker.update(mask_with_rect(50, 50, 0, 10, 0, 10), &config);
        assert_eq!(result.moved_pixel_count, 100);
        assert!(result.centroid.is_none());

        let one_below = VideoConfig {
            min_movement_pixels: 99,
            ..config
        };
        let mut tracker = TemporalDiffTracker::new();
        tracker.update(BrightMask::dark(50, 50), &one_below);
        let (result, _) = tracker.update(mask_with_rect(50, 50, 0, 10, 0, 10), &one_below);
        assert_eq!(result.centroid, Some(Centroid { x: 5, y: 5 }));
    }

    #[test]
    fn fading_pixels_are_ignored() {
        let mut tracker = TemporalDiffTracker::new();
        let config = VideoConfig::default();
        tracker.update(mask_with_rect(64, 64, 0, 64, 0, 64), &config);
        let (result, overlay) = tracker.update(BrightMask::dark(64, 64), &config);
        assert_eq!(result.moved_pixel_count, 0);
        assert!(overlay.pixels().all(|p| *p == STILL_COLOR));
    }

    #[test]
    fn previous_mask_is_replaced_every_tick() {
        let mut tracker = TemporalDiffTracker::new();
        let config = VideoConfig::default();
        let first = mask_with_rect(16, 16, 0, 4, 0, 4);
        let second = mask_with_rect(16, 16, 8, 12, 8, 12);
        tracker.update(first, &config);
        tracker.update(second.clone(), &config);
        assert_eq!(tracker.previous_mask(), Some(&second));
    }

    #[test]
    fn geometry_change_is_not_compared() {
        let mut tracker = TemporalDiffTracker::new();
        let config = VideoConfig::default();
        tracker.update(BrightMask::dark(10, 10), &config);
        let (result, overlay) = tracker.update(mask_with_rect(20, 20, 0, 20, 0, 20), &config);
        assert_eq!(result, DetectionResult::no_motion());
        assert_eq!(overlay.dimensions(), (20, 20));
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(209, 2), 105); // 104.5
        assert_eq!(round_half_up(208, 2), 104);
        assert_eq!(round_half_up(10, 3), 3); // 3.33
        assert_eq!(round_half_up(11, 3), 4); // 3.67
    }

    #[test]
    fn status_line_reports_count_and_center() {
        let result = DetectionResult {
            moved_pixel_count: 200,
            centroid: Some(Centroid { x: 105, y: 110 }),
        };
        assert_eq!(
            result.to_string(),
            "tracking: motion detected (200 px) at (105, 110)"
        );
        assert_eq!(DetectionResult::no_motion().to_string(), "no motion detected");
    }
}
