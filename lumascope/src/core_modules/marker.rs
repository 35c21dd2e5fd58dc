// Centroid marker drawn on top of the original frame when detection fires.

use image::Rgba;
use imageproc::drawing::draw_filled_circle_mut;

use crate::core_modules::Frame;
use crate::core_modules::diff_tracker::{Centroid, DetectionResult};

pub const MARKER_RADIUS: u32 = 10;
pub const MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Fills a disc of `radius` around `center`. Pixels outside the frame are
/// skipped.
pub fn draw_marker(frame: &mut Frame, center: Centroid, radius: u32, color: Rgba<u8>) {
    // Everything past the frame's longer side is off-canvas anyway; the bound
    // keeps the drawer's i32 arithmetic in range.
    let limit = frame.width().max(frame.height()).min(i32::MAX as u32 / 4);
    let clamp = |v: u32| v.min(limit) as i32;
    draw_filled_circle_mut(
        frame,
        (clamp(center.x), clamp(center.y)),
        clamp(radius),
        color,
    );
}

/// A copy of `frame` with the default marker at the centroid, if any.
pub fn annotate(frame: &Frame, result: &DetectionResult) -> Frame {
    let mut annotated = frame.clone();
    if let Some(center) = result.centroid {
        draw_marker(&mut annotated, center, MARKER_RADIUS, MARKER_COLOR);
    }
    annotated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_drawn_only_on_detection() {
        let frame = Frame::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        let untouched = annotate(&frame, &DetectionResult::no_motion());
        assert_eq!(untouched, frame);

        let hit = DetectionResult {
            moved_pixel_count: 500,
            centroid: Some(Centroid { x: 32, y: 32 }),
        };
        let marked = annotate(&frame, &hit);
        assert_eq!(*marked.get_pixel(32, 32), MARKER_COLOR);
        assert_eq!(*marked.get_pixel(42, 32), MARKER_COLOR);
        assert_eq!(*marked.get_pixel(43, 32), Rgba([0, 0, 0, 255]));
        assert_eq!(*marked.get_pixel(40, 40), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn marker_near_edge_is_clipped() {
        let mut frame = Frame::from_pixel(16, 16, Rgba([0, 0, 0, 255]));
        draw_marker(&mut frame, Centroid { x: 0, y: 15 }, MARKER_RADIUS, MARKER_COLOR);
        assert_eq!(*frame.get_pixel(0, 15), MARKER_COLOR);
        assert_eq!(*frame.get_pixel(0, 5), MARKER_COLOR);
        assert_eq!(*frame.get_pixel(15, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn disc_stays_inside_its_radius() {
        let mut frame = Frame::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        draw_marker(&mut frame, Centroid { x: 32, y: 32 }, MARKER_RADIUS, MARKER_COLOR);
        for (x, y, pixel) in frame.enumerate_pixels() {
            if *pixel == MARKER_COLOR {
                let (dx, dy) = (x as i64 - 32, y as i64 - 32);
                assert!(dx * dx + dy * dy <= 11 * 11, "({x}, {y}) is outside the disc");
            }
        }
        assert_eq!(*frame.get_pixel(32, 22), MARKER_COLOR);
        assert_eq!(*frame.get_pixel(32, 42), MARKER_COLOR);
    }
}
