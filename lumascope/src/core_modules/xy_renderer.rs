// THEORY:
// The `XyRenderer` turns a stereo window into an oscilloscope picture. The left
// channel drives the horizontal axis and the right channel the vertical one, so
// two correlated tones draw a Lissajous figure and an uncorrelated pair draws a
// cloud.
//
// Rendering is split in two steps that can be tested separately:
// 1.  **Trace**: pure geometry. Each frame becomes a point
//     `(cx + L·scale, cy − R·scale)` with `scale = (width / 2) · gain`. The path is
//     returned exactly as computed, even when it leaves the surface.
// 2.  **Raster**: the surface is cleared to white on every tick, then each segment
//     is clipped to the surface rectangle and handed to `imageproc` as a line
//     segment. The pen is `STROKE_WIDTH` pixels wide, drawn as parallel one-pixel
//     lines. The line drawer walks every step of the segment it is given, so
//     clipping first keeps an absurd gain from costing millions of off-surface
//     steps.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::core_modules::waveform::SampleWindow;

pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const TRACE: Rgba<u8> = Rgba([0, 0, 0, 255]);
/// Pen size in pixels.
pub const STROKE_WIDTH: u32 = 2;

/// One plotted point in surface coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

impl XyPoint {
    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The unclamped polyline for one tick. Index 0 starts the path.
pub type XyPath = Vec<XyPoint>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyRenderer {
    visual_gain: f64,
}

impl XyRenderer {
    pub fn new(visual_gain: f64) -> Self {
        Self { visual_gain }
    }

    pub fn visual_gain(&self) -> f64 {
        self.visual_gain
    }

    pub fn set_visual_gain(&mut self, visual_gain: f64) {
        self.visual_gain = visual_gain;
    }

    /// Maps every frame of `window` onto a `width` × `height` surface.
    pub fn trace(&self, window: &SampleWindow, width: u32, height: u32) -> XyPath {
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        let scale = cx * self.visual_gain;

        window
            .iter()
            .map(|frame| XyPoint {
                x: cx + frame.left as f64 * scale,
                y: cy - frame.right as f64 * scale,
            })
            .collect()
    }

    /// Repaints `surface` with the trace of `window` and returns the path drawn.
    pub fn render(&self, window: &SampleWindow, surface: &mut RgbaImage) -> XyPath {
        let (width, height) = surface.dimensions();
        let path = self.trace(window, width, height);

        clear(surface);
        match path.as_slice() {
            [] => {}
            [only] => draw_segment(surface, *only, *only),
            points => {
                for segment in points.windows(2) {
                    draw_segment(surface, segment[0], segment[1]);
                }
            }
        }
        path
    }
}

/// A surface of the given size filled with the background color.
pub fn blank_surface(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BACKGROUND)
}

fn clear(surface: &mut RgbaImage) {
    for pixel in surface.pixels_mut() {
        *pixel = BACKGROUND;
    }
}

fn draw_segment(surface: &mut RgbaImage, from: XyPoint, to: XyPoint) {
    if !from.is_finite() || !to.is_finite() {
        return;
    }
    let (width, height) = surface.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    if let Some((a, b)) = clip(from, to, (width - 1) as f64, (height - 1) as f64) {
        stroke(surface, a, b);
    }
}

/// Liang–Barsky clip of a segment against `[0, max_x] × [0, max_y]`.
fn clip(from: XyPoint, to: XyPoint, max_x: f64, max_y: f64) -> Option<(XyPoint, XyPoint)> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;

    let edges = [
        (-dx, from.x),
        (dx, max_x - from.x),
        (-dy, from.y),
        (dy, max_y - from.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((
        XyPoint {
            x: from.x + t0 * dx,
            y: from.y + t0 * dy,
        },
        XyPoint {
            x: from.x + t1 * dx,
            y: from.y + t1 * dy,
        },
    ))
}

/// Draws `a`–`b` with a square pen of `STROKE_WIDTH`, anchored on the pixel
/// nearest each endpoint and extending up and to the left.
fn stroke(surface: &mut RgbaImage, a: XyPoint, b: XyPoint) {
    let (ax, ay) = (a.x.round() as f32, a.y.round() as f32);
    let (bx, by) = (b.x.round() as f32, b.y.round() as f32);
    for oy in 0..STROKE_WIDTH {
        for ox in 0..STROKE_WIDTH {
            let (ox, oy) = (ox as f32, oy as f32);
            draw_line_segment_mut(surface, (ax - ox, ay - oy), (bx - ox, by - oy), TRACE);
        }
    }
}
