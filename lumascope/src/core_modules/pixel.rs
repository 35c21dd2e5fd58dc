// THEORY:
// The `Pixel` module is the smallest unit of the video pipeline. It is a "dumb"
// data container for one RGBA pixel plus the single heuristic the tracker needs:
// perceived brightness.
//
// Luminance uses the ITU-R BT.709 luma weights (0.2126, 0.7152, 0.0722) applied to
// the raw 0..255 channel values and evaluated in f64, left to right. The weights
// sum to 1.0, so a gray pixel's luminance equals its channel value, and the
// brightness cutoff can be read directly in channel units. The evaluation order is
// part of the contract: it decides exactly which side of the threshold the
// boundary values land on.
//
// Alpha is carried along but never contributes to brightness.

pub mod pixel {
    pub type Channel = u8;
    pub type Luminance = f64;

    pub const LUMA_RED: Luminance = 0.2126;
    pub const LUMA_GREEN: Luminance = 0.7152;
    pub const LUMA_BLUE: Luminance = 0.0722;

    /// Bytes per pixel in every frame buffer handled by the pipeline.
    pub const CHANNELS: usize = 4;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        pub fn gray(value: Channel) -> Self {
            Self::new(value, value, value, 255)
        }

        /// BT.709 luma over 0..255 channels.
        pub fn luminance(&self) -> Luminance {
            LUMA_RED * self.red as Luminance
                + LUMA_GREEN * self.green as Luminance
                + LUMA_BLUE * self.blue as Luminance
        }

        /// Strictly brighter than `threshold`.
        pub fn is_bright(&self, threshold: Luminance) -> bool {
            self.luminance() > threshold
        }
    }

    impl From<&[Channel]> for Pixel {
        /// Reads the first four bytes as R, G, B, A. Missing alpha reads as opaque.
        fn from(bytes: &[Channel]) -> Self {
            Pixel {
                red: bytes[0],
                green: bytes[1],
                blue: bytes[2],
                alpha: bytes.get(3).copied().unwrap_or(255),
            }
        }
    }

    impl From<Pixel> for [Channel; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.red, pixel.green, pixel.blue, pixel.alpha]
        }
    }
}
