// THEORY:
// The `bandpass` module isolates one frequency band of a stereo stream before it
// reaches the XY renderer.
//
// Key architectural principles:
// 1.  **One design, two sections**: each channel runs its own second-order IIR
//     section (RBJ audio-EQ cookbook bandpass, constant 0 dB peak gain) in
//     transposed direct form II. Both sections always share one `BandpassParams`,
//     and the only way to change it is `DualChannelBandpass`, which rewrites both
//     channels in the same call. The XY trace compares phase and amplitude across
//     channels, so asymmetric filtering would draw a fake correlation.
// 2.  **Retune, don't reset**: reconfiguring recomputes the coefficients but keeps
//     the delay registers, so a knob change never clicks the signal back to zero.

use std::f64::consts::PI;

use crate::core_modules::waveform::StereoFrame;

/// Bandwidth floor; prevents an infinite Q.
pub const MIN_BANDWIDTH_HZ: f64 = 1.0;
/// Lowest frequency the coefficient design will accept.
const MIN_DESIGN_FREQUENCY_HZ: f64 = 0.01;
/// Keeps the design strictly below Nyquist.
const NYQUIST_MARGIN: f64 = 0.999;
const MIN_Q: f64 = 1e-4;

/// Center frequency and quality factor shared by both channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandpassParams {
    center_frequency: f64,
    q: f64,
}

impl BandpassParams {
    /// `Q = center_frequency / max(1, bandwidth)`.
    pub fn from_bandwidth(center_frequency: f64, bandwidth: f64) -> Self {
        let safe_bandwidth = bandwidth.max(MIN_BANDWIDTH_HZ);
        Self {
            center_frequency,
            q: center_frequency / safe_bandwidth,
        }
    }

    pub fn center_frequency(&self) -> f64 {
        self.center_frequency
    }

    pub fn q(&self) -> f64 {
        self.q
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    fn bandpass(params: BandpassParams, sample_rate: u32) -> Self {
        let fs = sample_rate.max(1) as f64;
        let nyquist = fs / 2.0;
        let f0 = params
            .center_frequency
            .clamp(MIN_DESIGN_FREQUENCY_HZ, nyquist * NYQUIST_MARGIN);
        let q = params.q.max(MIN_Q);

        let w0 = 2.0 * PI * f0 / fs;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * w0.cos() / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// One second-order section with its own state.
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    coefficients: Coefficients,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn with_coefficients(coefficients: Coefficients) -> Self {
        Self {
            coefficients,
            ..Self::default()
        }
    }

    fn set_coefficients(&mut self, coefficients: Coefficients) {
        self.coefficients = coefficients;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coefficients;
        let x = input as f64;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y as f32
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Two bandpass sections locked to the same parameters.
#[derive(Debug, Clone)]
pub struct DualChannelBandpass {
    sample_rate: u32,
    params: BandpassParams,
    left: Biquad,
    right: Biquad,
}

impl DualChannelBandpass {
    pub fn new(sample_rate: u32, params: BandpassParams) -> Self {
        let coefficients = Coefficients::bandpass(params, sample_rate);
        Self {
            sample_rate,
            params,
            left: Biquad::with_coefficients(coefficients),
            right: Biquad::with_coefficients(coefficients),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn params(&self) -> BandpassParams {
        self.params
    }

    /// Retunes both channels from a center frequency and a bandwidth.
    pub fn configure(&mut self, center_frequency: f64, bandwidth: f64) -> BandpassParams {
        let params = BandpassParams::from_bandwidth(center_frequency, bandwidth);
        self.set_params(params);
        params
    }

    pub fn set_params(&mut self, params: BandpassParams) {
        if params == self.params {
            return;
        }
        let coefficients = Coefficients::bandpass(params, self.sample_rate);
        self.left.set_coefficients(coefficients);
        self.right.set_coefficients(coefficients);
        self.params = params;
        tracing::debug!(
            center_frequency = params.center_frequency,
            q = params.q,
            "bandpass retuned"
        );
    }

    #[inline]
    pub fn process(&mut self, frame: StereoFrame) -> StereoFrame {
        StereoFrame {
            left: self.left.process(frame.left),
            right: self.right.process(frame.right),
        }
    }

    pub fn process_in_place(&mut self, frames: &mut [StereoFrame]) {
        for frame in frames.iter_mut() {
            *frame = self.process(*frame);
        }
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 44_100;

    fn sine(freq: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / FS as f64).sin() as f32)
            .collect()
    }

    fn settled_peak(filter: &mut Biquad, signal: &[f32]) -> f32 {
        let out: Vec<f32> = signal.iter().map(|&s| filter.process(s)).collect();
        out[out.len() - out.len() / 10..]
            .iter()
            .fold(0.0f32, |acc, v| acc.max(v.abs()))
    }

    #[test]
    fn q_follows_bandwidth_with_floor() {
        let p = BandpassParams::from_bandwidth(135.0, 20.0);
        assert!((p.q() - 6.75).abs() < 1e-12);
        assert_eq!(BandpassParams::from_bandwidth(135.0, 0.0).q(), 135.0);
        assert_eq!(BandpassParams::from_bandwidth(135.0, 0.5).q(), 135.0);
    }

    #[test]
    fn passes_center_and_rejects_far_frequencies() {
        let params = BandpassParams::from_bandwidth(135.0, 20.0);
        let coefficients = Coefficients::bandpass(params, FS);

        let mut at_center = Biquad::with_coefficients(coefficients);
        let peak = settled_peak(&mut at_center, &sine(135.0, FS as usize));
        assert!((peak - 1.0).abs() < 0.05, "center gain was {peak}");

        let mut far = Biquad::with_coefficients(coefficients);
        let peak = settled_peak(&mut far, &sine(2_000.0, FS as usize));
        assert!(peak < 0.05, "off-band gain was {peak}");
    }

    #[test]
    fn both_channels_always_share_params() {
        let mut filter = DualChannelBandpass::new(FS, BandpassParams::from_bandwidth(135.0, 20.0));
        filter.configure(440.0, 0.0);
        assert_eq!(filter.params().center_frequency(), 440.0);
        assert_eq!(filter.params().q(), 440.0);
        assert_eq!(filter.left.coefficients, filter.right.coefficients);

        let input = sine(440.0, 2048);
        for &s in &input {
            let out = filter.process(StereoFrame { left: s, right: s });
            assert_eq!(out.left, out.right);
        }
    }

    #[test]
    fn retuning_keeps_state() {
        let mut filter = DualChannelBandpass::new(FS, BandpassParams::from_bandwidth(135.0, 20.0));
        let mut frames: Vec<StereoFrame> = sine(135.0, 4096)
            .into_iter()
            .map(|s| StereoFrame { left: s, right: -s })
            .collect();
        filter.process_in_place(&mut frames);
        let before = (filter.left.z1, filter.left.z2);
        filter.configure(150.0, 20.0);
        assert_eq!((filter.left.z1, filter.left.z2), before);
        let next = filter.process(StereoFrame { left: 0.0, right: 0.0 });
        assert!(next.left.is_finite() && next.right.is_finite());
    }

    #[test]
    fn extreme_frequencies_stay_stable() {
        for freq in [0.0, 1e9] {
            let mut filter = DualChannelBandpass::new(FS, BandpassParams::from_bandwidth(freq, 20.0));
            let mut last = StereoFrame::default();
            for s in sine(1_000.0, 8192) {
                last = filter.process(StereoFrame { left: s, right: s });
            }
            assert!(last.left.is_finite() && last.left.abs() < 10.0);
        }
    }
}
