// THEORY:
// Tunable behavior for both pipelines comes in two flavors:
//
// - `VideoSettings` / `AudioSettings` are fixed when a pipeline starts (geometry,
//   window size, tick rate).
// - `VideoConfig` / `AudioConfig` are the live knobs. They can be replaced between
//   ticks and take effect on the next one.
//
// `LumascopeConfig::load` reads an optional TOML file named by `LUMASCOPE_CONFIG`,
// applies `LUMASCOPE_*` environment overrides, then validates the result.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;
pub const DEFAULT_VIDEO_TICK_HZ: f64 = 30.0;
pub const DEFAULT_BRIGHTNESS_THRESHOLD: f64 = 200.0;
pub const DEFAULT_DIFF_THRESHOLD: u8 = 20;
pub const DEFAULT_MIN_MOVEMENT_PIXELS: usize = 100;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_AUDIO_TICK_HZ: f64 = 60.0;
/// 2048 samples is roughly 46 ms at 44.1 kHz.
pub const DEFAULT_WINDOW_SIZE: usize = 2048;
pub const DEFAULT_SURFACE_WIDTH: u32 = 600;
pub const DEFAULT_SURFACE_HEIGHT: u32 = 600;
pub const DEFAULT_CENTER_FREQUENCY: f64 = 135.0;
pub const DEFAULT_BANDWIDTH: f64 = 20.0;
pub const DEFAULT_VISUAL_GAIN: f64 = 5.0;

/// Live-adjustable knobs of the video pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoConfig {
    /// BT.709 luminance a pixel must strictly exceed to count as bright.
    pub brightness_threshold: f64,
    /// Mask difference a pixel must strictly exceed to count as changed.
    pub diff_threshold: u8,
    /// Moved-pixel count a tick must strictly exceed before a centroid is reported.
    pub min_movement_pixels: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            min_movement_pixels: DEFAULT_MIN_MOVEMENT_PIXELS,
        }
    }
}

/// Fixed-for-lifetime parameters of the video pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub tick_hz: f64,
    /// Ask the source for its auxiliary light. Missing support only degrades.
    pub auxiliary_light: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            tick_hz: DEFAULT_VIDEO_TICK_HZ,
            auxiliary_light: false,
        }
    }
}

impl VideoSettings {
    pub fn tick_period(&self) -> PipelineResult<Duration> {
        period_from_hz("video.tick_hz", self.tick_hz)
    }
}

/// Live-adjustable knobs of the audio pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConfig {
    /// Bandpass center frequency in Hz, shared by both channels.
    pub center_frequency: f64,
    /// Bandpass width in Hz. Values below 1 Hz are treated as 1 Hz.
    pub bandwidth: f64,
    /// Multiplier applied on top of the half-width scale of the XY surface.
    pub visual_gain: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            center_frequency: DEFAULT_CENTER_FREQUENCY,
            bandwidth: DEFAULT_BANDWIDTH,
            visual_gain: DEFAULT_VISUAL_GAIN,
        }
    }
}

/// Fixed-for-lifetime parameters of the audio pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    /// Rate requested from synthetic sources. Live sources report their own.
    pub sample_rate: u32,
    pub window_size: usize,
    pub tick_hz: f64,
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            tick_hz: DEFAULT_AUDIO_TICK_HZ,
            surface_width: DEFAULT_SURFACE_WIDTH,
            surface_height: DEFAULT_SURFACE_HEIGHT,
        }
    }
}

impl AudioSettings {
    pub fn tick_period(&self) -> PipelineResult<Duration> {
        period_from_hz("audio.tick_hz", self.tick_hz)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LumascopeConfigFile {
    video: Option<VideoConfigFile>,
    audio: Option<AudioConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VideoConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    tick_hz: Option<f64>,
    auxiliary_light: Option<bool>,
    brightness_threshold: Option<f64>,
    diff_threshold: Option<u8>,
    min_movement_pixels: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AudioConfigFile {
    sample_rate: Option<u32>,
    window_size: Option<usize>,
    tick_hz: Option<f64>,
    surface_width: Option<u32>,
    surface_height: Option<u32>,
    center_frequency: Option<f64>,
    bandwidth: Option<f64>,
    visual_gain: Option<f64>,
}

/// Everything needed to start both pipelines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LumascopeConfig {
    pub video: VideoSettings,
    pub video_tuning: VideoConfig,
    pub audio: AudioSettings,
    pub audio_tuning: AudioConfig,
}

impl LumascopeConfig {
    /// Load from `LUMASCOPE_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> PipelineResult<Self> {
        let path = std::env::var("LUMASCOPE_CONFIG").ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> PipelineResult<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => LumascopeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(raw: &str) -> PipelineResult<Self> {
        let file: LumascopeConfigFile = toml::from_str(raw)
            .map_err(|e| PipelineError::Config(format!("invalid config: {e}")))?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LumascopeConfigFile) -> Self {
        let video = file.video.unwrap_or_default();
        let audio = file.audio.unwrap_or_default();
        let video_defaults = VideoSettings::default();
        let video_tuning_defaults = VideoConfig::default();
        let audio_defaults = AudioSettings::default();
        let audio_tuning_defaults = AudioConfig::default();

        Self {
            video: VideoSettings {
                width: video.width.unwrap_or(video_defaults.width),
                height: video.height.unwrap_or(video_defaults.height),
                tick_hz: video.tick_hz.unwrap_or(video_defaults.tick_hz),
                auxiliary_light: video
                    .auxiliary_light
                    .unwrap_or(video_defaults.auxiliary_light),
            },
            video_tuning: VideoConfig {
                brightness_threshold: video
                    .brightness_threshold
                    .unwrap_or(video_tuning_defaults.brightness_threshold),
                diff_threshold: video
                    .diff_threshold
                    .unwrap_or(video_tuning_defaults.diff_threshold),
                min_movement_pixels: video
                    .min_movement_pixels
                    .unwrap_or(video_tuning_defaults.min_movement_pixels),
            },
            audio: AudioSettings {
                sample_rate: audio.sample_rate.unwrap_or(audio_defaults.sample_rate),
                window_size: audio.window_size.unwrap_or(audio_defaults.window_size),
                tick_hz: audio.tick_hz.unwrap_or(audio_defaults.tick_hz),
                surface_width: audio.surface_width.unwrap_or(audio_defaults.surface_width),
                surface_height: audio
                    .surface_height
                    .unwrap_or(audio_defaults.surface_height),
            },
            audio_tuning: AudioConfig {
                center_frequency: audio
                    .center_frequency
                    .unwrap_or(audio_tuning_defaults.center_frequency),
                bandwidth: audio.bandwidth.unwrap_or(audio_tuning_defaults.bandwidth),
                visual_gain: audio
                    .visual_gain
                    .unwrap_or(audio_tuning_defaults.visual_gain),
            },
        }
    }

    fn apply_env(&mut self) -> PipelineResult<()> {
        if let Some(value) = env_parse::<f64>("LUMASCOPE_BRIGHTNESS_THRESHOLD")? {
            self.video_tuning.brightness_threshold = value;
        }
        if let Some(value) = env_parse::<u8>("LUMASCOPE_DIFF_THRESHOLD")? {
            self.video_tuning.diff_threshold = value;
        }
        if let Some(value) = env_parse::<usize>("LUMASCOPE_MIN_MOVEMENT_PIXELS")? {
            self.video_tuning.min_movement_pixels = value;
        }
        if let Some(value) = env_parse::<f64>("LUMASCOPE_CENTER_FREQUENCY")? {
            self.audio_tuning.center_frequency = value;
        }
        if let Some(value) = env_parse::<f64>("LUMASCOPE_BANDWIDTH")? {
            self.audio_tuning.bandwidth = value;
        }
        if let Some(value) = env_parse::<f64>("LUMASCOPE_VISUAL_GAIN")? {
            self.audio_tuning.visual_gain = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(PipelineError::Config(
                "video width and height must be greater than zero".into(),
            ));
        }
        self.video.tick_period()?;
        check_finite(
            "video.brightness_threshold",
            self.video_tuning.brightness_threshold,
        )?;

        if self.audio.sample_rate == 0 {
            return Err(PipelineError::Config(
                "audio.sample_rate must be greater than zero".into(),
            ));
        }
        if self.audio.window_size == 0 {
            return Err(PipelineError::Config(
                "audio.window_size must be greater than zero".into(),
            ));
        }
        if self.audio.surface_width == 0 || self.audio.surface_height == 0 {
            return Err(PipelineError::Config(
                "audio surface dimensions must be greater than zero".into(),
            ));
        }
        self.audio.tick_period()?;
        self.audio_tuning.validate()
    }
}

impl AudioConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        check_rate("audio.center_frequency", self.center_frequency)?;
        check_finite("audio.bandwidth", self.bandwidth)?;
        check_finite("audio.visual_gain", self.visual_gain)
    }
}

fn check_rate(name: &str, value: f64) -> PipelineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "{name} must be a positive number (got {value})"
        )))
    }
}

/// Converts a rate to a non-zero period. Rates so low that the period does not
/// fit a `Duration`, or so high that it rounds to zero, are rejected.
pub(crate) fn period_from_hz(name: &str, hz: f64) -> PipelineResult<Duration> {
    check_rate(name, hz)?;
    match Duration::try_from_secs_f64(1.0 / hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(PipelineError::Config(format!(
            "{name} of {hz} Hz does not give a usable tick period"
        ))),
    }
}

fn check_finite(name: &str, value: f64) -> PipelineResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::Config(format!("{name} must be finite")))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> PipelineResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> PipelineResult<LumascopeConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    toml::from_str(&raw)
        .map_err(|e| PipelineError::Config(format!("invalid config file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = LumascopeConfig::default();
        assert_eq!(cfg.video.width, 640);
        assert_eq!(cfg.video.height, 480);
        assert_eq!(cfg.video_tuning.brightness_threshold, 200.0);
        assert_eq!(cfg.video_tuning.diff_threshold, 20);
        assert_eq!(cfg.video_tuning.min_movement_pixels, 100);
        assert_eq!(cfg.audio.window_size, 2048);
        assert_eq!(cfg.audio_tuning.center_frequency, 135.0);
        assert_eq!(cfg.audio_tuning.bandwidth, 20.0);
        assert_eq!(cfg.audio_tuning.visual_gain, 5.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let cfg = LumascopeConfig::from_toml_str(
            r#"
            [video]
            brightness_threshold = 180.0

            [audio]
            bandwidth = 5.0
            "#,
        )
        .expect("parse config");
        assert_eq!(cfg.video_tuning.brightness_threshold, 180.0);
        assert_eq!(cfg.video_tuning.min_movement_pixels, 100);
        assert_eq!(cfg.audio_tuning.bandwidth, 5.0);
        assert_eq!(cfg.audio_tuning.center_frequency, 135.0);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_rates() {
        assert!(LumascopeConfig::from_toml_str("[video]\nframerate = 30\n").is_err());
        assert!(LumascopeConfig::from_toml_str("[audio]\ntick_hz = 0.0\n").is_err());
        assert!(LumascopeConfig::from_toml_str("[video]\nwidth = 0\n").is_err());
    }

    #[test]
    fn tick_period_follows_rate() {
        let settings = VideoSettings::default();
        let period = settings.tick_period().expect("default rate");
        assert!((period.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn extreme_tick_rates_are_rejected_not_panicking() {
        assert!(matches!(
            LumascopeConfig::from_toml_str("[video]\ntick_hz = 1e-30\n"),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            LumascopeConfig::from_toml_str("[audio]\ntick_hz = 1e30\n"),
            Err(PipelineError::Config(_))
        ));
        let settings = AudioSettings {
            tick_hz: 1e-30,
            ..AudioSettings::default()
        };
        assert!(settings.tick_period().is_err());
    }
}
