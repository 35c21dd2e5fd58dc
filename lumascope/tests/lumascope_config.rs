use std::io::Write;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use lumascope::{LumascopeConfig, PipelineError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

const KEYS: [&str; 7] = [
    "LUMASCOPE_CONFIG",
    "LUMASCOPE_BRIGHTNESS_THRESHOLD",
    "LUMASCOPE_DIFF_THRESHOLD",
    "LUMASCOPE_MIN_MOVEMENT_PIXELS",
    "LUMASCOPE_CENTER_FREQUENCY",
    "LUMASCOPE_BANDWIDTH",
    "LUMASCOPE_VISUAL_GAIN",
];

fn clear_env() {
    for key in KEYS {
        // SAFETY: every test touching these variables holds ENV_LOCK.
        unsafe { std::env::remove_var(key) };
    }
}

fn set_env(key: &str, value: impl AsRef<std::ffi::OsStr>) {
    // SAFETY: every test touching these variables holds ENV_LOCK.
    unsafe { std::env::set_var(key, value) };
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    write!(
        file,
        r#"
        [video]
        width = 320
        height = 240
        tick_hz = 15.0
        auxiliary_light = true
        brightness_threshold = 220.0
        min_movement_pixels = 50

        [audio]
        window_size = 1024
        center_frequency = 440.0
        bandwidth = 40.0
        "#
    )
    .expect("write config");

    set_env("LUMASCOPE_CONFIG", file.path());
    set_env("LUMASCOPE_MIN_MOVEMENT_PIXELS", "75");
    set_env("LUMASCOPE_VISUAL_GAIN", "2.5");

    let cfg = LumascopeConfig::load().expect("load config");

    assert_eq!(cfg.video.width, 320);
    assert_eq!(cfg.video.height, 240);
    assert_eq!(cfg.video.tick_hz, 15.0);
    assert!(cfg.video.auxiliary_light);
    assert_eq!(cfg.video_tuning.brightness_threshold, 220.0);
    assert_eq!(cfg.video_tuning.diff_threshold, 20);
    assert_eq!(cfg.video_tuning.min_movement_pixels, 75);
    assert_eq!(cfg.audio.window_size, 1024);
    assert_eq!(cfg.audio.surface_width, 600);
    assert_eq!(cfg.audio_tuning.center_frequency, 440.0);
    assert_eq!(cfg.audio_tuning.bandwidth, 40.0);
    assert_eq!(cfg.audio_tuning.visual_gain, 2.5);

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LumascopeConfig::load().expect("load defaults");
    assert_eq!(cfg, LumascopeConfig::default());
}

#[test]
fn bad_env_value_is_a_config_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    set_env("LUMASCOPE_DIFF_THRESHOLD", "300");
    let err = LumascopeConfig::load_from(None).expect_err("300 does not fit in u8");
    assert!(matches!(err, PipelineError::Config(_)));

    clear_env();
}

#[test]
fn missing_file_is_a_config_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("tempdir");
    let err = LumascopeConfig::load_from(Some(&dir.path().join("absent.toml")))
        .expect_err("file does not exist");
    assert!(err.to_string().contains("absent.toml"));
}
