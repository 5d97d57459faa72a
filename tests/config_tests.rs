use std::fs;
use std::path::PathBuf;

use avdegrade::capture::frame::PixelFormat;
use avdegrade::pipeline::sync::WaitPolicy;
use avdegrade::{Config, Error, VideoBackend};

fn write_toml(name: &str, body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("avdegrade-{}-{name}.toml", std::process::id()));
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn toml_file_overrides_defaults() {
    let path = write_toml(
        "override",
        r#"
[video]
backend = "synthetic"
format = "NV12"
width = 320
height = 240

[codec]
quantizer = 40

[pipeline]
wait_policy = "park"

[archive]
after = "/tmp/after.y4m"
"#,
    );
    let config = Config::load(Some(&path)).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(config.video.backend, VideoBackend::Synthetic);
    assert_eq!(config.video.format, PixelFormat::Nv12);
    assert_eq!((config.video.width, config.video.height), (320, 240));
    assert_eq!(config.codec.quantizer, 40);
    assert_eq!(config.pipeline.wait_policy, WaitPolicy::Park);
    assert_eq!(config.archive.after, Some(PathBuf::from("/tmp/after.y4m")));
    assert_eq!(config.archive.before, None);
    // untouched sections keep their defaults
    assert_eq!(config.video.fps, 30);
    assert!(config.audio.enabled);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let path = std::env::temp_dir().join("avdegrade-does-not-exist.toml");
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.codec.quantizer, Config::default().codec.quantizer);
}

#[test]
fn invalid_values_fail_to_load() {
    let path = write_toml("odd", "[video]\nwidth = 321\n");
    let result = Config::load(Some(&path));
    fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn environment_overrides_defaults() {
    std::env::set_var("AVDEGRADE_PIPELINE__DELAY", "5");
    let config = Config::load(None).unwrap();
    std::env::remove_var("AVDEGRADE_PIPELINE__DELAY");
    assert_eq!(config.pipeline.delay, 5);
    assert_eq!(config.audio_delay(), 5);
}
