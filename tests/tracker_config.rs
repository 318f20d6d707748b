use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use keyframe_tracker::config::TrackerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "KEYFRAME_TRACKER_CONFIG",
        "KEYFRAME_TRACKER_IMAGE_EXTENSION",
        "KEYFRAME_TRACKER_IMAGE_MIME",
        "KEYFRAME_TRACKER_IMAGE_CACHE_FRAMES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = TrackerConfig::load().expect("load config");
    assert_eq!(cfg, TrackerConfig::default());
    assert_eq!(cfg.archive().image_extension, ".jpg");
    assert_eq!(cfg.archive().image_mime_type, "image/jpeg");
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(
        br#"{
            "archive": { "image_extension": ".png", "image_mime_type": "image/png" },
            "tracker": { "image_cache_frames": 4 }
        }"#,
    )
    .expect("write config");

    std::env::set_var("KEYFRAME_TRACKER_CONFIG", file.path());
    std::env::set_var("KEYFRAME_TRACKER_IMAGE_CACHE_FRAMES", "32");

    let cfg = TrackerConfig::load().expect("load config");
    assert_eq!(cfg.image_extension, ".png");
    assert_eq!(cfg.image_mime_type, "image/png");
    assert_eq!(cfg.image_cache_frames, 32);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    file.write_all(
        b"[archive]\nimage_extension = \".png\"\nimage_mime_type = \"image/png\"\n\n[tracker]\nimage_cache_frames = 2\n",
    )
    .expect("write config");

    let cfg = TrackerConfig::load_from(file.path()).expect("load config");
    assert_eq!(cfg.image_extension, ".png");
    assert_eq!(cfg.image_cache_frames, 2);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("KEYFRAME_TRACKER_IMAGE_CACHE_FRAMES", "lots");
    assert!(TrackerConfig::load().is_err());
    clear_env();

    std::env::set_var("KEYFRAME_TRACKER_IMAGE_MIME", "video/mp4");
    assert!(TrackerConfig::load().is_err());
    clear_env();

    std::env::set_var("KEYFRAME_TRACKER_IMAGE_CACHE_FRAMES", "0");
    assert!(TrackerConfig::load().is_err());
    clear_env();
}
