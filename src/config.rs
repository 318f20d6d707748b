use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::source::archive::{ArchiveConfig, DEFAULT_IMAGE_EXTENSION, DEFAULT_IMAGE_MIME_TYPE};

const DEFAULT_IMAGE_CACHE_FRAMES: usize = 16;

const ENV_CONFIG: &str = "KEYFRAME_TRACKER_CONFIG";
const ENV_IMAGE_EXTENSION: &str = "KEYFRAME_TRACKER_IMAGE_EXTENSION";
const ENV_IMAGE_MIME: &str = "KEYFRAME_TRACKER_IMAGE_MIME";
const ENV_IMAGE_CACHE_FRAMES: &str = "KEYFRAME_TRACKER_IMAGE_CACHE_FRAMES";

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    archive: Option<ArchiveConfigFile>,
    tracker: Option<TrackerSectionFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ArchiveConfigFile {
    image_extension: Option<String>,
    image_mime_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerSectionFile {
    image_cache_frames: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub image_extension: String,
    pub image_mime_type: String,
    /// Decoded frames kept for repeat requests.
    pub image_cache_frames: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            image_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            image_mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
            image_cache_frames: DEFAULT_IMAGE_CACHE_FRAMES,
        }
    }
}

impl TrackerConfig {
    /// Defaults, then the file named by `KEYFRAME_TRACKER_CONFIG`, then
    /// individual environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(ENV_CONFIG).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, still honoring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn archive(&self) -> ArchiveConfig {
        ArchiveConfig {
            image_extension: self.image_extension.clone(),
            image_mime_type: self.image_mime_type.clone(),
        }
    }

    fn from_file(file: TrackerConfigFile) -> Self {
        let defaults = Self::default();
        let image_extension = file
            .archive
            .as_ref()
            .and_then(|archive| archive.image_extension.clone())
            .unwrap_or(defaults.image_extension);
        let image_mime_type = file
            .archive
            .and_then(|archive| archive.image_mime_type)
            .unwrap_or(defaults.image_mime_type);
        let image_cache_frames = file
            .tracker
            .and_then(|tracker| tracker.image_cache_frames)
            .unwrap_or(defaults.image_cache_frames);
        Self {
            image_extension,
            image_mime_type,
            image_cache_frames,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(extension) = std::env::var(ENV_IMAGE_EXTENSION) {
            if !extension.trim().is_empty() {
                self.image_extension = extension.trim().to_string();
            }
        }
        if let Ok(mime) = std::env::var(ENV_IMAGE_MIME) {
            if !mime.trim().is_empty() {
                self.image_mime_type = mime.trim().to_string();
            }
        }
        if let Ok(frames) = std::env::var(ENV_IMAGE_CACHE_FRAMES) {
            if !frames.trim().is_empty() {
                self.image_cache_frames = frames.trim().parse().map_err(|_| {
                    anyhow!("{} must be a positive integer", ENV_IMAGE_CACHE_FRAMES)
                })?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.image_extension.starts_with('.') || self.image_extension.len() < 2 {
            return Err(anyhow!(
                "image extension must look like \".jpg\", got {:?}",
                self.image_extension
            ));
        }
        if self.image_extension.contains(['/', '\\']) {
            return Err(anyhow!("image extension must not contain path separators"));
        }
        crate::decode::format_for_mime(&self.image_mime_type)
            .map_err(|e| anyhow!("invalid image mime type: {}", e))?;
        if self.image_cache_frames == 0 {
            return Err(anyhow!("image cache must hold at least one frame"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<TrackerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
