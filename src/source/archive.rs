//! Zip-backed frame source.
//!
//! Frames are archive entries named `{index}{image_extension}` with indices
//! dense from 0. Counting stops at the first missing index, so a gap
//! truncates the sequence even when higher-numbered entries exist.
//!
//! The archive is held in memory. Entry extraction runs on the blocking pool.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};
use zip::ZipArchive;

use super::{FrameSource, ImageBlob};
use crate::error::{TrackError, TrackResult};

pub const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/jpeg";

// Upper bound on the buffer reserved from an entry's declared size.
const MAX_ENTRY_PREALLOC: u64 = 16 * 1024 * 1024;

/// Naming and typing of frame entries inside an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Suffix of each frame entry, including the dot (e.g. ".jpg").
    pub image_extension: String,
    /// MIME type attached to every extracted blob.
    pub image_mime_type: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            image_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            image_mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
        }
    }
}

type InMemoryZip = ZipArchive<Cursor<Vec<u8>>>;

/// Frame source over a loaded zip container.
pub struct ArchiveFrameSource {
    name: String,
    config: ArchiveConfig,
    total_frames: u64,
    // ZipArchive reads need `&mut self`.
    archive: Arc<Mutex<InMemoryZip>>,
}

impl ArchiveFrameSource {
    /// Load an archive already read into memory.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: Vec<u8>,
        config: ArchiveConfig,
    ) -> TrackResult<Self> {
        let name = name.into();
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        let total_frames = count_contiguous_frames(archive.file_names(), &config.image_extension);
        log::info!(
            "ArchiveFrameSource: loaded {} ({} frames, {} entries, extension {})",
            name,
            total_frames,
            archive.len(),
            config.image_extension
        );
        Ok(Self {
            name,
            config,
            total_frames,
            archive: Arc::new(Mutex::new(archive)),
        })
    }

    /// Read an archive from a local file.
    pub fn open(path: &Path, config: ArchiveConfig) -> TrackResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(path.display().to_string(), bytes, config)
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }
}

#[async_trait]
impl FrameSource for ArchiveFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    async fn get_frame(&self, frame_number: u64) -> TrackResult<ImageBlob> {
        if frame_number >= self.total_frames {
            return Err(TrackError::MissingFrame {
                frame: frame_number,
                total: self.total_frames,
            });
        }

        let archive = Arc::clone(&self.archive);
        let entry = frame_entry_name(frame_number, &self.config.image_extension);
        let bytes = tokio::task::spawn_blocking(move || -> TrackResult<Vec<u8>> {
            let mut archive = archive.lock().map_err(|_| TrackError::Poisoned)?;
            let mut file = archive.by_name(&entry)?;
            let mut bytes = Vec::with_capacity(entry_capacity_hint(file.size()));
            file.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
        .await
        .map_err(|e| TrackError::Task(e.to_string()))??;

        Ok(ImageBlob::new(bytes, self.config.image_mime_type.clone()))
    }
}

/// Initial buffer size for an entry. The header size is untrusted, so
/// `read_to_end` grows the buffer past the cap when the entry really is larger.
fn entry_capacity_hint(declared_size: u64) -> usize {
    declared_size.min(MAX_ENTRY_PREALLOC) as usize
}

pub fn frame_entry_name(frame_number: u64, image_extension: &str) -> String {
    format!("{}{}", frame_number, image_extension)
}

fn count_contiguous_frames<'a>(names: impl Iterator<Item = &'a str>, image_extension: &str) -> u64 {
    let names: HashSet<&str> = names.collect();
    let mut total = 0u64;
    while names.contains(frame_entry_name(total, image_extension).as_str()) {
        total += 1;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn declared_entry_size_does_not_drive_allocation() {
        assert_eq!(entry_capacity_hint(512), 512);
        assert_eq!(
            entry_capacity_hint(u64::MAX),
            MAX_ENTRY_PREALLOC as usize
        );
    }

    #[test]
    fn gap_truncates_total() {
        let bytes = build_zip(&[("0.jpg", b"a"), ("1.jpg", b"b"), ("3.jpg", b"d")]);
        let source =
            ArchiveFrameSource::from_bytes("gap.zip", bytes, ArchiveConfig::default()).unwrap();
        assert_eq!(source.total_frames(), 2);
    }

    #[test]
    fn other_extensions_are_ignored() {
        let bytes = build_zip(&[("0.png", b"a"), ("1.png", b"b"), ("0.jpg", b"c")]);
        let config = ArchiveConfig {
            image_extension: ".png".to_string(),
            image_mime_type: "image/png".to_string(),
        };
        let source = ArchiveFrameSource::from_bytes("png.zip", bytes, config).unwrap();
        assert_eq!(source.total_frames(), 2);
    }

    #[test]
    fn missing_zero_means_no_frames() {
        let bytes = build_zip(&[("1.jpg", b"b"), ("2.jpg", b"c")]);
        let source =
            ArchiveFrameSource::from_bytes("late.zip", bytes, ArchiveConfig::default()).unwrap();
        assert_eq!(source.total_frames(), 0);
    }

    #[tokio::test]
    async fn get_frame_tags_blob_with_mime_type() {
        let bytes = build_zip(&[("0.jpg", b"zero"), ("1.jpg", b"one")]);
        let source =
            ArchiveFrameSource::from_bytes("two.zip", bytes, ArchiveConfig::default()).unwrap();

        let blob = source.get_frame(1).await.unwrap();
        assert_eq!(blob.bytes, b"one".to_vec());
        assert_eq!(blob.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn frame_past_the_gap_is_missing() {
        let bytes = build_zip(&[("0.jpg", b"a"), ("1.jpg", b"b"), ("3.jpg", b"d")]);
        let source =
            ArchiveFrameSource::from_bytes("gap.zip", bytes, ArchiveConfig::default()).unwrap();

        let err = source.get_frame(3).await.unwrap_err();
        assert!(matches!(
            err,
            TrackError::MissingFrame { frame: 3, total: 2 }
        ));
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let err = ArchiveFrameSource::from_bytes(
            "junk.zip",
            b"not a zip".to_vec(),
            ArchiveConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TrackError::Archive(_)));
    }
}
