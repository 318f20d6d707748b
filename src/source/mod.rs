//! Frame sources.
//!
//! A frame source exposes a dense, zero-based sequence of encoded images:
//! - `EmptySource`: the default, reports zero frames
//! - `ArchiveFrameSource`: zip container of `0.ext, 1.ext, ...`
//!
//! The active source is held by `FrameSourceManager`, which notifies
//! dependents when it is swapped so they can drop per-source caches.
//!
//! Sources hand back opaque `ImageBlob`s. Decoding is the job of
//! `crate::decode::ImageDecoder`.

pub mod archive;
pub mod manager;

pub use archive::{ArchiveConfig, ArchiveFrameSource};
pub use manager::{FrameSourceManager, ResetSubscription};

use async_trait::async_trait;

use crate::error::{TrackError, TrackResult};

/// Encoded image bytes tagged with their MIME type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// A numbered sequence of frames.
///
/// Frame numbers are dense from 0 to `total_frames() - 1`. Callers must only
/// request frames in that range; anything else fails with
/// `TrackError::MissingFrame`.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    fn total_frames(&self) -> u64;

    /// Fetch the encoded image for a frame.
    async fn get_frame(&self, frame_number: u64) -> TrackResult<ImageBlob>;
}

/// Source with no frames. Installed until a real source is loaded.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySource;

#[async_trait]
impl FrameSource for EmptySource {
    fn name(&self) -> &str {
        "empty"
    }

    fn total_frames(&self) -> u64 {
        0
    }

    async fn get_frame(&self, frame_number: u64) -> TrackResult<ImageBlob> {
        Err(TrackError::MissingFrame {
            frame: frame_number,
            total: 0,
        })
    }
}
