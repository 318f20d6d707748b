//! Keyframe annotation propagation for video labeling.
//!
//! A human labels a sparse set of keyframes per object. This crate turns
//! those into a box (or explicit absence) at every frame of the sequence by
//! carrying the last known box forward, and tracks how long a stationary
//! object has been held in place.
//!
//! # Module Structure
//!
//! - `annotation`: BoundingBox, AnnotatedFrame, AnnotatedObject (keyframe store)
//! - `source`: FrameSource trait, EmptySource, ArchiveFrameSource, FrameSourceManager
//! - `decode`: ImageDecoder trait and the `image` crate backend
//! - `tracker`: AnnotationTracker (resume-point search, sequential forward pass)
//! - `export`: whole-clip per-frame view
//! - `keyframes`: keyframe import for the `propagate` tool
//! - `config`: layered file + environment configuration
//!
//! # Invariants
//!
//! 1. **Origin frame**: after any insertion an object has an entry at frame 0.
//! 2. **Causal order**: frame `i` is tracked only after frame `i - 1`, one
//!    request at a time.
//! 3. **Memoization**: interpolated frames are stored and never recomputed;
//!    stores only shrink when the frame source is reset.

pub mod annotation;
pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod keyframes;
pub mod source;
pub mod tracker;

pub use annotation::{
    AnnotatedFrame, AnnotatedObject, BoundingBox, ObjectId, STATIONARY_REFRESH_INTERVAL,
};
pub use config::TrackerConfig;
pub use decode::{DecodedFrame, ImageCrateDecoder, ImageDecoder};
pub use error::{TrackError, TrackResult};
pub use export::ClipExport;
pub use keyframes::KeyframeFile;
pub use source::{
    ArchiveConfig, ArchiveFrameSource, EmptySource, FrameSource, FrameSourceManager, ImageBlob,
    ResetSubscription,
};
pub use tracker::{AnnotationTracker, FrameWithObjects, TrackedObject};
