use crate::annotation::ObjectId;

/// Faults surfaced by frame retrieval and annotation propagation.
///
/// None of these are retried. Callers are expected to present them as hard
/// stops rather than falling back to partial annotations.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// No frame at or before the target is cached for every tracked object.
    /// Every object is supposed to carry an entry at frame 0, so this means the
    /// annotation store itself is damaged.
    #[error("corrupted object annotations: no frame at or before {frame} is annotated for every object")]
    CorruptedAnnotations { frame: u64 },

    /// A frame was interpolated before its predecessor existed.
    #[error("tracking must be done sequentially: object {object} has no annotation at frame {frame}")]
    OutOfSequence { object: ObjectId, frame: u64 },

    #[error("frame {frame} is not available ({total} frames in source)")]
    MissingFrame { frame: u64, total: u64 },

    #[error("failed to decode frame {frame}: {source}")]
    Decode {
        frame: u64,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported image mime type: {0}")]
    UnsupportedMime(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame source was swapped while a tracking pass was running.
    #[error("frame source was reset while tracking frame {frame}")]
    SourceReset { frame: u64 },

    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("tracker state lock poisoned")]
    Poisoned,
}

pub type TrackResult<T> = std::result::Result<T, TrackError>;
