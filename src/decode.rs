//! Image decoding.
//!
//! `ImageDecoder` turns an encoded `ImageBlob` into pixels the annotation
//! surface can draw on. The tracker fetches and decodes each frame once and
//! shares the result across every object processed for that frame.

use image::{GenericImageView, ImageFormat, RgbImage};

use crate::error::{TrackError, TrackResult};
use crate::source::ImageBlob;

/// Decoded frame in RGB8.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFrame {
    pub frame_number: u64,
    pub image: RgbImage,
}

impl DecodedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decoder backend.
///
/// Decode failures are unrecoverable for the frame in question.
pub trait ImageDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, frame_number: u64, blob: &ImageBlob) -> TrackResult<DecodedFrame>;
}

/// Decoder built on the `image` crate. The blob's MIME type selects the codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn decode(&self, frame_number: u64, blob: &ImageBlob) -> TrackResult<DecodedFrame> {
        let format = format_for_mime(&blob.mime_type)?;
        let image = image::load_from_memory_with_format(&blob.bytes, format).map_err(|source| {
            TrackError::Decode {
                frame: frame_number,
                source,
            }
        })?;
        let (width, height) = image.dimensions();
        log::debug!(
            "decoded frame {} ({}x{}, {} bytes)",
            frame_number,
            width,
            height,
            blob.bytes.len()
        );
        Ok(DecodedFrame {
            frame_number,
            image: image.into_rgb8(),
        })
    }
}

/// Codec for a MIME type, or `UnsupportedMime`.
pub fn format_for_mime(mime_type: &str) -> TrackResult<ImageFormat> {
    ImageFormat::from_mime_type(mime_type)
        .ok_or_else(|| TrackError::UnsupportedMime(mime_type.to_string()))
}
