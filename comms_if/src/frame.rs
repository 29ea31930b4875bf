//! # Camera Frame Types
//!
//! A [`CamFrame`] is a formatted (PNG or JPEG) image as it travels over the
//! wire, a [`CamImage`] is its decoded in-memory form. JSON transports carry
//! frame data as base64 strings, so conversions to and from base64 live here
//! too.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use image::{DynamicImage, ImageResult, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An individual formatted frame from a camera
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CamFrame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// The format of this frame
    pub format: FrameFormat,

    /// The formatted image data
    pub data: Vec<u8>,
}

/// A decoded camera frame
#[derive(Clone)]
pub struct CamImage {
    /// UTC timestamp at which the frame was acquired
    pub timestamp: DateTime<Utc>,

    /// The image itself
    pub image: DynamicImage,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible formats for camera frames. This is used rather than
/// `image::ImageFormat` to:
///     1. Restrict the formats that can be sent back and forth
///     2. Allow serialisation as `image::ImageFormat` does not implement
///        serde.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum FrameFormat {
    /// PNG image
    Png,

    /// JPEG image with a quality value between 1 and 100, where 100 is best.
    Jpeg(u8),
}

/// Errors rasied while decoding a frame from the wire.
#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("Frame data is not valid base64: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Frame data is not a valid image: {0}")]
    ImageError(#[from] image::ImageError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamFrame {
    /// Build a frame from base64 wire data.
    pub fn from_base64(
        timestamp: DateTime<Utc>,
        format: FrameFormat,
        base64_data: &str,
    ) -> Result<Self, FrameDecodeError> {
        Ok(Self {
            timestamp,
            format,
            data: base64::decode(base64_data)?,
        })
    }

    /// Encode this frame's data as a base64 string for JSON transports.
    pub fn to_base64(&self) -> String {
        base64::encode(&self.data)
    }

    /// Convert this camera frame into a camera image
    pub fn to_cam_image(&self) -> ImageResult<CamImage> {
        // Convert the data
        let image = match self.format {
            FrameFormat::Png => {
                image::load_from_memory_with_format(&self.data, image::ImageFormat::Png)?
            }
            FrameFormat::Jpeg(_) => {
                image::load_from_memory_with_format(&self.data, image::ImageFormat::Jpeg)?
            }
        };

        Ok(CamImage {
            timestamp: self.timestamp,
            image,
        })
    }
}

impl CamImage {
    /// Wrap a decoded RGB image in a camera image.
    pub fn from_rgb(timestamp: DateTime<Utc>, image: RgbImage) -> Self {
        Self {
            timestamp,
            image: DynamicImage::ImageRgb8(image),
        }
    }

    /// Get the 8 bit RGB form of this image, which is what the perception
    /// pipeline consumes.
    pub fn to_rgb(&self) -> RgbImage {
        self.image.to_rgb8()
    }

    /// Convert this camera image into a camera frame with the given format
    pub fn to_cam_frame(&self, format: FrameFormat) -> ImageResult<CamFrame> {
        // Write data to the buffer
        let mut data = Vec::<u8>::new();

        // Get the output format type
        let output_format = match format {
            FrameFormat::Png => image::ImageOutputFormat::Png,
            FrameFormat::Jpeg(q) => image::ImageOutputFormat::Jpeg(q),
        };

        self.image.write_to(&mut data, output_format)?;

        // Return the frame
        Ok(CamFrame {
            timestamp: self.timestamp,
            format,
            data,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
