//! Input sources that can produce still frames for inference.
//!
//! Three kinds feed a session: a live camera, a local video file, and a
//! static image. They share the [`FrameSource`] capability so the sampling
//! loop and the session controller are written once against it.

pub mod camera;
pub mod image;
pub mod video;

#[cfg(all(feature = "v4l-camera", target_os = "linux"))]
pub mod v4l;

use anyhow::{Context as _, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use ::image::codecs::jpeg::JpegEncoder;
use ::image::RgbImage;

use crate::caption::CaptionTrack;

/// JPEG quality used when re-encoding frames for the wire.
const JPEG_QUALITY: u8 = 80;

/// A still frame encoded as a JPEG data URL, ready to embed in a chat
/// completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload {
    data_url: String,
}

impl FramePayload {
    /// Wrap bytes that are already JPEG-encoded.
    pub fn from_jpeg(bytes: &[u8]) -> Self {
        let encoded = BASE64_STANDARD.encode(bytes);
        Self {
            data_url: format!("data:image/jpeg;base64,{encoded}"),
        }
    }

    /// Encode raw RGB pixels as JPEG and wrap them.
    pub fn from_rgb(image: &RgbImage) -> Result<Self> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
            .encode_image(image)
            .context("Failed to encode frame as JPEG")?;
        Ok(Self::from_jpeg(&buf))
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

/// Outcome of asking a source for a frame.
///
/// `NotReady` is a normal, frequent transient state while the underlying
/// media has no decoded dimensions yet. It is not an error and never
/// reaches the inference client or a caption track.
#[derive(Debug, Clone)]
pub enum Capture {
    Frame(FramePayload),
    NotReady,
}

/// Which input feeds the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Video,
    Image,
}

/// Common capability over the three input kinds.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    /// Grab one still frame, or `NotReady` while the media is warming up.
    fn capture(&mut self) -> Result<Capture>;

    /// Current caption clock in seconds, for sources that caption. `None`
    /// for the static image, and for a camera that is not recording.
    fn clock(&self) -> Option<f64>;

    /// The source's caption ledger, when it has one.
    fn caption_track(&self) -> Option<&CaptionTrack>;

    fn caption_track_mut(&mut self) -> Option<&mut CaptionTrack>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_bytes_become_a_data_url() {
        let payload = FramePayload::from_jpeg(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(payload.data_url().starts_with("data:image/jpeg;base64,"));
        assert_eq!(payload.data_url(), "data:image/jpeg;base64,/9j//9k=");
    }

    #[test]
    fn rgb_pixels_encode_to_a_jpeg_data_url() {
        let img = RgbImage::from_pixel(4, 4, ::image::Rgb([10, 200, 30]));
        let payload = FramePayload::from_rgb(&img).unwrap();
        assert!(payload.data_url().starts_with("data:image/jpeg;base64,"));
        assert!(payload.data_url().len() > "data:image/jpeg;base64,".len());
    }
}
