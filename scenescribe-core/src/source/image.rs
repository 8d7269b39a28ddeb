//! Static image source for single-shot analysis.
//!
//! A static image never produces a clock, so it never participates in the
//! periodic loop; the controller routes it through the one-shot path.

use std::path::Path;

use anyhow::{Context as _, Result};
use tracing::info;

use crate::caption::CaptionTrack;

use super::{Capture, FramePayload, FrameSource, SourceKind};

#[derive(Default)]
pub struct ImageSource {
    payload: Option<FramePayload>,
}

impl ImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an image file and hold its JPEG payload for capture.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let decoded = image::open(path)
            .with_context(|| format!("Failed to decode image '{}'", path.display()))?;
        let rgb = decoded.to_rgb8();
        self.payload = Some(FramePayload::from_rgb(&rgb)?);
        info!(
            path = %path.display(),
            width = rgb.width(),
            height = rgb.height(),
            "Image loaded"
        );
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.payload.is_some()
    }
}

impl FrameSource for ImageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Image
    }

    fn capture(&mut self) -> Result<Capture> {
        Ok(match &self.payload {
            Some(payload) => Capture::Frame(payload.clone()),
            None => Capture::NotReady,
        })
    }

    fn clock(&self) -> Option<f64> {
        None
    }

    fn caption_track(&self) -> Option<&CaptionTrack> {
        None
    }

    fn caption_track_mut(&mut self) -> Option<&mut CaptionTrack> {
        None
    }
}
