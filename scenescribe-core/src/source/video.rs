//! Local video file source with playback transport controls.
//!
//! Decoding goes through the [`MediaFile`] port; the transport (position
//! clock, rate, looping) is plain state so it stays deterministic under
//! test. The playback position doubles as the caption clock.

use anyhow::Result;

use crate::caption::CaptionTrack;

use super::{Capture, FramePayload, FrameSource, SourceKind};

/// Decode port for one loaded media file.
pub trait MediaFile: Send {
    /// Pixel dimensions once the container is probed. `None` maps to a
    /// `NotReady` capture.
    fn dimensions(&self) -> Option<(u32, u32)>;

    fn duration_secs(&self) -> f64;

    /// Nominal frame rate; zero when unknown.
    fn frame_rate(&self) -> f64;

    /// Decode the frame at `position` seconds as a JPEG payload.
    fn frame_at(&mut self, position: f64) -> Result<FramePayload>;
}

/// Playback clock: a base position plus elapsed-at-rate while playing.
#[derive(Debug)]
struct Transport {
    base_position: f64,
    playing_since: Option<tokio::time::Instant>,
    rate: f64,
    looping: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            base_position: 0.0,
            playing_since: None,
            rate: 1.0,
            looping: false,
        }
    }
}

impl Transport {
    fn position(&self, duration: f64) -> f64 {
        let mut pos = self.base_position
            + self
                .playing_since
                .map_or(0.0, |since| since.elapsed().as_secs_f64() * self.rate);
        if duration > 0.0 {
            if self.looping {
                pos %= duration;
            } else if pos > duration {
                pos = duration;
            }
        }
        pos.max(0.0)
    }

    /// Fold elapsed play time into the base so rate/seek changes take
    /// effect from the current position.
    fn rebase(&mut self, duration: f64) {
        self.base_position = self.position(duration);
        if self.playing_since.is_some() {
            self.playing_since = Some(tokio::time::Instant::now());
        }
    }
}

/// The local-video frame source.
pub struct VideoSource {
    media: Option<Box<dyn MediaFile>>,
    transport: Transport,
    track: CaptionTrack,
}

impl Default for VideoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource {
    pub fn new() -> Self {
        Self {
            media: None,
            transport: Transport::default(),
            track: CaptionTrack::new(),
        }
    }

    /// Load a new file, rewinding the transport and clearing captions from
    /// any previous file.
    pub fn load(&mut self, media: Box<dyn MediaFile>) {
        self.media = Some(media);
        self.transport = Transport::default();
        self.track.reset();
    }

    pub fn is_loaded(&self) -> bool {
        self.media.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.playing_since.is_some()
    }

    pub fn is_looping(&self) -> bool {
        self.transport.looping
    }

    pub fn playback_rate(&self) -> f64 {
        self.transport.rate
    }

    fn duration(&self) -> f64 {
        self.media.as_ref().map_or(0.0, |m| m.duration_secs())
    }

    /// Current playback position in seconds; the caption clock.
    pub fn current_position(&self) -> f64 {
        self.transport.position(self.duration())
    }

    pub fn play(&mut self) {
        if self.media.is_some() && self.transport.playing_since.is_none() {
            self.transport.playing_since = Some(tokio::time::Instant::now());
        }
    }

    pub fn pause(&mut self) {
        let duration = self.duration();
        self.transport.base_position = self.transport.position(duration);
        self.transport.playing_since = None;
    }

    /// Pause and rewind to the start.
    pub fn stop(&mut self) {
        self.pause();
        self.transport.base_position = 0.0;
    }

    pub fn seek_to(&mut self, position: f64) {
        let duration = self.duration();
        let clamped = if duration > 0.0 {
            position.clamp(0.0, duration)
        } else {
            position.max(0.0)
        };
        self.transport.base_position = clamped;
        if self.transport.playing_since.is_some() {
            self.transport.playing_since = Some(tokio::time::Instant::now());
        }
    }

    pub fn seek_by(&mut self, delta: f64) {
        let target = self.current_position() + delta;
        self.seek_to(target);
    }

    /// Advance by exactly one frame, pausing first.
    pub fn step_frame(&mut self) {
        self.pause();
        let fps = self.media.as_ref().map_or(0.0, |m| m.frame_rate());
        if fps > 0.0 {
            self.seek_by(1.0 / fps);
        }
    }

    /// Set the playback rate from the current position onward.
    pub fn set_rate(&mut self, rate: f64) {
        if rate <= 0.0 {
            return;
        }
        let duration = self.duration();
        self.transport.rebase(duration);
        self.transport.rate = rate;
    }

    pub fn toggle_loop(&mut self) -> bool {
        let duration = self.duration();
        self.transport.rebase(duration);
        self.transport.looping = !self.transport.looping;
        self.transport.looping
    }
}

impl FrameSource for VideoSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }

    fn capture(&mut self) -> Result<Capture> {
        let duration = self.duration();
        let position = self.transport.position(duration);
        let Some(media) = self.media.as_mut() else {
            return Ok(Capture::NotReady);
        };
        if media.dimensions().is_none() {
            return Ok(Capture::NotReady);
        }
        Ok(Capture::Frame(media.frame_at(position)?))
    }

    fn clock(&self) -> Option<f64> {
        self.media.as_ref().map(|_| self.current_position())
    }

    fn caption_track(&self) -> Option<&CaptionTrack> {
        Some(&self.track)
    }

    fn caption_track_mut(&mut self) -> Option<&mut CaptionTrack> {
        Some(&mut self.track)
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::fake::FakeMedia;
    use super::*;

    fn loaded() -> VideoSource {
        let mut source = VideoSource::new();
        source.load(Box::new(FakeMedia::default()));
        source
    }

    async fn advance_secs(secs: f64) {
        tokio::time::advance(Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn position_advances_only_while_playing() {
        let mut video = loaded();
        assert_eq!(video.current_position(), 0.0);

        advance_secs(1.0).await;
        assert_eq!(video.current_position(), 0.0);

        video.play();
        advance_secs(2.0).await;
        assert!((video.current_position() - 2.0).abs() < 1e-6);

        video.pause();
        advance_secs(5.0).await;
        assert!((video.current_position() - 2.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_scales_elapsed_time_from_the_change_point() {
        let mut video = loaded();
        video.play();
        advance_secs(1.0).await;
        video.set_rate(2.0);
        advance_secs(1.0).await;
        // 1 s at 1x, then 1 s at 2x.
        assert!((video.current_position() - 3.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn seeks_clamp_to_the_file_bounds() {
        let mut video = loaded();
        video.seek_to(25.0);
        assert!((video.current_position() - 10.0).abs() < 1e-6);
        video.seek_by(-99.0);
        assert_eq!(video.current_position(), 0.0);
        video.seek_to(4.5);
        assert!((video.current_position() - 4.5).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn position_clamps_at_the_end_without_looping() {
        let mut video = loaded();
        video.play();
        advance_secs(15.0).await;
        assert!((video.current_position() - 10.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn looping_wraps_the_position() {
        let mut video = loaded();
        video.toggle_loop();
        video.play();
        advance_secs(12.5).await;
        assert!((video.current_position() - 2.5).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn step_frame_pauses_and_advances_one_frame() {
        let mut video = loaded();
        video.play();
        advance_secs(1.0).await;
        video.step_frame();
        assert!(!video.is_playing());
        // 5 fps -> one frame is 200 ms.
        assert!((video.current_position() - 1.2).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_rewinds_to_the_start() {
        let mut video = loaded();
        video.play();
        advance_secs(3.0).await;
        video.stop();
        assert!(!video.is_playing());
        assert_eq!(video.current_position(), 0.0);
    }

    #[test]
    fn capture_before_load_is_not_ready() {
        let mut video = VideoSource::new();
        assert!(matches!(video.capture().unwrap(), Capture::NotReady));
        assert_eq!(video.clock(), None);
    }

    #[test]
    fn capture_before_probe_is_not_ready() {
        let mut video = VideoSource::new();
        video.load(Box::new(FakeMedia {
            probed: false,
            ..FakeMedia::default()
        }));
        assert!(matches!(video.capture().unwrap(), Capture::NotReady));
    }

    #[test]
    fn capture_returns_a_frame_once_probed() {
        let mut video = loaded();
        assert!(matches!(video.capture().unwrap(), Capture::Frame(_)));
    }

    #[test]
    fn loading_a_new_file_resets_captions_and_transport() {
        let mut video = loaded();
        video.seek_to(5.0);
        let track = video.caption_track_mut().unwrap();
        track.append("a", 1.0);
        track.append("b", 2.0);
        assert_eq!(track.len(), 1);

        video.load(Box::new(FakeMedia::default()));
        assert!(video.caption_track().unwrap().is_empty());
        assert_eq!(video.current_position(), 0.0);
    }
}
