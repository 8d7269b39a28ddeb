//! ffmpeg-backed implementation of the video decode port.
//!
//! Frames decode forward from the container in presentation order; a seek
//! behind the current position reopens the file and decodes forward again.
//! Good enough for sampling one frame every few hundred milliseconds, with
//! no dependence on container-specific keyframe seeking.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _, Result};
use image::RgbImage;
use tracing::info;

use crate::source::video::MediaFile;
use crate::source::FramePayload;

pub struct FfmpegMediaFile {
    path: PathBuf,
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    /// Seconds per presentation-timestamp tick.
    time_base: f64,
    width: u32,
    height: u32,
    fps: f64,
    duration: f64,
    /// Most recently decoded frame: its presentation time plus the payload.
    current: Option<(f64, FramePayload)>,
    at_eof: bool,
}

// Safety: FfmpegMediaFile is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegMediaFile {}

impl FfmpegMediaFile {
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize ffmpeg")?;

        let ictx = ffmpeg_next::format::input(path)
            .with_context(|| format!("Failed to open '{}'", path.display()))?;

        let (stream_index, time_base, fps, stream_duration) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or_else(|| anyhow!("No video stream found"))?;
            let rate = stream.rate();
            let fps = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            let tb = stream.time_base();
            let time_base = if tb.denominator() != 0 {
                tb.numerator() as f64 / tb.denominator() as f64
            } else {
                0.0
            };
            (
                stream.index(),
                time_base,
                fps,
                stream.duration() as f64 * time_base,
            )
        };

        let decoder = {
            let stream = ictx
                .stream(stream_index)
                .ok_or_else(|| anyhow!("Video stream disappeared during probe"))?;
            ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
                .decoder()
                .video()?
        };

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let container_ticks = ictx.duration();
        let duration = if container_ticks > 0 {
            container_ticks as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
        } else {
            stream_duration.max(0.0)
        };

        info!(
            path = %path.display(),
            width,
            height,
            fps,
            duration,
            "Video opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            width,
            height,
            fps,
            duration,
            current: None,
            at_eof: false,
        })
    }

    /// Decode the next frame in presentation order into `current`.
    /// Returns `false` once the stream is exhausted.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let ts = decoded.pts().unwrap_or(0) as f64 * self.time_base;
                let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
                self.scaler.run(&decoded, &mut rgb_frame)?;
                let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
                let img = RgbImage::from_raw(self.width, self.height, pixels)
                    .ok_or_else(|| anyhow!("Frame buffer does not match dimensions"))?;
                self.current = Some((ts, FramePayload::from_rgb(&img)?));
                return Ok(true);
            }

            if self.at_eof {
                return Ok(false);
            }

            loop {
                let Some((stream, packet)) = self.ictx.packets().next() else {
                    let _ = self.decoder.send_eof();
                    self.at_eof = true;
                    break;
                };
                if stream.index() != self.stream_index {
                    continue;
                }
                let _ = self.decoder.send_packet(&packet);
                break;
            }
        }
    }

    /// Reopen the container to decode from the start again.
    fn rewind(&mut self) -> Result<()> {
        let path = self.path.clone();
        *self = Self::open(&path)?;
        Ok(())
    }
}

impl MediaFile for FfmpegMediaFile {
    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_at(&mut self, position: f64) -> Result<FramePayload> {
        let position = position.max(0.0);

        if let Some((ts, _)) = &self.current {
            if position + 0.001 < *ts {
                self.rewind()?;
            }
        }

        while self.current.as_ref().map_or(true, |(ts, _)| *ts < position) {
            if !self.decode_next()? {
                break;
            }
        }

        self.current
            .as_ref()
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| anyhow!("No decodable frames in '{}'", self.path.display()))
    }
}

/// Copy pixel data out of an ffmpeg frame, stripping per-row padding
/// (stride may exceed width * 3).
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode a short grayscale-ramp MPEG4 clip for decode tests.
    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let value = ((i * 40) % 256) as u8;
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            for row in 0..height as usize {
                for col in 0..width as usize {
                    let offset = row * stride + col * 3;
                    data[offset] = value;
                    data[offset + 1] = value;
                    data[offset + 2] = value;
                }
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));

            encoder.send_frame(&yuv_frame).unwrap();
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(&mut octx).unwrap();
            }
        }

        encoder.send_eof().unwrap();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
        octx.write_trailer().unwrap();
    }

    #[test]
    fn open_probes_dimensions_and_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 10, 160, 120, 10);

        let media = FfmpegMediaFile::open(&path).unwrap();
        assert_eq!(media.dimensions(), Some((160, 120)));
        assert!(media.frame_rate() > 0.0);
        assert!(media.duration_secs() > 0.5);
    }

    #[test]
    fn open_rejects_a_missing_file() {
        assert!(FfmpegMediaFile::open(Path::new("/nonexistent/clip.mp4")).is_err());
    }

    #[test]
    fn frame_at_yields_jpeg_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 10, 160, 120, 10);

        let mut media = FfmpegMediaFile::open(&path).unwrap();
        let payload = media.frame_at(0.0).unwrap();
        assert!(payload.data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn forward_and_backward_positions_both_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 10, 160, 120, 10);

        let mut media = FfmpegMediaFile::open(&path).unwrap();
        media.frame_at(0.5).unwrap();
        // Behind the cursor: forces a reopen-and-decode-forward pass.
        media.frame_at(0.1).unwrap();
        media.frame_at(0.8).unwrap();
    }

    #[test]
    fn position_past_the_end_serves_the_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp4");
        create_test_video(&path, 5, 160, 120, 10);

        let mut media = FfmpegMediaFile::open(&path).unwrap();
        assert!(media.frame_at(99.0).is_ok());
    }
}
