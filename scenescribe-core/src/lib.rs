//! SceneScribe core: point a camera, a local video file, or a static image
//! at a vision-capable chat completions server and turn the periodic
//! descriptions into a live feed plus gap-free SRT subtitles, optionally
//! recording the camera session.
//!
//! The crate is the orchestration core only. UI adapters subscribe to
//! [`session::SessionEvent`] and drive [`session::SessionController`];
//! hardware and codecs plug in through the `CameraDriver` and `MediaFile`
//! ports (with optional V4L2 and ffmpeg implementations behind the
//! `v4l-camera` and `ffmpeg` features).

pub mod caption;
pub mod inference;
#[cfg(feature = "ffmpeg")]
pub mod media;
pub mod recording;
pub mod session;
pub mod source;
