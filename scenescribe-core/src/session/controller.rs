//! Top-level orchestrator: owns the sources, the session state machine, and
//! start/stop routing.
//!
//! All mutation of source handles and flags goes through controller methods;
//! the sampling task shares the same state behind a cooperative mutex and a
//! generation counter, so a stopped or switched-away tick can never touch
//! the new source.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::inference::{InferenceBackend, Provider};
use crate::recording::{RecordingArtifact, RecordingSession};
use crate::source::camera::{CameraDriver, CameraInfo, CameraSource};
use crate::source::image::ImageSource;
use crate::source::video::{MediaFile, VideoSource};
use crate::source::{Capture, FrameSource, SourceKind};

use super::events::SessionEvent;
use super::sampler::SamplingLoop;

/// Knobs a UI adapter supplies before starting a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub instruction: String,
    /// Delay between ticks, measured from the end of one tick's work.
    pub period: Duration,
    pub base_url: String,
    pub recording_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instruction: "What do you see?".to_string(),
            period: Duration::from_millis(500),
            base_url: Provider::LlamaCpp.default_base_url().to_string(),
            recording_enabled: false,
        }
    }
}

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub active: Option<SourceKind>,
    pub is_sampling: bool,
    pub is_recording: bool,
}

/// State shared between the controller and the sampling task.
pub(crate) struct SessionCore {
    pub camera: Option<CameraSource>,
    pub video: VideoSource,
    pub image: ImageSource,
    pub active: Option<SourceKind>,
    pub client: Arc<dyn InferenceBackend>,
    pub config: SessionConfig,
    pub events: broadcast::Sender<SessionEvent>,
    /// Bumped on every stop and source switch; ticks from an older
    /// generation discard their results.
    pub generation: u64,
}

impl SessionCore {
    pub fn active_source_mut(&mut self) -> Option<&mut dyn FrameSource> {
        match self.active? {
            SourceKind::Camera => self
                .camera
                .as_mut()
                .map(|camera| camera as &mut dyn FrameSource),
            SourceKind::Video => Some(&mut self.video as &mut dyn FrameSource),
            SourceKind::Image => Some(&mut self.image as &mut dyn FrameSource),
        }
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

fn has_supported_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Owns which source is active and routes start/stop requests to the
/// sampling loop and the recording session.
pub struct SessionController {
    core: Arc<Mutex<SessionCore>>,
    sampler: SamplingLoop,
    recorder: RecordingSession,
    state: SessionState,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(client: Arc<dyn InferenceBackend>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let core = SessionCore {
            camera: None,
            video: VideoSource::new(),
            image: ImageSource::new(),
            active: None,
            client,
            config,
            events: events.clone(),
            generation: 0,
        };
        Self {
            core: Arc::new(Mutex::new(core)),
            sampler: SamplingLoop::new(),
            recorder: RecordingSession::new(),
            state: SessionState::default(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Plug in a camera driver; without one the camera source is absent.
    pub async fn attach_camera(&self, driver: Box<dyn CameraDriver>) {
        let mut core = self.core.lock().await;
        core.camera = Some(CameraSource::new(driver));
    }

    pub async fn set_instruction(&self, instruction: impl Into<String>) {
        self.core.lock().await.config.instruction = instruction.into();
    }

    pub async fn set_period(&self, period: Duration) {
        self.core.lock().await.config.period = period;
    }

    pub async fn set_recording_enabled(&self, enabled: bool) {
        self.core.lock().await.config.recording_enabled = enabled;
    }

    /// Make a source active, or `None` to deactivate.
    ///
    /// Stops the sampling loop first when it is running; leaving the camera
    /// releases its hardware handle, entering it reacquires one. A camera
    /// that fails to come up is reported and left inactive.
    pub async fn switch_source(&mut self, new: Option<SourceKind>) -> Result<()> {
        if self.state.is_sampling {
            self.stop_sampling().await;
        }

        let core_arc = self.core.clone();
        let mut core = core_arc.lock().await;
        core.generation = core.generation.wrapping_add(1);
        let old = core.active;

        if old == Some(SourceKind::Camera) && new != Some(SourceKind::Camera) {
            // A recording cannot outlive its camera session.
            self.stop_recording_if_active(&mut core).await;
            if let Some(camera) = core.camera.as_mut() {
                camera.pause();
            }
        }

        if new == Some(SourceKind::Camera) && old != Some(SourceKind::Camera) {
            let result = match core.camera.as_mut() {
                Some(camera) => camera.resume(),
                None => Err(anyhow::anyhow!("No camera attached")),
            };
            if let Err(e) = result {
                core.active = None;
                self.state.active = None;
                core.emit(SessionEvent::Status(format!(
                    "Error: camera unavailable: {e:#}"
                )));
                return Err(e);
            }
        }

        core.active = new;
        self.state.active = new;
        info!(?new, "Active source switched");
        Ok(())
    }

    /// Start a session on the active source.
    ///
    /// For a static image this performs one immediate inference call and
    /// returns without entering `Sampling`. For camera and video it starts
    /// the periodic loop, preceded by the recording session when enabled
    /// (camera only).
    pub async fn request_start(&mut self) -> Result<()> {
        anyhow::ensure!(!self.state.is_sampling, "Already sampling");

        let mut core = self.core.lock().await;
        let base_url = core.config.base_url.clone();
        if !has_supported_scheme(&base_url) {
            core.emit(SessionEvent::Response(
                "Error: invalid base URL. Must start with http:// or https://".to_string(),
            ));
            anyhow::bail!("Invalid base URL '{base_url}'");
        }

        match core.active {
            None => anyhow::bail!("No active source"),
            Some(SourceKind::Image) => {
                let outcome = core.image.capture()?;
                let instruction = core.config.instruction.clone();
                let client = core.client.clone();
                let events = core.events.clone();
                drop(core);

                match outcome {
                    Capture::NotReady => {
                        let _ = events.send(SessionEvent::Status("No image loaded.".to_string()));
                    }
                    Capture::Frame(frame) => {
                        let text = match client.describe(&instruction, &frame).await {
                            Ok(text) => text,
                            Err(e) => e.display_message(),
                        };
                        let _ = events.send(SessionEvent::Response(text));
                    }
                }
                Ok(())
            }
            Some(kind) => {
                match kind {
                    SourceKind::Camera => {
                        let recording_enabled = core.config.recording_enabled;
                        let camera = core.camera.as_mut().context("No camera attached")?;
                        anyhow::ensure!(camera.is_live(), "Camera not available. Cannot start.");
                        if recording_enabled {
                            self.recorder.start(camera)?;
                            camera.start_caption_clock();
                            self.state.is_recording = true;
                            core.emit(SessionEvent::RecordingChanged { active: true });
                        }
                    }
                    SourceKind::Video => {
                        anyhow::ensure!(core.video.is_loaded(), "No video loaded. Cannot start.");
                    }
                    SourceKind::Image => unreachable!(),
                }

                let period = core.config.period;
                let generation = core.generation;
                drop(core);

                self.sampler.start(self.core.clone(), period, generation)?;
                self.state.is_sampling = true;
                let _ = self.events.send(SessionEvent::SamplingChanged { active: true });
                let _ = self
                    .events
                    .send(SessionEvent::Status("Processing started...".to_string()));
                Ok(())
            }
        }
    }

    /// Stop sampling and recording, then surface whatever the session
    /// produced (recording artifact, exportable captions).
    pub async fn request_stop(&mut self) -> Result<()> {
        self.stop_sampling().await;

        let core_arc = self.core.clone();
        let mut core = core_arc.lock().await;
        self.stop_recording_if_active(&mut core).await;

        if core.active == Some(SourceKind::Video) {
            let captioned = core.video.caption_track().map_or(0, |track| track.len());
            if captioned > 0 {
                core.emit(SessionEvent::CaptionsReady {
                    intervals: captioned,
                });
            }
        }
        core.emit(SessionEvent::Status("Processing stopped.".to_string()));
        Ok(())
    }

    /// Finalize the recording session and announce its products.
    async fn stop_recording_if_active(&mut self, core: &mut SessionCore) {
        if !self.state.is_recording {
            return;
        }
        if let Some(camera) = core.camera.as_mut() {
            self.recorder.stop(camera).await;
            camera.stop_caption_clock();
        }
        self.state.is_recording = false;
        core.emit(SessionEvent::RecordingChanged { active: false });

        if let Some(artifact) = self.recorder.collected_artifact() {
            core.emit(SessionEvent::RecordingReady {
                mime_type: artifact.mime_type.clone(),
                byte_len: artifact.byte_len(),
            });
        }
        let captioned = core
            .camera
            .as_ref()
            .and_then(|camera| camera.caption_track())
            .map_or(0, |track| track.len());
        if captioned > 0 {
            core.emit(SessionEvent::CaptionsReady {
                intervals: captioned,
            });
        }
    }

    async fn stop_sampling(&mut self) {
        self.sampler.stop();
        let mut core = self.core.lock().await;
        core.generation = core.generation.wrapping_add(1);
        if self.state.is_sampling {
            self.state.is_sampling = false;
            core.emit(SessionEvent::SamplingChanged { active: false });
        }
    }

    /// SRT for the active source's captions; `None` means nothing to export.
    pub async fn captions_srt(&self) -> Option<String> {
        let core = self.core.lock().await;
        let track = match core.active? {
            SourceKind::Camera => core.camera.as_ref()?.caption_track(),
            SourceKind::Video => core.video.caption_track(),
            SourceKind::Image => None,
        }?;
        (!track.is_empty()).then(|| track.to_srt())
    }

    /// Hand over the finished recording for saving.
    pub fn take_recording(&mut self) -> Option<RecordingArtifact> {
        self.recorder.take_artifact()
    }

    // Camera passthroughs.

    pub async fn list_camera_devices(&self) -> Result<Vec<CameraInfo>> {
        let mut core = self.core.lock().await;
        let camera = core.camera.as_mut().context("No camera attached")?;
        camera.list_devices()
    }

    /// Switch the live camera to another device. Safe while sampling: the
    /// handle swap is atomic under the core lock.
    pub async fn switch_camera_device(&self, device_id: Option<&str>) -> Result<()> {
        let mut core = self.core.lock().await;
        let camera = core.camera.as_mut().context("No camera attached")?;
        camera.switch_to(device_id)?;
        core.emit(SessionEvent::Status("Camera switched.".to_string()));
        Ok(())
    }

    // Video passthroughs.

    pub async fn load_video(&self, media: Box<dyn MediaFile>) {
        let mut core = self.core.lock().await;
        core.video.load(media);
        core.emit(SessionEvent::Status("Video loaded.".to_string()));
    }

    pub async fn video_play(&self) {
        self.core.lock().await.video.play();
    }

    pub async fn video_pause(&self) {
        self.core.lock().await.video.pause();
    }

    pub async fn video_stop(&self) {
        self.core.lock().await.video.stop();
    }

    pub async fn video_seek_to(&self, position: f64) {
        self.core.lock().await.video.seek_to(position);
    }

    pub async fn video_seek_by(&self, delta: f64) {
        self.core.lock().await.video.seek_by(delta);
    }

    pub async fn video_step_frame(&self) {
        self.core.lock().await.video.step_frame();
    }

    pub async fn video_set_rate(&self, rate: f64) {
        self.core.lock().await.video.set_rate(rate);
    }

    pub async fn video_toggle_loop(&self) -> bool {
        self.core.lock().await.video.toggle_loop()
    }

    pub async fn video_position(&self) -> f64 {
        self.core.lock().await.video.current_position()
    }

    // Image passthrough.

    pub async fn load_image(&self, path: &Path) -> Result<()> {
        let mut core = self.core.lock().await;
        core.image.load(path)?;
        core.emit(SessionEvent::Status("Image loaded.".to_string()));
        Ok(())
    }
}
