//! Live camera source: device discovery, handle lifecycle, recording chunks.
//!
//! Hardware access goes through the [`CameraDriver`]/[`CameraHandle`] ports.
//! The source enforces the handle discipline the hardware needs: at most one
//! live handle, always released before a replacement is acquired, and fully
//! released on pause so the device indicator genuinely turns off.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::caption::CaptionTrack;

use super::{Capture, FrameSource, SourceKind};

/// A camera device visible to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub id: String,
    /// Human-readable name. May be empty until a permission probe ran.
    pub label: String,
}

/// Encoded media produced while recording.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub data: Vec<u8>,
}

/// Chunk delivery for one recording: the negotiated encoding plus the
/// channel the driver pushes into.
pub struct ChunkStream {
    pub mime_type: String,
    pub receiver: mpsc::Receiver<MediaChunk>,
}

/// Platform port for camera hardware.
///
/// Implementations must not require more than one handle to be live; callers
/// release the previous handle before opening another.
pub trait CameraDriver: Send {
    /// List devices. Labels may be empty until a handle was opened once.
    fn enumerate(&mut self) -> Result<Vec<CameraInfo>>;

    /// Open a device, the platform default when `device_id` is `None`.
    fn open(&mut self, device_id: Option<&str>) -> Result<Box<dyn CameraHandle>>;
}

/// A live hardware handle. Dropping it releases the device.
pub trait CameraHandle: Send {
    /// Grab one frame; `NotReady` while the device is still warming up.
    fn grab(&mut self) -> Result<Capture>;

    /// Start delivering encoded chunks every `flush`, using the first entry
    /// of `preferred` (best efficiency first) the device supports.
    fn begin_chunks(&mut self, flush: Duration, preferred: &[&str]) -> Result<ChunkStream>;

    /// Stop chunk delivery; the sender side closes once the last buffered
    /// chunk is out.
    fn end_chunks(&mut self);
}

/// The live-camera frame source.
pub struct CameraSource {
    driver: Box<dyn CameraDriver>,
    handle: Option<Box<dyn CameraHandle>>,
    device_id: Option<String>,
    permission_probed: bool,
    track: CaptionTrack,
    clock_origin: Option<tokio::time::Instant>,
}

impl CameraSource {
    pub fn new(driver: Box<dyn CameraDriver>) -> Self {
        Self {
            driver,
            handle: None,
            device_id: None,
            permission_probed: false,
            track: CaptionTrack::new(),
            clock_origin: None,
        }
    }

    /// Enumerate devices with labels populated.
    ///
    /// The first call opens and immediately discards a probe handle so the
    /// platform grants permission and labels become visible; later calls
    /// skip the probe.
    pub fn list_devices(&mut self) -> Result<Vec<CameraInfo>> {
        if !self.permission_probed && self.handle.is_none() {
            let probe = self.driver.open(None)?;
            drop(probe);
            self.permission_probed = true;
            info!("Camera permission probe completed");
        }
        self.driver.enumerate()
    }

    /// Switch to a specific device, tearing down any live handle first.
    /// Never leaves two handles open, including on failure.
    pub fn switch_to(&mut self, device_id: Option<&str>) -> Result<()> {
        self.handle = None;
        let handle = self.driver.open(device_id)?;
        self.handle = Some(handle);
        self.device_id = device_id.map(str::to_string);
        self.permission_probed = true;
        info!(device = device_id.unwrap_or("default"), "Camera acquired");
        Ok(())
    }

    /// Fully release the hardware handle (not merely mute).
    pub fn pause(&mut self) {
        if self.handle.take().is_some() {
            info!("Camera released");
        }
    }

    /// Reacquire the previously selected device if paused.
    pub fn resume(&mut self) -> Result<()> {
        if self.handle.is_none() {
            let device_id = self.device_id.clone();
            self.handle = Some(self.driver.open(device_id.as_deref())?);
            info!("Camera reacquired");
        }
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    pub fn begin_recording_chunks(
        &mut self,
        flush: Duration,
        preferred: &[&str],
    ) -> Result<ChunkStream> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Camera not acquired"))?;
        handle.begin_chunks(flush, preferred)
    }

    pub fn end_recording_chunks(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.end_chunks();
        }
    }

    /// Start the caption clock at the recording origin; clears captions
    /// from any earlier recording.
    pub fn start_caption_clock(&mut self) {
        self.track.reset();
        self.clock_origin = Some(tokio::time::Instant::now());
    }

    pub fn stop_caption_clock(&mut self) {
        self.clock_origin = None;
    }
}

impl FrameSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn capture(&mut self) -> Result<Capture> {
        match self.handle.as_mut() {
            Some(handle) => handle.grab(),
            None => Ok(Capture::NotReady),
        }
    }

    fn clock(&self) -> Option<f64> {
        self.clock_origin.map(|origin| origin.elapsed().as_secs_f64())
    }

    fn caption_track(&self) -> Option<&CaptionTrack> {
        Some(&self.track)
    }

    fn caption_track_mut(&mut self) -> Option<&mut CaptionTrack> {
        Some(&mut self.track)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted driver doubles shared by camera, recording, and session tests.

    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::source::FramePayload;

    /// Records every acquire/release in order so tests can assert the
    /// release-before-acquire discipline.
    #[derive(Default)]
    pub struct DriverLog {
        pub events: Mutex<Vec<String>>,
    }

    impl DriverLog {
        pub fn push(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }

        pub fn snapshot(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    pub struct MockDriver {
        pub log: Arc<DriverLog>,
        pub devices: Vec<CameraInfo>,
        pub fail_open: bool,
    }

    impl MockDriver {
        pub fn new(log: Arc<DriverLog>) -> Self {
            Self {
                log,
                devices: vec![
                    CameraInfo {
                        id: "cam0".to_string(),
                        label: "Front".to_string(),
                    },
                    CameraInfo {
                        id: "cam1".to_string(),
                        label: "Rear".to_string(),
                    },
                ],
                fail_open: false,
            }
        }
    }

    impl CameraDriver for MockDriver {
        fn enumerate(&mut self) -> Result<Vec<CameraInfo>> {
            self.log.push("enumerate");
            Ok(self.devices.clone())
        }

        fn open(&mut self, device_id: Option<&str>) -> Result<Box<dyn CameraHandle>> {
            if self.fail_open {
                anyhow::bail!("Permission denied");
            }
            let id = device_id.unwrap_or("default").to_string();
            self.log.push(format!("open:{id}"));
            Ok(Box::new(MockHandle {
                log: self.log.clone(),
                id,
                warmup_grabs: 0,
                chunk_tx: None,
            }))
        }
    }

    pub struct MockHandle {
        pub log: Arc<DriverLog>,
        pub id: String,
        /// Number of leading grabs that report `NotReady`.
        pub warmup_grabs: usize,
        chunk_tx: Option<mpsc::Sender<MediaChunk>>,
    }

    impl CameraHandle for MockHandle {
        fn grab(&mut self) -> Result<Capture> {
            if self.warmup_grabs > 0 {
                self.warmup_grabs -= 1;
                return Ok(Capture::NotReady);
            }
            Ok(Capture::Frame(FramePayload::from_jpeg(&[
                0xFF, 0xD8, 0xFF, 0xD9,
            ])))
        }

        fn begin_chunks(&mut self, _flush: Duration, preferred: &[&str]) -> Result<ChunkStream> {
            let (tx, rx) = mpsc::channel(32);
            // Deliver two chunks up front; tests that need delayed arrival
            // hold the sender open via `chunk_tx` until `end_chunks`.
            for byte in [1u8, 2] {
                let _ = tx.try_send(MediaChunk {
                    data: vec![byte; 4],
                });
            }
            self.chunk_tx = Some(tx);
            self.log.push("chunks:begin");
            Ok(ChunkStream {
                mime_type: preferred.first().unwrap_or(&"video/webm").to_string(),
                receiver: rx,
            })
        }

        fn end_chunks(&mut self) {
            if let Some(tx) = self.chunk_tx.take() {
                // One final chunk arrives as the sender closes.
                let _ = tx.try_send(MediaChunk { data: vec![3u8; 4] });
                self.log.push("chunks:end");
            }
        }
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            self.log.push(format!("release:{}", self.id));
        }
    }
}
