//! V4L2 camera driver for Linux: MJPEG frames from `/dev/video*`.
//!
//! Frame grabs map a fresh capture stream per call, which keeps the handle
//! free of self-referential stream state. Recording pumps frames from a
//! dedicated thread into the chunk channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;

use super::camera::{CameraDriver, CameraHandle, CameraInfo, ChunkStream, MediaChunk};
use super::{Capture, FramePayload};

/// Driver over the V4L2 device nodes.
#[derive(Default)]
pub struct V4lCameraDriver;

impl V4lCameraDriver {
    pub fn new() -> Self {
        Self
    }
}

impl CameraDriver for V4lCameraDriver {
    fn enumerate(&mut self) -> Result<Vec<CameraInfo>> {
        let nodes = v4l::context::enum_devices();
        Ok(nodes
            .iter()
            .map(|node| CameraInfo {
                id: node.index().to_string(),
                label: node.name().unwrap_or_default(),
            })
            .collect())
    }

    fn open(&mut self, device_id: Option<&str>) -> Result<Box<dyn CameraHandle>> {
        let index: usize = match device_id {
            Some(id) => id
                .parse()
                .with_context(|| format!("Invalid camera id '{id}'"))?,
            None => 0,
        };
        let device =
            Device::new(index).with_context(|| format!("Failed to open /dev/video{index}"))?;
        info!(index, "V4L2 device opened");
        Ok(Box::new(V4lHandle {
            index,
            device,
            recording: None,
        }))
    }
}

struct RecordingPump {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

struct V4lHandle {
    index: usize,
    device: Device,
    recording: Option<RecordingPump>,
}

impl CameraHandle for V4lHandle {
    fn grab(&mut self) -> Result<Capture> {
        let mut stream = match v4l::io::mmap::Stream::new(&self.device, Type::VideoCapture) {
            Ok(stream) => stream,
            Err(e) => {
                // Mapping fails while another stream owns the device
                // (e.g. the recording pump); treat as a warm-up state.
                warn!("V4L2 stream mapping unavailable: {e}");
                return Ok(Capture::NotReady);
            }
        };
        match stream.next() {
            Ok((data, _meta)) if !data.is_empty() => Ok(Capture::Frame(FramePayload::from_jpeg(data))),
            Ok(_) => Ok(Capture::NotReady),
            Err(e) => {
                warn!("V4L2 frame dequeue failed: {e}");
                Ok(Capture::NotReady)
            }
        }
    }

    fn begin_chunks(&mut self, flush: Duration, _preferred: &[&str]) -> Result<ChunkStream> {
        // Without an encoder in the path, the best available encoding is
        // the device's own MJPEG stream, concatenated chunk by chunk.
        let (tx, rx) = mpsc::channel(32);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let index = self.index;

        let thread = std::thread::spawn(move || {
            let Ok(device) = Device::new(index) else {
                warn!(index, "Recording pump could not reopen the device");
                return;
            };
            let Ok(mut stream) = v4l::io::mmap::Stream::new(&device, Type::VideoCapture) else {
                warn!(index, "Recording pump could not map a capture stream");
                return;
            };

            let mut buffer: Vec<u8> = Vec::new();
            let mut last_flush = std::time::Instant::now();
            while !stop_flag.load(Ordering::Relaxed) {
                if let Ok((data, _meta)) = stream.next() {
                    buffer.extend_from_slice(data);
                }
                if last_flush.elapsed() >= flush && !buffer.is_empty() {
                    let chunk = MediaChunk {
                        data: std::mem::take(&mut buffer),
                    };
                    if tx.try_send(chunk).is_err() {
                        warn!("Recording chunk dropped: receiver not keeping up");
                    }
                    last_flush = std::time::Instant::now();
                }
            }
            if !buffer.is_empty() {
                let _ = tx.try_send(MediaChunk { data: buffer });
            }
        });

        self.recording = Some(RecordingPump {
            stop,
            thread: Some(thread),
        });
        Ok(ChunkStream {
            mime_type: "video/x-motion-jpeg".to_string(),
            receiver: rx,
        })
    }

    fn end_chunks(&mut self) {
        if let Some(mut pump) = self.recording.take() {
            pump.stop.store(true, Ordering::Relaxed);
            if let Some(thread) = pump.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for V4lHandle {
    fn drop(&mut self) {
        self.end_chunks();
    }
}
