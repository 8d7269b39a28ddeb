//! Buffers encoded camera chunks between start and stop into a saveable
//! artifact.

use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::source::camera::{CameraSource, MediaChunk};

/// Encoding preference, best efficiency first. The driver picks the first
/// entry it can produce.
pub const PREFERRED_MIME_TYPES: &[&str] = &[
    "video/webm;codecs=vp9",
    "video/webm",
    "video/x-motion-jpeg",
];

/// How often the camera flushes buffered data while recording.
pub const CHUNK_FLUSH_PERIOD: Duration = Duration::from_secs(1);

/// Chunks can trail in after stop; wait this long for the collector.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(2);

/// The finished recording: chunks in arrival order plus the negotiated
/// encoding.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub chunks: Vec<MediaChunk>,
    pub mime_type: String,
}

impl RecordingArtifact {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum()
    }

    /// Concatenate the chunks into one buffer for saving.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for chunk in self.chunks {
            bytes.extend_from_slice(&chunk.data);
        }
        bytes
    }

    /// File extension matching the negotiated encoding.
    pub fn file_extension(&self) -> &'static str {
        if self.mime_type.starts_with("video/webm") {
            "webm"
        } else if self.mime_type == "video/x-motion-jpeg" {
            "mjpeg"
        } else {
            "bin"
        }
    }

    /// Timestamped name for saving the artifact to disk.
    pub fn suggested_filename(&self) -> String {
        format!(
            "recording-{}.{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            self.file_extension()
        )
    }
}

/// Lifetime-bounded chunk accumulation for a live camera.
#[derive(Default)]
pub struct RecordingSession {
    collector: Option<JoinHandle<Vec<MediaChunk>>>,
    mime_type: Option<String>,
    artifact: Option<RecordingArtifact>,
    active: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Begin buffering from the camera, discarding any prior artifact.
    pub fn start(&mut self, camera: &mut CameraSource) -> Result<()> {
        let stream = camera.begin_recording_chunks(CHUNK_FLUSH_PERIOD, PREFERRED_MIME_TYPES)?;
        info!(mime = stream.mime_type, "Recording started");

        self.artifact = None;
        self.mime_type = Some(stream.mime_type);
        self.active = true;

        let mut receiver = stream.receiver;
        self.collector = Some(tokio::spawn(async move {
            let mut chunks = Vec::new();
            while let Some(chunk) = receiver.recv().await {
                if !chunk.data.is_empty() {
                    chunks.push(chunk);
                }
            }
            chunks
        }));

        Ok(())
    }

    /// Stop buffering. The artifact becomes available once the collector
    /// drains the final chunks; arrival after `stop` is tolerated up to a
    /// bounded wait.
    pub async fn stop(&mut self, camera: &mut CameraSource) {
        if !self.active {
            return;
        }
        camera.end_recording_chunks();
        self.active = false;

        let chunks = match self.collector.take() {
            Some(handle) => match tokio::time::timeout(FINALIZE_TIMEOUT, handle).await {
                Ok(Ok(chunks)) => chunks,
                Ok(Err(e)) => {
                    warn!("Recording collector failed: {e}");
                    Vec::new()
                }
                Err(_) => {
                    warn!("Recording collector did not finish in time; chunks dropped");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mime_type = self
            .mime_type
            .take()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let artifact = RecordingArtifact { chunks, mime_type };
        info!(
            chunks = artifact.chunks.len(),
            bytes = artifact.byte_len(),
            "Recording stopped"
        );
        self.artifact = Some(artifact);
    }

    /// The finished artifact, once any chunks were collected.
    pub fn collected_artifact(&self) -> Option<&RecordingArtifact> {
        self.artifact.as_ref().filter(|a| !a.is_empty())
    }

    /// Hand the artifact over for saving.
    pub fn take_artifact(&mut self) -> Option<RecordingArtifact> {
        self.artifact.take().filter(|a| !a.is_empty())
    }
}
