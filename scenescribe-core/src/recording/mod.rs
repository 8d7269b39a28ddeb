pub mod session;

pub use session::{RecordingArtifact, RecordingSession, CHUNK_FLUSH_PERIOD, PREFERRED_MIME_TYPES};
