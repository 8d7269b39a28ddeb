//! Events the core broadcasts for a UI adapter to render.
//!
//! The core has no display of its own; adapters subscribe and mirror these
//! into whatever surface they drive (terminal, DOM, window).

/// One session-visible happening.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Model output or failure text, to display verbatim.
    Response(String),

    /// Transient status line: start/stop notices, skipped ticks.
    Status(String),

    /// Controls should reflect the sampling loop starting or stopping.
    SamplingChanged { active: bool },

    RecordingChanged { active: bool },

    /// A finished recording is ready to save; fetch it with
    /// `SessionController::take_recording`.
    RecordingReady { mime_type: String, byte_len: usize },

    /// Captions exist for export; fetch them with
    /// `SessionController::captions_srt`.
    CaptionsReady { intervals: usize },
}
