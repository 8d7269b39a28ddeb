//! Vision inference over an OpenAI-compatible chat completions endpoint.

pub mod client;
pub mod types;

pub use client::InferenceClient;
pub use types::{InferenceError, Provider};

use futures::future::BoxFuture;

use crate::source::FramePayload;

/// Seam between the sampling loop and the transport, so scheduling logic
/// can run against a scripted double instead of a live server.
pub trait InferenceBackend: Send + Sync {
    /// Describe one frame. Failures come back as values, never panics.
    fn describe<'a>(
        &'a self,
        instruction: &'a str,
        frame: &'a FramePayload,
    ) -> BoxFuture<'a, Result<String, InferenceError>>;
}
