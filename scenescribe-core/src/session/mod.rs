//! Session orchestration: state, scheduling, and the event surface.

pub mod controller;
pub mod events;
pub mod sampler;

pub use controller::{SessionConfig, SessionController, SessionState};
pub use events::SessionEvent;
pub use sampler::SamplingLoop;
