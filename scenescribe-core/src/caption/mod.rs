pub mod srt;
pub mod track;

pub use track::{CaptionInterval, CaptionTrack, ERROR_PREFIX};
