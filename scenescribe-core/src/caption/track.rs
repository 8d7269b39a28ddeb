//! Append-only caption ledger with gap-free, non-overlapping intervals.

use super::srt::render_srt;

/// Prefix carried by every user-visible failure message. Text starting with
/// it is displayed but never stored as a caption.
pub const ERROR_PREFIX: &str = "Error:";

/// One subtitle: `[start, end)` in seconds on the source clock, plus text.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionInterval {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Time-ordered caption intervals for one source.
///
/// The track keeps a boundary cursor: the end of the most recently appended
/// interval. The next interval starts there, so captures arriving at
/// irregular, latency-dependent times still produce a contiguous timeline
/// with no gaps and no overlaps.
#[derive(Debug, Default)]
pub struct CaptionTrack {
    intervals: Vec<CaptionInterval>,
    last_boundary: Option<f64>,
}

impl CaptionTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a caption ending at `clock` seconds.
    ///
    /// The interval starts at the previous boundary (or at `clock` for the
    /// very first call, which yields a zero-length interval and is
    /// discarded). Intervals are stored only when strictly positive in
    /// duration, non-empty, and not failure text. The boundary always
    /// advances to `clock`, so a skipped tick still anchors the next
    /// interval's start instead of inflating its duration.
    pub fn append(&mut self, text: &str, clock: f64) {
        let start = self.last_boundary.unwrap_or(clock);
        let end = clock;
        let trimmed = text.trim();

        if end > start && !trimmed.is_empty() && !trimmed.starts_with(ERROR_PREFIX) {
            self.intervals.push(CaptionInterval {
                start,
                end,
                text: trimmed.to_string(),
            });
        }

        self.last_boundary = Some(clock);
    }

    /// Drop all intervals and the boundary cursor. Called when a new capture
    /// session begins on this source (new recording, new file load).
    pub fn reset(&mut self) {
        self.intervals.clear();
        self.last_boundary = None;
    }

    pub fn intervals(&self) -> &[CaptionInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Render the track as an SRT document. Empty string means "nothing to
    /// export", not an error.
    pub fn to_srt(&self) -> String {
        render_srt(&self.intervals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_append_is_zero_length_and_discarded() {
        let mut track = CaptionTrack::new();
        track.append("a desk with a lamp", 1.0);
        assert!(track.is_empty());
    }

    #[test]
    fn second_append_starts_at_previous_boundary() {
        let mut track = CaptionTrack::new();
        track.append("first", 1.0);
        track.append("second", 3.5);
        assert_eq!(
            track.intervals(),
            &[CaptionInterval {
                start: 1.0,
                end: 3.5,
                text: "second".to_string(),
            }]
        );
    }

    #[test]
    fn intervals_are_gapless_and_non_overlapping() {
        let mut track = CaptionTrack::new();
        let clocks = [0.4, 1.1, 2.9, 3.0, 7.25, 9.6];
        for (i, &t) in clocks.iter().enumerate() {
            track.append(&format!("caption {i}"), t);
        }

        let intervals = track.intervals();
        assert_eq!(intervals.len(), clocks.len() - 1);
        for w in intervals.windows(2) {
            assert_eq!(w[1].start, w[0].end);
        }
        for iv in intervals {
            assert!(iv.end > iv.start);
        }
    }

    #[test]
    fn failure_text_is_not_stored_but_advances_the_boundary() {
        let mut track = CaptionTrack::new();
        track.append("ok", 1.0);
        track.append("Error: server returned 404", 2.0);
        track.append("a parked car", 3.0);

        let intervals = track.intervals();
        assert_eq!(intervals.len(), 2);
        // The failed tick moved the boundary to 2.0, so the last caption
        // covers [2.0, 3.0) rather than stretching back to 1.0.
        assert_eq!(intervals[1].start, 2.0);
        assert_eq!(intervals[1].end, 3.0);
    }

    #[test]
    fn empty_and_whitespace_text_is_skipped() {
        let mut track = CaptionTrack::new();
        track.append("ok", 1.0);
        track.append("", 2.0);
        track.append("   ", 3.0);
        track.append("visible", 4.0);

        assert_eq!(track.len(), 2);
        assert_eq!(track.intervals()[1].start, 3.0);
    }

    #[test]
    fn stored_text_is_trimmed() {
        let mut track = CaptionTrack::new();
        track.append("x", 1.0);
        track.append("  a cat on a sofa \n", 2.0);
        assert_eq!(track.intervals()[0].text, "a cat on a sofa");
    }

    #[test]
    fn equal_clock_produces_no_interval() {
        let mut track = CaptionTrack::new();
        track.append("a", 1.0);
        track.append("b", 1.0);
        assert!(track.is_empty());
    }

    #[test]
    fn reset_clears_intervals_and_boundary() {
        let mut track = CaptionTrack::new();
        track.append("a", 1.0);
        track.append("b", 2.0);
        track.reset();
        assert!(track.is_empty());

        // After reset the next append is treated as a first call again.
        track.append("c", 5.0);
        assert!(track.is_empty());
        track.append("d", 6.0);
        assert_eq!(track.intervals()[0].start, 5.0);
    }

    #[test]
    fn to_srt_on_empty_track_is_empty() {
        assert_eq!(CaptionTrack::new().to_srt(), "");
    }

    #[test]
    fn to_srt_renders_appended_intervals() {
        let mut track = CaptionTrack::new();
        track.append("warming up", 0.5);
        track.append("a whiteboard with diagrams", 2.5);
        let srt = track.to_srt();
        assert!(srt.starts_with("1\n00:00:00,500 --> 00:00:02,500\n"));
        assert!(srt.contains("a whiteboard with diagrams"));
    }
}
