//! SRT subtitle rendering.
//!
//! SRT separates seconds from milliseconds with a COMMA (`00:01:05,500`),
//! unlike WebVTT which uses a period. Players reject the wrong punctuation.

use super::track::CaptionInterval;

/// Format a non-negative time offset in seconds as `HH:MM:SS,mmm`.
pub fn format_srt_time(seconds: f64) -> String {
    let hours = (seconds / 3600.0).floor() as u64;
    let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    let millis = ((seconds % 1.0) * 1000.0).round() as u64;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

/// Render intervals as an SRT document: sequential index, timestamp range,
/// text, blank separator line. Empty input yields the empty string.
pub fn render_srt(intervals: &[CaptionInterval]) -> String {
    let mut lines = Vec::new();

    for (i, interval) in intervals.iter().enumerate() {
        lines.push((i + 1).to_string());
        lines.push(format!(
            "{} --> {}",
            format_srt_time(interval.start),
            format_srt_time(interval.end)
        ));
        lines.push(interval.text.clone());
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_srt_time(s: &str) -> f64 {
        let (hms, millis) = s.split_once(',').unwrap();
        let parts: Vec<u64> = hms.split(':').map(|p| p.parse().unwrap()).collect();
        let millis: u64 = millis.parse().unwrap();
        (parts[0] * 3600 + parts[1] * 60 + parts[2]) as f64 + millis as f64 / 1000.0
    }

    #[test]
    fn formats_zero() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
    }

    #[test]
    fn formats_minutes_and_millis() {
        assert_eq!(format_srt_time(65.5), "00:01:05,500");
    }

    #[test]
    fn formats_hours() {
        assert_eq!(format_srt_time(3661.234), "01:01:01,234");
    }

    #[test]
    fn rounds_millis_instead_of_truncating() {
        // 0.234 is not exactly representable; truncation would print 233.
        assert_eq!(format_srt_time(1.234), "00:00:01,234");
        assert_eq!(format_srt_time(7.0004), "00:00:07,000");
    }

    #[test]
    fn empty_track_renders_empty_string() {
        assert_eq!(render_srt(&[]), "");
    }

    #[test]
    fn renders_indexed_blocks_with_blank_separators() {
        let intervals = vec![
            CaptionInterval {
                start: 0.5,
                end: 2.5,
                text: "a red bicycle".to_string(),
            },
            CaptionInterval {
                start: 2.5,
                end: 4.0,
                text: "a person walking".to_string(),
            },
        ];
        let srt = render_srt(&intervals);
        let expected = "1\n00:00:00,500 --> 00:00:02,500\na red bicycle\n\n\
                        2\n00:00:02,500 --> 00:00:04,000\na person walking\n";
        assert_eq!(srt, expected);
    }

    #[test]
    fn timestamps_round_trip_at_millisecond_precision() {
        for &t in &[0.0, 0.001, 59.999, 65.5, 3661.234, 7199.875] {
            let formatted = format_srt_time(t);
            let parsed = parse_srt_time(&formatted);
            assert!(
                (parsed - t).abs() < 0.0005,
                "{t} -> {formatted} -> {parsed}"
            );
        }
    }
}
