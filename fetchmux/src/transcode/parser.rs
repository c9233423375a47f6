//! Transcoder diagnostic stream parsing.
//!
//! ffmpeg writes two kinds of lines we care about to stderr: the input banner
//! (`Duration: 00:01:30.50, start: ...`) and, with `-progress pipe:2`,
//! `key=value` progress blocks (`out_time_us=90500000`, `progress=continue`).
//! Lines that match nothing are ignored.

use std::sync::LazyLock;

use regex::Regex;

/// Percentage the heartbeat estimate never exceeds.
pub const HEARTBEAT_CAP: u8 = 99;

static DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2})(?:\.\d+)?").unwrap());

static HMS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+):(\d{2}):(\d{2})").unwrap());

static ELAPSED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*out_time_(?:ms|us)=(-?\d+)\s*$").unwrap());

/// Parse the first `H+:MM:SS` group in `text` to whole seconds.
///
/// # Examples
/// ```ignore
/// assert_eq!(parse_hms("01:30:00"), Some(5400));
/// assert_eq!(parse_hms("no time"), None);
/// ```
pub fn parse_hms(text: &str) -> Option<u64> {
    let caps = HMS_REGEX.captures(text)?;
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_add(seconds)
}

/// Total input duration in seconds from a `Duration: HH:MM:SS(.ff)` banner.
///
/// Live inputs report `Duration: N/A`, which does not match.
pub fn parse_duration(line: &str) -> Option<f64> {
    let caps = DURATION_REGEX.captures(line)?;
    parse_hms(&caps[1]).map(|secs| secs as f64)
}

/// Elapsed output time in seconds from an `out_time_ms=` / `out_time_us=` line.
///
/// Both keys carry microseconds (`out_time_ms` is misnamed upstream). ffmpeg
/// reports negative values before the first packet; those clamp to zero.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let caps = ELAPSED_REGEX.captures(line)?;
    let micros: i64 = caps[1].parse().ok()?;
    Some(micros.max(0) as f64 / 1_000_000.0)
}

/// Whether the line closes the final `-progress` block.
pub fn is_progress_end(line: &str) -> bool {
    line.trim() == "progress=end"
}

/// Folds diagnostic lines into a monotone percentage.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    duration: Option<f64>,
    percent: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total duration discovered so far, in seconds.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Feed one line. Returns the new percentage when it moved forward.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        if self.duration.is_none() {
            if let Some(duration) = parse_duration(line).filter(|d| *d > 0.0) {
                self.duration = Some(duration);
                return None;
            }
        }

        let elapsed = parse_elapsed(line)?;
        let next = match self.duration {
            Some(total) => ((elapsed / total) * 100.0).floor().clamp(0.0, 100.0) as u8,
            None => self.percent.saturating_add(1).min(HEARTBEAT_CAP),
        };

        if next > self.percent {
            self.percent = next;
            Some(next)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hms() {
        assert_eq!(parse_hms("00:00:10"), Some(10));
        assert_eq!(parse_hms("01:30:00"), Some(5400));
        assert_eq!(parse_hms("at 100:00:01 later"), Some(360_001));
        assert_eq!(parse_hms("1:2:3"), None);
        assert_eq!(parse_hms("invalid"), None);
    }

    #[test]
    fn test_parse_hms_rejects_overflowing_hours() {
        assert_eq!(parse_hms("5124095576030432:00:00"), None);
        assert_eq!(
            parse_duration("  Duration: 5124095576030432:00:00.00, start: 0"),
            None
        );
        assert_eq!(parse_hms("5124095576030431:00:00"), Some(5_124_095_576_030_431 * 3600));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration("  Duration: 00:01:30.50, start: 0.000000, bitrate: 2000 kb/s"),
            Some(90.0)
        );
        assert_eq!(parse_duration("Duration: 01:00:00"), Some(3600.0));
        assert_eq!(parse_duration("  Duration: N/A, start: 1.4, bitrate: N/A"), None);
        assert_eq!(parse_duration("frame=  100 fps=25"), None);
    }

    #[test]
    fn test_parse_elapsed() {
        assert_eq!(parse_elapsed("out_time_us=1500000"), Some(1.5));
        assert_eq!(parse_elapsed("out_time_ms=45000000"), Some(45.0));
        assert_eq!(parse_elapsed("out_time_us=-23220"), Some(0.0));
        assert_eq!(parse_elapsed("out_time=00:00:01.500000"), None);
        assert_eq!(parse_elapsed("total_size=1024"), None);
    }

    #[test]
    fn test_is_progress_end() {
        assert!(is_progress_end("progress=end"));
        assert!(is_progress_end("progress=end\r"));
        assert!(!is_progress_end("progress=continue"));
    }

    #[test]
    fn test_tracker_with_duration() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe("  Duration: 00:01:40.00, start: 0"), None);
        assert_eq!(tracker.duration(), Some(100.0));

        assert_eq!(tracker.observe("out_time_us=10000000"), Some(10));
        assert_eq!(tracker.observe("out_time_us=55500000"), Some(55));
        assert_eq!(tracker.observe("progress=continue"), None);
        assert_eq!(tracker.percent(), 55);
    }

    #[test]
    fn test_tracker_never_decreases() {
        let mut tracker = ProgressTracker::new();
        tracker.observe("Duration: 00:00:10.00");
        assert_eq!(tracker.observe("out_time_us=8000000"), Some(80));
        assert_eq!(tracker.observe("out_time_us=2000000"), None);
        assert_eq!(tracker.percent(), 80);
    }

    #[test]
    fn test_tracker_clamps_overshoot_to_100() {
        let mut tracker = ProgressTracker::new();
        tracker.observe("Duration: 00:00:10.00");
        assert_eq!(tracker.observe("out_time_us=12500000"), Some(100));
        assert_eq!(tracker.observe("out_time_us=20000000"), None);
    }

    #[test]
    fn test_tracker_heartbeat_without_duration() {
        let mut tracker = ProgressTracker::new();
        for expected in 1..=3u8 {
            assert_eq!(tracker.observe("out_time_ms=0"), Some(expected));
        }
        for _ in 0..200 {
            tracker.observe("out_time_us=1");
        }
        assert_eq!(tracker.percent(), HEARTBEAT_CAP);
    }

    #[test]
    fn test_tracker_keeps_first_duration() {
        let mut tracker = ProgressTracker::new();
        tracker.observe("Duration: 00:00:10.00");
        tracker.observe("Duration: 00:10:00.00");
        assert_eq!(tracker.duration(), Some(10.0));
    }
}
