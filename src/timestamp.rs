// Filename-embedded recording timestamps
//
// Recorders on devices without a reliable clock source at write time encode
// the recording start in the filename. The accepted patterns are tried in
// order against the start of the file stem; the first match wins. Trailing
// stem content after the matched prefix is ignored.

use std::path::Path;

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::constants::TIMESTAMP_PATTERNS;

/// Parse a recording timestamp from a file's name, if any accepted pattern
/// matches. Returns None when no pattern matches or the matched text is not
/// a real date.
pub fn parse_from_filename(path: &Path) -> Option<DateTime<Local>> {
    let stem = path.file_stem()?.to_str()?;
    for (pattern, format) in TIMESTAMP_PATTERNS {
        let re = Regex::new(pattern).expect("timestamp pattern must compile");
        let m = match re.find(stem) {
            Some(m) => m,
            None => continue,
        };
        let naive = match NaiveDateTime::parse_from_str(m.as_str(), format) {
            Ok(dt) => dt,
            Err(_) => continue,
        };
        return Some(resolve_local(naive));
    }
    None
}

// Interpret wall-clock fields in the local time zone. An ambiguous local
// time (DST fold) resolves to the earlier instant; a nonexistent one (DST
// gap) falls back to reading the fields as UTC.
fn resolve_local(naive: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => Utc.from_utc_datetime(&naive).with_timezone(&Local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_dashed_pattern() {
        let ts = parse_from_filename(Path::new("2024-01-19--15-04-05.cptv")).unwrap();
        assert_eq!(
            (ts.year(), ts.month(), ts.day(), ts.hour(), ts.minute(), ts.second()),
            (2024, 1, 19, 15, 4, 5)
        );
    }

    #[test]
    fn test_compact_pattern_with_fraction() {
        let ts = parse_from_filename(Path::new("20240119-150405.250000.avi")).unwrap();
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (15, 4, 5));
        assert_eq!(ts.timestamp_subsec_micros(), 250000);
    }

    #[test]
    fn test_compact_pattern() {
        let ts = parse_from_filename(Path::new("20240119-150405.wav")).unwrap();
        assert_eq!((ts.year(), ts.hour()), (2024, 15));
    }

    #[test]
    fn test_trailing_stem_content_ignored() {
        let ts = parse_from_filename(Path::new("20240119-150405-cam2.mp4")).unwrap();
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (15, 4, 5));
    }

    #[test]
    fn test_unrecognized_stem() {
        assert!(parse_from_filename(Path::new("recording.cptv")).is_none());
        assert!(parse_from_filename(Path::new("1234.mp4")).is_none());
    }

    #[test]
    fn test_impossible_date_rejected() {
        // Matches the compact pattern shape but is not a real date
        assert!(parse_from_filename(Path::new("20241399-150405.mp4")).is_none());
    }

    #[test]
    fn test_round_trip() {
        // A parsed timestamp formatted back with its pattern must reproduce
        // the wall-clock value embedded in the filename.
        let ts = parse_from_filename(Path::new("2023-11-02--06-30-59.cptv")).unwrap();
        assert_eq!(ts.format("%Y-%m-%d--%H-%M-%S").to_string(), "2023-11-02--06-30-59");
    }
}
