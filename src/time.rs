use std::sync::LazyLock;

use regex::Regex;

/// Minutes since local midnight — the only time-of-day type.
pub type Minutes = i32;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

static TIME_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9](:[0-5][0-9])?$").expect("time-of-day pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("{start} + {delta} minutes crosses midnight")]
    DurationOverflowsDay { start: String, delta: Minutes },
    #[error("empty window: start {start} is not before end {end}")]
    EmptyWindow { start: String, end: String },
}

/// Parse `HH:MM` or `HH:MM:SS` into minutes since midnight. Seconds are dropped.
pub fn to_minutes(time: &str) -> Result<Minutes, TimeError> {
    if !TIME_OF_DAY.is_match(time) {
        return Err(TimeError::InvalidTimeFormat(time.to_string()));
    }
    let mut parts = time.split(':');
    let hours: Minutes = parts
        .next()
        .and_then(|h| h.parse().ok())
        .ok_or_else(|| TimeError::InvalidTimeFormat(time.to_string()))?;
    let minutes: Minutes = parts
        .next()
        .and_then(|m| m.parse().ok())
        .ok_or_else(|| TimeError::InvalidTimeFormat(time.to_string()))?;
    Ok(hours * 60 + minutes)
}

/// Render minutes since midnight as zero-padded `HH:MM`.
pub fn from_minutes(minutes: Minutes) -> Result<String, TimeError> {
    if !(0..MINUTES_PER_DAY).contains(&minutes) {
        return Err(TimeError::InvalidTimeFormat(minutes.to_string()));
    }
    Ok(format!("{:02}:{:02}", minutes / 60, minutes % 60))
}

/// Half-open overlap test: touching endpoints do not overlap.
pub fn intervals_overlap(a_start: Minutes, a_end: Minutes, b_start: Minutes, b_end: Minutes) -> bool {
    a_start < b_end && b_start < a_end
}

/// `time + delta`, refusing results outside the same day.
pub fn add_minutes(time: Minutes, delta: Minutes) -> Result<Minutes, TimeError> {
    let overflow = || TimeError::DurationOverflowsDay {
        start: format_lossy(time),
        delta,
    };
    let end = time.checked_add(delta).ok_or_else(overflow)?;
    if !(0..MINUTES_PER_DAY).contains(&end) {
        return Err(overflow());
    }
    Ok(end)
}

/// `HH:MM` for in-range values, the raw number otherwise. For error messages and logs.
pub fn format_lossy(minutes: Minutes) -> String {
    from_minutes(minutes).unwrap_or_else(|_| minutes.to_string())
}

/// Serde adapter: `Minutes` on the Rust side, `"HH:MM"` on the wire.
pub mod hhmm {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Minutes, format_lossy, to_minutes};

    pub fn serialize<S: Serializer>(minutes: &Minutes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_lossy(*minutes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Minutes, D::Error> {
        let s = String::deserialize(deserializer)?;
        to_minutes(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_minutes_and_seconds() {
        assert_eq!(to_minutes("09:00").unwrap(), 540);
        assert_eq!(to_minutes("9:30").unwrap(), 570);
        assert_eq!(to_minutes("23:59").unwrap(), 1439);
        assert_eq!(to_minutes("00:00").unwrap(), 0);
        assert_eq!(to_minutes("10:15:45").unwrap(), 615);
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["24:00", "9", "09:60", "09:00:60", "ab:cd", "", " 09:00", "09:00 ", "-1:00"] {
            assert_eq!(
                to_minutes(bad),
                Err(TimeError::InvalidTimeFormat(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn renders_zero_padded() {
        assert_eq!(from_minutes(0).unwrap(), "00:00");
        assert_eq!(from_minutes(545).unwrap(), "09:05");
        assert_eq!(from_minutes(1439).unwrap(), "23:59");
    }

    #[test]
    fn render_rejects_out_of_day() {
        assert!(matches!(from_minutes(-1), Err(TimeError::InvalidTimeFormat(_))));
        assert!(matches!(from_minutes(1440), Err(TimeError::InvalidTimeFormat(_))));
    }

    #[test]
    fn parse_render_inverse_on_every_minute() {
        for m in 0..MINUTES_PER_DAY {
            assert_eq!(to_minutes(&from_minutes(m).unwrap()).unwrap(), m);
        }
    }

    #[test]
    fn adjacent_intervals_do_not_overlap() {
        assert!(!intervals_overlap(540, 600, 600, 660));
        assert!(!intervals_overlap(600, 660, 540, 600));
    }

    #[test]
    fn overlap_is_symmetric() {
        let samples = [0, 30, 45, 60, 90, 120];
        for &a0 in &samples {
            for &a1 in &samples {
                for &b0 in &samples {
                    for &b1 in &samples {
                        if a0 >= a1 || b0 >= b1 {
                            continue;
                        }
                        assert_eq!(
                            intervals_overlap(a0, a1, b0, b1),
                            intervals_overlap(b0, b1, a0, a1)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn partial_and_contained_overlap() {
        assert!(intervals_overlap(600, 630, 615, 645));
        assert!(intervals_overlap(540, 720, 600, 630));
        assert!(intervals_overlap(600, 630, 600, 630));
    }

    #[test]
    fn add_minutes_within_day() {
        assert_eq!(add_minutes(540, 30).unwrap(), 570);
        assert_eq!(add_minutes(1380, 59).unwrap(), 1439);
    }

    #[test]
    fn add_minutes_refuses_midnight_crossing() {
        let err = add_minutes(1410, 30).unwrap_err();
        assert_eq!(
            err,
            TimeError::DurationOverflowsDay {
                start: "23:30".into(),
                delta: 30
            }
        );
        assert!(add_minutes(30, -60).is_err());
        assert!(add_minutes(Minutes::MAX - 1, 10).is_err());
    }

    #[test]
    fn hhmm_serde_roundtrip_through_json() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct At {
            #[serde(with = "hhmm")]
            at: Minutes,
        }
        let json = serde_json::to_string(&At { at: 605 }).unwrap();
        assert_eq!(json, r#"{"at":"10:05"}"#);
        let back: At = serde_json::from_str(r#"{"at":"10:05:30"}"#).unwrap();
        assert_eq!(back, At { at: 605 });
        assert!(serde_json::from_str::<At>(r#"{"at":"25:00"}"#).is_err());
    }
}
