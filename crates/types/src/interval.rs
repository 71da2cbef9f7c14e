use chrono::{Duration, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("interval start {start} is not before end {end}")]
    Empty {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// Half-open `[start, end)` span of wall-clock time.
///
/// `start < end` always holds; deserialization rejects anything else.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
#[serde(try_from = "RawInterval")]
pub struct TimeInterval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

#[derive(Deserialize, JsonSchema)]
struct RawInterval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = IntervalError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        TimeInterval::new(raw.start, raw.end)
    }
}

impl TimeInterval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, IntervalError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(IntervalError::Empty { start, end })
        }
    }

    pub fn starting_at(start: NaiveDateTime, length: Duration) -> Result<Self, IntervalError> {
        Self::new(start, start + length)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Strict half-open overlap: intervals that only touch do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted() {
        assert!(TimeInterval::new(at(9, 0), at(9, 0)).is_err());
        assert!(TimeInterval::new(at(10, 0), at(9, 0)).is_err());
        assert!(TimeInterval::new(at(9, 0), at(9, 1)).is_ok());
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        let a = TimeInterval::new(at(8, 0), at(10, 0)).unwrap();
        let b = TimeInterval::new(at(10, 0), at(12, 0)).unwrap();
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn deserialize_enforces_order() {
        let ok: Result<TimeInterval, _> = serde_json::from_str(
            r#"{"start":"2025-09-15T09:00:00","end":"2025-09-15T10:30:00"}"#,
        );
        assert_eq!(ok.unwrap().duration(), Duration::minutes(90));

        let bad: Result<TimeInterval, _> = serde_json::from_str(
            r#"{"start":"2025-09-15T10:30:00","end":"2025-09-15T09:00:00"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn display_is_compact() {
        let a = TimeInterval::new(at(9, 0), at(10, 30)).unwrap();
        assert_eq!(a.to_string(), "[2025-09-15 09:00, 10:30)");
    }
}
