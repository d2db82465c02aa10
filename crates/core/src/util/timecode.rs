//! Conversion of external `hours:minutes:seconds` timecodes onto the session
//! timeline (seconds from session start).

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TimecodeError {
    #[error("timecode {input:?} must have exactly three colon-separated fields, found {fields}")]
    FieldCount { input: String, fields: usize },
    #[error("timecode {input:?} has a non-numeric field {field:?}")]
    NotNumeric { input: String, field: String },
    #[error("timecode {input:?} has a negative or non-finite field")]
    OutOfRange { input: String },
}

/// Parses `h:m:s` where seconds may be fractional, e.g. `0:01:05.25` -> 65.25.
pub fn parse_timecode(input: &str) -> Result<f64, TimecodeError> {
    let fields: Vec<&str> = input.trim().split(':').collect();
    if fields.len() != 3 {
        return Err(TimecodeError::FieldCount {
            input: input.to_owned(),
            fields: fields.len(),
        });
    }

    let mut values = [0.0f64; 3];
    for (slot, field) in values.iter_mut().zip(&fields) {
        let value: f64 = field.trim().parse().map_err(|_| TimecodeError::NotNumeric {
            input: input.to_owned(),
            field: (*field).to_owned(),
        })?;
        if !value.is_finite() || value < 0.0 {
            return Err(TimecodeError::OutOfRange {
                input: input.to_owned(),
            });
        }
        *slot = value;
    }

    let [hours, minutes, seconds] = values;
    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Closed interval on the session timeline, in seconds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, TimecodeError> {
        Ok(Self {
            start: parse_timecode(start)?,
            end: parse_timecode(end)?,
        })
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractional_seconds() {
        assert_eq!(parse_timecode("0:00:15").unwrap(), 15.0);
        assert_eq!(parse_timecode("0:01:05.25").unwrap(), 65.25);
        assert_eq!(parse_timecode("1:00:00").unwrap(), 3600.0);
        assert_eq!(parse_timecode(" 0:00:00.5 ").unwrap(), 0.5);
    }

    #[test]
    fn malformed_timecodes_fail_instead_of_defaulting_to_zero() {
        assert!(matches!(
            parse_timecode("00:15"),
            Err(TimecodeError::FieldCount { fields: 2, .. })
        ));
        assert!(matches!(
            parse_timecode("0:0:0:1"),
            Err(TimecodeError::FieldCount { fields: 4, .. })
        ));
        assert!(matches!(
            parse_timecode("0:ab:10"),
            Err(TimecodeError::NotNumeric { .. })
        ));
        assert!(matches!(
            parse_timecode(""),
            Err(TimecodeError::FieldCount { fields: 1, .. })
        ));
        assert!(matches!(
            parse_timecode("0:-1:10"),
            Err(TimecodeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        let iv = Interval::parse("0:00:15", "0:00:45").unwrap();
        assert!(iv.contains(15.0));
        assert!(iv.contains(45.0));
        assert!(iv.contains(20.0));
        assert!(!iv.contains(14.999));
        assert!(!iv.contains(45.001));
    }
}
