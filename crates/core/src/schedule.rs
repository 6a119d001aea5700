//! Date/time handling for meeting requests.
//!
//! Requests carry a date (`YYYY-MM-DD`) and a time (`HH:MM`, 24-hour) as
//! separate strings. They are combined and parsed once, and the outcome is
//! a [`StartParse`] value that callers match on.

use chrono::{Duration, NaiveDateTime};

pub const START_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartParse {
    Valid(NaiveDateTime),
    Past(NaiveDateTime),
    Unparsable,
}

/// Parse `"{date} {time}"` and classify it against `now`.
pub fn parse_start(date: &str, time: &str, now: NaiveDateTime) -> StartParse {
    let combined = format!("{} {}", date.trim(), time.trim());
    match NaiveDateTime::parse_from_str(&combined, START_FORMAT) {
        Ok(start) if start < now => StartParse::Past(start),
        Ok(start) => StartParse::Valid(start),
        Err(_) => StartParse::Unparsable,
    }
}

pub fn end_after(start: NaiveDateTime, duration_minutes: i64) -> NaiveDateTime {
    start + Duration::minutes(duration_minutes)
}

pub fn event_timestamp(value: NaiveDateTime) -> String {
    value.format(EVENT_TIMESTAMP_FORMAT).to_string()
}

/// `March 05, 2031`
pub fn display_date(value: NaiveDateTime) -> String {
    value.format("%B %d, %Y").to_string()
}

/// `02:30 PM`
pub fn display_time(value: NaiveDateTime) -> String {
    value.format("%I:%M %p").to_string()
}

/// `2031-03-05 at 14:30`
pub fn listing_stamp(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d at %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::{display_date, display_time, event_timestamp, parse_start, StartParse};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid test timestamp")
    }

    #[test]
    fn future_start_is_valid() {
        let now = at(2030, 6, 1, 12, 0);
        assert_eq!(parse_start("2030-06-02", "09:30", now), StartParse::Valid(at(2030, 6, 2, 9, 30)));
    }

    #[test]
    fn past_start_is_reported_with_parsed_value() {
        let now = at(2030, 6, 1, 12, 0);
        assert_eq!(parse_start("2030-06-01", "11:59", now), StartParse::Past(at(2030, 6, 1, 11, 59)));
    }

    #[test]
    fn start_equal_to_now_is_not_past() {
        let now = at(2030, 6, 1, 12, 0);
        assert!(matches!(parse_start("2030-06-01", "12:00", now), StartParse::Valid(_)));
    }

    #[test]
    fn malformed_inputs_are_unparsable() {
        let now = at(2030, 6, 1, 12, 0);
        for (date, time) in [
            ("tomorrow", "10:00"),
            ("2030-06-02", ""),
            ("2030-06-02", "half past nine"),
            ("06/02/2030", "10:00"),
            ("2030-02-30", "10:00"),
        ] {
            assert_eq!(parse_start(date, time, now), StartParse::Unparsable, "{date} {time}");
        }
    }

    #[test]
    fn display_formats_match_notification_texts() {
        let value = at(2031, 3, 5, 14, 30);
        assert_eq!(display_date(value), "March 05, 2031");
        assert_eq!(display_time(value), "02:30 PM");
        assert_eq!(event_timestamp(value), "2031-03-05T14:30:00");
    }
}
