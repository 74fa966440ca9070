//! Exam countdown.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::config::ConfigError;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse the configured exam date.
///
/// Accepts RFC 3339, a date-time without offset (taken as server local time),
/// or a bare `YYYY-MM-DD` (taken as UTC midnight).
pub fn parse_exam_date(input: &str) -> Result<DateTime<Utc>, ConfigError> {
    let input = input.trim();
    let invalid = || ConfigError::InvalidExamDate(input.to_string());

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(invalid);
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(invalid)
}

/// Whole days until the exam, rounding partial days up.
///
/// Times up to one day after the exam instant report 0.
pub fn remaining_days(now: DateTime<Utc>, exam_date: DateTime<Utc>) -> i64 {
    let ms = (exam_date - now).num_milliseconds();
    let days = ms / MS_PER_DAY;
    if ms % MS_PER_DAY > 0 { days + 1 } else { days }
}

pub fn formatted_message(now: DateTime<Utc>, exam_date: DateTime<Utc>) -> String {
    match remaining_days(now, exam_date) {
        d if d < 0 => "The exam date has passed.".to_string(),
        0 => "The exam is today! Good luck!".to_string(),
        d => format!("There are {d} days remaining until the exam."),
    }
}

/// Countdown against the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct ExamCountdown {
    exam_date: DateTime<Utc>,
}

impl ExamCountdown {
    pub fn new(exam_date: DateTime<Utc>) -> Self {
        Self { exam_date }
    }

    pub fn exam_date(&self) -> DateTime<Utc> {
        self.exam_date
    }

    pub fn remaining_days(&self) -> i64 {
        remaining_days(Utc::now(), self.exam_date)
    }

    pub fn message(&self) -> String {
        formatted_message(Utc::now(), self.exam_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_two_days_remaining() {
        let exam = utc("2025-06-10T00:00:00Z");
        let now = utc("2025-06-08T00:00:00Z");
        assert_eq!(remaining_days(now, exam), 2);
        assert_eq!(
            formatted_message(now, exam),
            "There are 2 days remaining until the exam."
        );
    }

    #[test]
    fn test_partial_day_rounds_up() {
        let exam = utc("2025-06-10T00:00:00Z");
        let now = utc("2025-06-08T23:59:00Z");
        assert_eq!(remaining_days(now, exam), 2);
        let now = utc("2025-06-09T00:00:01Z");
        assert_eq!(remaining_days(now, exam), 1);
    }

    #[test]
    fn test_today() {
        let exam = utc("2025-06-10T00:00:00Z");
        assert!(formatted_message(exam, exam).contains("today"));
        let later_same_day = utc("2025-06-10T09:30:00Z");
        assert!(formatted_message(later_same_day, exam).contains("today"));
    }

    #[test]
    fn test_passed() {
        let exam = utc("2025-06-10T00:00:00Z");
        let now = utc("2025-06-12T00:00:00Z");
        assert!(remaining_days(now, exam) < 0);
        assert!(formatted_message(now, exam).contains("passed"));
    }

    #[test]
    fn test_monotonic_as_time_advances() {
        let exam = utc("2025-06-10T00:00:00Z");
        let mut now = utc("2025-05-01T03:17:00Z");
        let mut previous = remaining_days(now, exam);
        for _ in 0..200 {
            now += Duration::hours(7);
            let days = remaining_days(now, exam);
            assert!(days <= previous, "{days} > {previous} at {now}");
            previous = days;
        }
    }

    #[test]
    fn test_parse_rfc3339() {
        let parsed = parse_exam_date("2025-06-10T05:30:00+05:30").unwrap();
        assert_eq!(parsed, utc("2025-06-10T00:00:00Z"));
    }

    #[test]
    fn test_parse_date_only_is_utc_midnight() {
        let parsed = parse_exam_date("2025-06-10").unwrap();
        assert_eq!(parsed, utc("2025-06-10T00:00:00Z"));
    }

    #[test]
    fn test_parse_naive_is_local() {
        let parsed = parse_exam_date("2025-06-10T00:00:00").unwrap();
        let expected = Local
            .with_ymd_and_hms(2025, 6, 10, 0, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_invalid() {
        for input in ["", "tomorrow", "2025-02-30", "10/06/2025"] {
            let err = parse_exam_date(input).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidExamDate(_)), "{input}");
        }
    }
}
