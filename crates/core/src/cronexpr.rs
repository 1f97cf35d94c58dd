//! Five-field cron expression validation and next-occurrence computation.
//!
//! Scheduled jobs use classic crontab semantics: minute, hour, day of
//! month, month, day of week, evaluated in the process-local time zone.
//! Second-resolution expressions are rejected.

use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use cron::Schedule;

use crate::error::CoreError;

/// Validate a five-field cron expression.
pub fn validate(expr: &str) -> Result<(), CoreError> {
    schedule(expr).map(|_| ())
}

/// The first occurrence strictly after `now`, returned as UTC for storage.
pub fn next_after(expr: &str, now: DateTime<Local>) -> Result<DateTime<Utc>, CoreError> {
    let schedule = schedule(expr)?;
    schedule
        .after(&now)
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| {
            CoreError::Validation(format!("cron expression {expr:?} has no future occurrence"))
        })
}

fn schedule(expr: &str) -> Result<Schedule, CoreError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        let detail = if fields == 6 || fields == 7 {
            "; second-resolution expressions are not supported"
        } else {
            ""
        };
        return Err(CoreError::Validation(format!(
            "cron expression must have 5 fields \
             (minute hour day-of-month month day-of-week), got {fields}{detail}"
        )));
    }

    // The underlying parser takes a leading seconds field; pin it to zero
    // so schedules fire on the minute.
    Schedule::from_str(&format!("0 {}", expr.trim()))
        .map_err(|e| CoreError::Validation(format!("invalid cron expression {expr:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone, Timelike, Utc};

    use super::*;

    #[test]
    fn accepts_five_field_expressions() {
        assert!(validate("* * * * *").is_ok());
        assert!(validate("0 3 * * *").is_ok());
        assert!(validate("*/15 2,14 1 * 1-5").is_ok());
    }

    #[test]
    fn rejects_wrong_field_counts() {
        assert!(validate("").is_err());
        assert!(validate("* * * *").is_err());
        assert!(validate("0 3 * * * extra extra extra").is_err());
    }

    #[test]
    fn rejects_second_resolution() {
        let err = validate("0 * * * * *").unwrap_err();
        assert!(err.to_string().contains("second-resolution"));
    }

    #[test]
    fn rejects_garbage_fields() {
        assert!(validate("61 * * * *").is_err());
        assert!(validate("a b c d e").is_err());
    }

    #[test]
    fn next_is_strictly_after_now() {
        let now = Local::now();
        let next = next_after("* * * * *", now).unwrap();
        assert!(next > now.with_timezone(&Utc));
        assert!(next <= now.with_timezone(&Utc) + Duration::seconds(61));
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn next_honours_the_minute_field() {
        // 10:07 local -> the */15 schedule next fires at 10:15 local.
        let now = Local.with_ymd_and_hms(2025, 3, 4, 10, 7, 0).unwrap();
        let next = next_after("*/15 * * * *", now).unwrap();
        let local = next.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute()), (10, 15));
    }

    #[test]
    fn next_of_daily_schedule_lands_on_the_hour() {
        let now = Local.with_ymd_and_hms(2025, 3, 4, 10, 7, 0).unwrap();
        let next = next_after("0 3 * * *", now).unwrap();
        let local = next.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute(), local.second()), (3, 0, 0));
        assert!(next > now.with_timezone(&Utc));
    }
}
