//! Five-field cron expression matching (spec §4.6).
//!
//! Grounded on the teacher's `runtime/schedules/cron.rs` field-matching and
//! forward-scan shape, but deliberately diverges on two points the spec
//! calls out explicitly: day-of-week is `Monday=0..Sunday=6` (the teacher
//! uses `num_days_from_sunday`, i.e. `Sunday=0`), and matching is UTC-only
//! at minute resolution (the spec marks timezone support optional; this
//! core doesn't carry the `chrono_tz` DST-aware evaluator).

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

const MAX_SCAN_DAYS: i64 = 366;

/// Whether `value` is matched by one cron field (`*`, `a`, `a-b`, `*/n`,
/// `a/n`, or a comma-separated list of the above).
fn field_matches(field: &str, value: u32) -> bool {
    field.split(',').any(|part| part_matches(part, value))
}

fn part_matches(part: &str, value: u32) -> bool {
    if part == "*" {
        return true;
    }
    if let Some((base, step)) = part.split_once('/') {
        let Ok(step) = step.parse::<u32>() else {
            return false;
        };
        if step == 0 {
            return false;
        }
        return match base {
            "*" => value.is_multiple_of(step),
            _ => {
                let Ok(start) = base.parse::<u32>() else {
                    return false;
                };
                value >= start && (value - start).is_multiple_of(step)
            }
        };
    }
    if let Some((start_s, end_s)) = part.split_once('-') {
        if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
            return value >= start && value <= end;
        }
        return false;
    }
    part.parse::<u32>().map(|n| n == value).unwrap_or(false)
}

/// Monday=0..Sunday=6, per spec §4.6 (the opposite of chrono's
/// `num_days_from_sunday`).
fn weekday_monday_zero(dt: &DateTime<Utc>) -> u32 {
    dt.weekday().num_days_from_monday()
}

/// Whether `dt` (truncated to minute resolution) matches the 5-field
/// expression `minute hour day-of-month month day-of-week`.
pub fn cron_matches(expr: &str, dt: &DateTime<Utc>) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    field_matches(fields[0], dt.minute())
        && field_matches(fields[1], dt.hour())
        && field_matches(fields[2], dt.day())
        && field_matches(fields[3], dt.month())
        && field_matches(fields[4], weekday_monday_zero(dt))
}

/// Advances one minute past `after`, then scans forward up to 366 days for
/// the first minute matching `expr`.
pub fn next_cron_time(expr: &str, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut candidate = (*after + Duration::minutes(1))
        .with_second(0)
        .unwrap_or(*after)
        .with_nanosecond(0)
        .unwrap_or(*after);

    let deadline = *after + Duration::days(MAX_SCAN_DAYS);
    while candidate <= deadline {
        if cron_matches(expr, &candidate) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wildcard_every_field_matches_any_minute() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        assert!(cron_matches("* * * * *", &dt));
    }

    #[test]
    fn step_field_every_five_minutes() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 28, 10, 5, 0).unwrap();
        assert!(cron_matches("*/5 * * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2026, 7, 28, 10, 3, 0).unwrap();
        assert!(!cron_matches("*/5 * * * *", &dt2));
    }

    #[test]
    fn range_field() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        assert!(cron_matches("0 9-17 * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2026, 7, 28, 20, 0, 0).unwrap();
        assert!(!cron_matches("0 9-17 * * *", &dt2));
    }

    #[test]
    fn comma_list_field() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 28, 10, 15, 0).unwrap();
        assert!(cron_matches("0,15,30,45 * * * *", &dt));
    }

    #[test]
    fn weekday_monday_is_zero() {
        // 2026-07-27 is a Monday.
        let monday = Utc.with_ymd_and_hms(2026, 7, 27, 9, 0, 0).unwrap();
        assert!(cron_matches("0 9 * * 0", &monday));
        let sunday = Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap();
        assert!(cron_matches("0 9 * * 6", &sunday));
        assert!(!cron_matches("0 9 * * 0", &sunday));
    }

    #[test]
    fn next_cron_time_advances_past_current_minute() {
        let after = Utc.with_ymd_and_hms(2026, 7, 28, 10, 30, 0).unwrap();
        let next = next_cron_time("30 * * * *", &after).unwrap();
        assert!(next > after);
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn next_cron_time_finds_far_future_match() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        // Every Feb 29th doesn't exist in 2026 (not a leap year); a fixed
        // date far in the year still must resolve within the scan window.
        let next = next_cron_time("0 0 25 12 *", &after).unwrap();
        assert_eq!(next.month(), 12);
        assert_eq!(next.day(), 25);
    }

    #[test]
    fn next_cron_time_with_no_match_in_scan_window_is_none() {
        // Feb 31st never occurs; the forward scan must exhaust its 366-day
        // window and fail clearly rather than looping forever (spec §8).
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(next_cron_time("0 0 31 2 *", &after).is_none());
    }

    #[test]
    fn every_five_minutes_boundary_from_spec_s8() {
        // spec §8: "*/5 * * * *" at 12:04 -> next fire 12:05; at 12:05:00 -> 12:10.
        let at_12_04 = Utc.with_ymd_and_hms(2026, 7, 28, 12, 4, 0).unwrap();
        let next = next_cron_time("*/5 * * * *", &at_12_04).unwrap();
        assert_eq!((next.hour(), next.minute()), (12, 5));

        let at_12_05 = Utc.with_ymd_and_hms(2026, 7, 28, 12, 5, 0).unwrap();
        let next2 = next_cron_time("*/5 * * * *", &at_12_05).unwrap();
        assert_eq!((next2.hour(), next2.minute()), (12, 10));
    }

    #[test]
    fn a_slash_n_step_form() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        assert!(cron_matches("0 2/4 * * *", &dt).then_some(()).is_none());
        let dt2 = Utc.with_ymd_and_hms(2026, 7, 28, 2, 0, 0).unwrap();
        assert!(cron_matches("0 2/4 * * *", &dt2));
        let dt3 = Utc.with_ymd_and_hms(2026, 7, 28, 6, 0, 0).unwrap();
        assert!(cron_matches("0 2/4 * * *", &dt3));
    }
}
