//! Schedule descriptors.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// When a task fires, on the UTC clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Every hour at the given minute.
    HourlyAt { minute: u32 },
    /// Every day at the given time.
    DailyAt { hour: u32, minute: u32 },
    /// Every week on the given day and time.
    WeeklyAt {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    /// Every N minutes, aligned to midnight. N must divide a day evenly.
    Every { minutes: u32 },
}

impl Schedule {
    /// Check that every field is in range.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        match *self {
            Schedule::HourlyAt { minute } => check_minute(minute),
            Schedule::DailyAt { hour, minute } | Schedule::WeeklyAt { hour, minute, .. } => {
                check_hour(hour)?;
                check_minute(minute)
            }
            Schedule::Every { minutes } => {
                if minutes == 0 || MINUTES_PER_DAY % minutes != 0 {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "interval of {} minutes does not divide a day evenly",
                        minutes
                    )));
                }
                Ok(())
            }
        }
    }

    /// The first firing time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let date = after.date_naive();
        match *self {
            Schedule::HourlyAt { minute } => {
                let candidate = at(date, after.hour(), minute);
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::hours(1)
                }
            }
            Schedule::DailyAt { hour, minute } => {
                let candidate = at(date, hour, minute);
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Schedule::WeeklyAt {
                weekday,
                hour,
                minute,
            } => {
                let ahead = (7 + weekday.num_days_from_monday()
                    - after.weekday().num_days_from_monday())
                    % 7;
                let candidate = at(date, hour, minute) + Duration::days(ahead as i64);
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
            Schedule::Every { minutes } => {
                // An unvalidated zero interval behaves like every minute
                let minutes = minutes.max(1);
                let elapsed = after.hour() * 60 + after.minute();
                let slot = (elapsed / minutes + 1) * minutes;
                at(date, 0, 0) + Duration::minutes(slot as i64)
            }
        }
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
        + Duration::hours(hour as i64)
        + Duration::minutes(minute as i64)
}

fn check_minute(minute: u32) -> Result<(), SchedulerError> {
    if minute > 59 {
        return Err(SchedulerError::InvalidSchedule(format!(
            "minute {} out of range 0-59",
            minute
        )));
    }
    Ok(())
}

fn check_hour(hour: u32) -> Result<(), SchedulerError> {
    if hour > 23 {
        return Err(SchedulerError::InvalidSchedule(format!(
            "hour {} out of range 0-23",
            hour
        )));
    }
    Ok(())
}

/// Parses the 5-field cron subset `MIN HOUR DOM MON DOW`.
///
/// Day-of-month and month must be `*`. Supported shapes:
///
/// | Expression | Schedule |
/// |---|---|
/// | `50 * * * *` | `HourlyAt { minute: 50 }` |
/// | `*/5 * * * *` | `Every { minutes: 5 }` |
/// | `0 */6 * * *` | `Every { minutes: 360 }` |
/// | `0 21 * * *` | `DailyAt { hour: 21, minute: 0 }` |
/// | `0 18 * * 0` | `WeeklyAt { weekday: Sun, hour: 18, minute: 0 }` |
impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| SchedulerError::InvalidExpression {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = expr.split_whitespace().collect();
        let &[min, hour, dom, mon, dow] = parts.as_slice() else {
            return Err(invalid("need 5 fields: MIN HOUR DOM MON DOW"));
        };

        if dom != "*" || mon != "*" {
            return Err(invalid("day-of-month and month must be '*'"));
        }

        let number = |field: &str| -> Result<u32, SchedulerError> {
            field
                .parse::<u32>()
                .map_err(|_| invalid(&format!("'{}' is not a number", field)))
        };
        let step = |field: &str| -> Result<Option<u32>, SchedulerError> {
            match field.strip_prefix("*/") {
                Some(n) => number(n).map(Some),
                None => Ok(None),
            }
        };

        let schedule = match (min, hour, dow) {
            ("*", "*", "*") => Schedule::Every { minutes: 1 },
            (m, "*", "*") => match step(m)? {
                // Minute steps restart every hour
                Some(minutes) if minutes == 0 || 60 % minutes != 0 => {
                    return Err(invalid("minute step must divide an hour evenly"));
                }
                Some(minutes) => Schedule::Every { minutes },
                None => Schedule::HourlyAt { minute: number(m)? },
            },
            (m, h, "*") => match step(h)? {
                Some(hours) if number(m)? == 0 => Schedule::Every {
                    minutes: hours.saturating_mul(60),
                },
                Some(_) => return Err(invalid("hour steps require minute 0")),
                None => Schedule::DailyAt {
                    hour: number(h)?,
                    minute: number(m)?,
                },
            },
            (m, h, d) => Schedule::WeeklyAt {
                weekday: parse_weekday(d).ok_or_else(|| invalid("unknown day of week"))?,
                hour: number(h)?,
                minute: number(m)?,
            },
        };

        schedule.validate()?;
        Ok(schedule)
    }
}

fn parse_weekday(field: &str) -> Option<Weekday> {
    match field.to_ascii_lowercase().as_str() {
        "0" | "7" | "sun" => Some(Weekday::Sun),
        "1" | "mon" => Some(Weekday::Mon),
        "2" | "tue" => Some(Weekday::Tue),
        "3" | "wed" => Some(Weekday::Wed),
        "4" | "thu" => Some(Weekday::Thu),
        "5" | "fri" => Some(Weekday::Fri),
        "6" | "sat" => Some(Weekday::Sat),
        _ => None,
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::HourlyAt { minute } => write!(f, "hourly at :{:02}", minute),
            Schedule::DailyAt { hour, minute } => {
                write!(f, "daily at {:02}:{:02} UTC", hour, minute)
            }
            Schedule::WeeklyAt {
                weekday,
                hour,
                minute,
            } => write!(f, "weekly on {} at {:02}:{:02} UTC", weekday, hour, minute),
            Schedule::Every { minutes } if minutes % 60 == 0 => {
                write!(f, "every {} hours", minutes / 60)
            }
            Schedule::Every { minutes } => write!(f, "every {} minutes", minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use test_case::test_case;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test_case("50 * * * *", Schedule::HourlyAt { minute: 50 } ; "hourly at minute 50")]
    #[test_case("*/5 * * * *", Schedule::Every { minutes: 5 } ; "every five minutes")]
    #[test_case("0 */6 * * *", Schedule::Every { minutes: 360 } ; "every six hours")]
    #[test_case("0 21 * * *", Schedule::DailyAt { hour: 21, minute: 0 } ; "daily")]
    #[test_case("0 18 * * 0", Schedule::WeeklyAt { weekday: Weekday::Sun, hour: 18, minute: 0 } ; "weekly numeric")]
    #[test_case("30 9 * * MON", Schedule::WeeklyAt { weekday: Weekday::Mon, hour: 9, minute: 30 } ; "weekly named")]
    #[test_case("* * * * *", Schedule::Every { minutes: 1 } ; "every minute")]
    fn parses_supported_expressions(expr: &str, expected: Schedule) {
        assert_eq!(expr.parse::<Schedule>().unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("bad" ; "single word")]
    #[test_case("0 * * *" ; "four fields")]
    #[test_case("60 * * * *" ; "minute out of range")]
    #[test_case("0 24 * * *" ; "hour out of range")]
    #[test_case("0 0 1 * *" ; "day of month")]
    #[test_case("0 0 * 1 *" ; "month")]
    #[test_case("*/7 * * * *" ; "step does not divide day")]
    #[test_case("*/0 * * * *" ; "zero step")]
    #[test_case("*/90 * * * *" ; "minute step longer than an hour")]
    #[test_case("*/45 * * * *" ; "minute step does not divide hour")]
    #[test_case("15 */6 * * *" ; "hour step with minute")]
    #[test_case("0 12 * * funday" ; "unknown weekday")]
    fn rejects_invalid_expressions(expr: &str) {
        assert!(expr.parse::<Schedule>().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_descriptors() {
        assert!(Schedule::HourlyAt { minute: 60 }.validate().is_err());
        assert!(Schedule::DailyAt { hour: 24, minute: 0 }.validate().is_err());
        assert!(Schedule::Every { minutes: 0 }.validate().is_err());
        assert!(Schedule::Every { minutes: 7 }.validate().is_err());
        assert!(Schedule::Every { minutes: 1440 }.validate().is_ok());
    }

    #[test]
    fn zero_interval_does_not_panic() {
        let s = Schedule::Every { minutes: 0 };
        assert_eq!(s.next_after(utc(2026, 3, 1, 10, 20, 30)), utc(2026, 3, 1, 10, 21, 0));
    }

    #[test]
    fn hourly_next_is_same_hour_when_minute_ahead() {
        let s = Schedule::HourlyAt { minute: 50 };
        assert_eq!(s.next_after(utc(2026, 3, 1, 10, 20, 0)), utc(2026, 3, 1, 10, 50, 0));
    }

    #[test]
    fn hourly_next_rolls_over_when_minute_passed() {
        let s = Schedule::HourlyAt { minute: 50 };
        assert_eq!(s.next_after(utc(2026, 3, 1, 10, 50, 0)), utc(2026, 3, 1, 11, 50, 0));
        assert_eq!(s.next_after(utc(2026, 3, 1, 23, 55, 0)), utc(2026, 3, 2, 0, 50, 0));
    }

    #[test]
    fn daily_next_rolls_to_tomorrow() {
        let s = Schedule::DailyAt { hour: 21, minute: 0 };
        assert_eq!(s.next_after(utc(2026, 3, 1, 20, 59, 59)), utc(2026, 3, 1, 21, 0, 0));
        assert_eq!(s.next_after(utc(2026, 3, 1, 21, 0, 0)), utc(2026, 3, 2, 21, 0, 0));
    }

    #[test]
    fn weekly_next_finds_target_weekday() {
        // 2026-03-04 is a Wednesday
        let s = Schedule::WeeklyAt {
            weekday: Weekday::Sun,
            hour: 18,
            minute: 0,
        };
        assert_eq!(s.next_after(utc(2026, 3, 4, 12, 0, 0)), utc(2026, 3, 8, 18, 0, 0));
        // Sunday after the firing time goes to next week
        assert_eq!(s.next_after(utc(2026, 3, 8, 18, 0, 0)), utc(2026, 3, 15, 18, 0, 0));
        // Sunday before the firing time stays today
        assert_eq!(s.next_after(utc(2026, 3, 8, 17, 0, 0)), utc(2026, 3, 8, 18, 0, 0));
    }

    #[test]
    fn every_aligns_to_grid() {
        let five = Schedule::Every { minutes: 5 };
        assert_eq!(five.next_after(utc(2026, 3, 1, 10, 2, 0)), utc(2026, 3, 1, 10, 5, 0));
        assert_eq!(five.next_after(utc(2026, 3, 1, 10, 5, 0)), utc(2026, 3, 1, 10, 10, 0));
        assert_eq!(five.next_after(utc(2026, 3, 1, 23, 58, 30)), utc(2026, 3, 2, 0, 0, 0));

        let six_hours = Schedule::Every { minutes: 360 };
        assert_eq!(six_hours.next_after(utc(2026, 3, 1, 13, 0, 0)), utc(2026, 3, 1, 18, 0, 0));
        assert_eq!(six_hours.next_after(utc(2026, 3, 1, 18, 0, 0)), utc(2026, 3, 2, 0, 0, 0));
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(Schedule::HourlyAt { minute: 5 }.to_string(), "hourly at :05");
        assert_eq!(Schedule::Every { minutes: 360 }.to_string(), "every 6 hours");
        assert_eq!(Schedule::Every { minutes: 5 }.to_string(), "every 5 minutes");
    }

    fn schedule_strategy() -> impl Strategy<Value = Schedule> {
        prop_oneof![
            (0u32..60).prop_map(|minute| Schedule::HourlyAt { minute }),
            (0u32..24, 0u32..60).prop_map(|(hour, minute)| Schedule::DailyAt { hour, minute }),
            (
                prop::sample::select(vec![
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                    Weekday::Sat,
                    Weekday::Sun,
                ]),
                0u32..24,
                0u32..60,
            )
                .prop_map(|(weekday, hour, minute)| Schedule::WeeklyAt {
                    weekday,
                    hour,
                    minute,
                }),
            prop::sample::select(vec![1u32, 5, 10, 15, 30, 60, 120, 360, 720, 1440])
                .prop_map(|minutes| Schedule::Every { minutes }),
        ]
    }

    proptest! {
        #[test]
        fn next_is_strictly_after_and_within_one_period(
            schedule in schedule_strategy(),
            offset_secs in 0i64..(365 * 24 * 3600),
        ) {
            let after = utc(2026, 1, 1, 0, 0, 0) + Duration::seconds(offset_secs);
            let next = schedule.next_after(after);

            let period = match schedule {
                Schedule::HourlyAt { .. } => Duration::hours(1),
                Schedule::DailyAt { .. } => Duration::days(1),
                Schedule::WeeklyAt { .. } => Duration::days(7),
                Schedule::Every { minutes } => Duration::minutes(minutes as i64),
            };

            prop_assert!(next > after);
            prop_assert!(next - after <= period);
            prop_assert_eq!(next.second(), 0);
        }

        #[test]
        fn next_is_a_fixed_point_of_the_grid(
            schedule in schedule_strategy(),
            offset_secs in 0i64..(365 * 24 * 3600),
        ) {
            let after = utc(2026, 1, 1, 0, 0, 0) + Duration::seconds(offset_secs);
            let next = schedule.next_after(after);
            // Asking again from just before the firing lands on the same instant
            prop_assert_eq!(schedule.next_after(next - Duration::seconds(1)), next);
        }
    }
}
