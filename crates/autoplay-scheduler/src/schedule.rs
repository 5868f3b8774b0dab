//! Cron schedule helpers.
//!
//! Jobs use the standard five-field format `minute hour day month weekday`
//! (weekday 0-7, Sunday being 0 or 7). The `cron` crate expects a leading
//! seconds field and named or 1-based weekdays, so expressions are
//! translated before parsing.
//!
//! When both day-of-month and day-of-week are restricted, a day matching
//! either field fires, as in standard cron. The `cron` crate requires both
//! to match, so such expressions are split into two schedules.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::SchedulerError;

/// Format used when displaying the next execution time.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

const WEEKDAYS: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A parsed five-field cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedules: Vec<Schedule>,
}

impl CronSchedule {
    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(now).next())
            .min()
    }
}

fn is_unrestricted(field: &str) -> bool {
    field == "*" || field == "?"
}

/// Parse a five-field cron expression.
pub fn parse_schedule(expr: &str) -> Result<CronSchedule, SchedulerError> {
    let invalid = |reason: String| SchedulerError::InvalidSchedule {
        schedule: expr.to_string(),
        reason,
    };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
    }

    let weekday = translate_weekday(fields[4]).map_err(invalid)?;
    let build = |day: &str, weekday: &str| {
        let translated = format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], day, fields[3], weekday
        );
        Schedule::from_str(&translated).map_err(|e| invalid(e.to_string()))
    };

    let schedules = if is_unrestricted(fields[2]) || is_unrestricted(fields[4]) {
        vec![build(fields[2], &weekday)?]
    } else {
        vec![build(fields[2], "*")?, build("*", &weekday)?]
    };

    Ok(CronSchedule { schedules })
}

fn translate_weekday(field: &str) -> Result<String, String> {
    let parts: Result<Vec<String>, String> = field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = range
                .split('-')
                .map(weekday_name)
                .collect::<Result<Vec<_>, _>>()?
                .join("-");
            Ok(match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            })
        })
        .collect();
    Ok(parts?.join(","))
}

fn weekday_name(token: &str) -> Result<String, String> {
    match token.parse::<usize>() {
        Ok(n) => WEEKDAYS
            .get(n)
            .map(|d| d.to_string())
            .ok_or_else(|| format!("weekday {} out of range 0-7", n)),
        Err(_) => Ok(token.to_string()),
    }
}

/// Next time `expr` fires strictly after `now`.
pub fn next_execution(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    parse_schedule(expr)?
        .next_after(&now)
        .ok_or_else(|| SchedulerError::InvalidSchedule {
            schedule: expr.to_string(),
            reason: "schedule has no upcoming execution".to_string(),
        })
}

/// Next fire time and the wait until it.
pub fn time_until_next(
    expr: &str,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, Duration), SchedulerError> {
    let next = next_execution(expr, now)?;
    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
    Ok((next, wait))
}

/// Whole seconds until the next execution, rounded up. Always at least 1.
pub fn seconds_until_next(expr: &str, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
    let (_, wait) = time_until_next(expr, now)?;
    let mut secs = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        secs += 1;
    }
    Ok(secs.max(1))
}

/// Human-readable rendering of the next execution time.
pub fn next_execution_string(expr: &str, now: DateTime<Utc>) -> Result<String, SchedulerError> {
    Ok(format_execution_time(next_execution(expr, now)?))
}

pub fn format_execution_time(time: DateTime<Utc>) -> String {
    time.format(DISPLAY_FORMAT).to_string()
}
