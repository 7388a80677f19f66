// src/jobs/cron.rs

//! Cron expressions.
//!
//! Supported syntax, per field: `*`, `?` (same as `*`), single values,
//! `a-b` ranges, `,` lists and `/n` steps, plus `JAN`-`DEC` and `SUN`-`SAT`
//! names. Five fields are `minute hour day-of-month month day-of-week`; a
//! sixth leading field adds seconds. `@yearly`, `@monthly`, `@weekly`,
//! `@daily` and `@hourly` are accepted as shorthands.
//!
//! Day-of-month and day-of-week follow the classic cron rule: when both are
//! restricted a day matches if *either* matches.
//!
//! Schedules are evaluated on naive local wall-clock time.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::errors::{AvianError, Result};

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Give up looking for a fire time this many years past the start point.
const SEARCH_YEARS: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: u64,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| AvianError::CronExpression {
            expression: expression.to_string(),
            reason,
        };

        let expanded = match expression.trim().to_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *".to_string(),
            "@monthly" => "0 0 1 * *".to_string(),
            "@weekly" => "0 0 * * 0".to_string(),
            "@daily" | "@midnight" => "0 0 * * *".to_string(),
            "@hourly" => "0 * * * *".to_string(),
            _ => expression.trim().to_string(),
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let (sec, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            n => return Err(invalid(format!("expected 5 or 6 fields, got {n}"))),
        };

        let seconds = parse_field(sec, 0, 59, &[]).map_err(invalid)?;
        let minutes = parse_field(rest[0], 0, 59, &[]).map_err(invalid)?;
        let hours = parse_field(rest[1], 0, 23, &[]).map_err(invalid)?;
        let days_of_month = parse_field(rest[2], 1, 31, &[]).map_err(invalid)?;
        let months = parse_field(rest[3], 1, 12, &MONTH_NAMES).map_err(invalid)?;
        // 7 is accepted as an alias for Sunday.
        let mut days_of_week = parse_field(rest[4], 0, 7, &DAY_NAMES).map_err(invalid)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: expression.trim().to_string(),
            seconds,
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: is_restricted(rest[2]),
            dow_restricted: is_restricted(rest[4]),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn matches(&self, t: NaiveDateTime) -> bool {
        has(self.months, t.month())
            && self.day_matches(t.date())
            && has(self.hours, t.hour())
            && has(self.minutes, t.minute())
            && has(self.seconds, t.second())
    }

    /// First fire time strictly after `after`.
    ///
    /// `None` when the expression cannot fire within the next few years
    /// (e.g. `0 0 31 2 *`).
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let limit = after.year() + SEARCH_YEARS;
        let mut t = next_second(after.with_nanosecond(0)?)?;

        while t.year() <= limit {
            if !has(self.months, t.month()) {
                t = next_month(t)?;
            } else if !self.day_matches(t.date()) {
                t = next_day(t)?;
            } else if !has(self.hours, t.hour()) {
                t = next_hour(t)?;
            } else if !has(self.minutes, t.minute()) {
                t = next_minute(t)?;
            } else if !has(self.seconds, t.second()) {
                t = next_second(t)?;
            } else {
                return Some(t);
            }
        }
        None
    }

    /// Whether the schedule fires in the half-open window `(from, to]`.
    pub fn fires_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        self.next_after(from).is_some_and(|t| t <= to)
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

fn has(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field == "?")
}

fn parse_field(field: &str, min: u32, max: u32, names: &[&str]) -> std::result::Result<u64, String> {
    let mut mask = 0u64;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}' in '{field}'"))?;
                if step == 0 {
                    return Err(format!("step must be positive in '{field}'"));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" || range == "?" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, min, names)?, parse_value(b, min, names)?)
        } else {
            let v = parse_value(range, min, names)?;
            // `5/15` means "from 5, every 15".
            if step.is_some() { (v, max) } else { (v, v) }
        };

        if lo < min || hi > max || lo > hi {
            return Err(format!("'{part}' is out of range {min}-{max}"));
        }

        let step = step.unwrap_or(1) as usize;
        for v in (lo..=hi).step_by(step) {
            mask |= 1u64 << v;
        }
    }

    Ok(mask)
}

fn parse_value(s: &str, min: u32, names: &[&str]) -> std::result::Result<u32, String> {
    if let Ok(v) = s.parse::<u32>() {
        return Ok(v);
    }
    let lower = s.to_lowercase();
    names
        .iter()
        .position(|n| *n == lower)
        .map(|idx| idx as u32 + min)
        .ok_or_else(|| format!("invalid value '{s}'"))
}

fn next_second(t: NaiveDateTime) -> Option<NaiveDateTime> {
    if t.second() < 59 {
        t.with_second(t.second() + 1)
    } else {
        next_minute(t)
    }
}

fn next_minute(t: NaiveDateTime) -> Option<NaiveDateTime> {
    if t.minute() < 59 {
        t.date().and_hms_opt(t.hour(), t.minute() + 1, 0)
    } else {
        next_hour(t)
    }
}

fn next_hour(t: NaiveDateTime) -> Option<NaiveDateTime> {
    if t.hour() < 23 {
        t.date().and_hms_opt(t.hour() + 1, 0, 0)
    } else {
        next_day(t)
    }
}

fn next_day(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.date().succ_opt()?.and_hms_opt(0, 0, 0)
}

fn next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}
