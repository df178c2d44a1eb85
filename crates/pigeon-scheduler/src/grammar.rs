// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Natural-language schedule grammar.
//!
//! Users type things like "every 2 hours", "daily at 9am" or "in 30 minutes"
//! when asking the agent to schedule a recurring prompt. This module turns
//! that text into a [`ScheduleKind`] plus a next run time, and turns a stored
//! `(schedule_kind, schedule_data)` pair back into a next run time after each
//! execution. Unrecognized input is a hard error — guessing a schedule the
//! user didn't ask for is worse than refusing it.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("could not understand schedule {0:?}")]
    Unrecognized(String),
    #[error("schedule amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("invalid time of day {hour}:{minute:02}")]
    InvalidTimeOfDay { hour: u32, minute: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleKind {
    Once,
    Interval,
    Daily,
}

impl ScheduleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleKind::Once => "once",
            ScheduleKind::Interval => "interval",
            ScheduleKind::Daily => "daily",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "once" => Some(ScheduleKind::Once),
            "interval" => Some(ScheduleKind::Interval),
            "daily" => Some(ScheduleKind::Daily),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    fn to_duration(&self, amount: i64) -> Duration {
        match self {
            IntervalUnit::Seconds => Duration::seconds(amount),
            IntervalUnit::Minutes => Duration::minutes(amount),
            IntervalUnit::Hours => Duration::hours(amount),
            IntervalUnit::Days => Duration::days(amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSchedule {
    pub kind: ScheduleKind,
    pub schedule_data: serde_json::Value,
    pub next_run: DateTime<Utc>,
}

fn every_interval_regex() -> Regex {
    Regex::new(r"(?i)^every\s+(\d+)\s*(second|seconds|sec|secs|minute|minutes|min|mins|hour|hours|hr|hrs|day|days)$")
        .expect("static regex is valid")
}

fn every_bare_unit_regex() -> Regex {
    Regex::new(r"(?i)^every\s+(second|seconds|minute|minutes|hour|hours|day|days)$")
        .expect("static regex is valid")
}

fn in_duration_regex() -> Regex {
    Regex::new(r"(?i)^in\s+(\d+)\s*(minute|minutes|min|mins|hour|hours|hr|hrs)$")
        .expect("static regex is valid")
}

fn daily_at_regex() -> Regex {
    Regex::new(r"(?i)^daily\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").expect("static regex is valid")
}

/// Parse a schedule phrase relative to `now`. `now` is injected rather than
/// read from the clock so the grammar itself stays pure and testable.
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<ParsedSchedule, ScheduleError> {
    let text = input.trim();
    let lower = text.to_lowercase();

    match lower.as_str() {
        "every morning" => return daily_at(9, 0, now),
        "every evening" => return daily_at(18, 0, now),
        "every night" => return daily_at(21, 0, now),
        _ => {}
    }

    if let Some(caps) = every_interval_regex().captures(&lower) {
        let amount: i64 = caps[1].parse().unwrap();
        if amount <= 0 {
            return Err(ScheduleError::NonPositiveAmount(amount));
        }
        let unit = normalize_unit(&caps[2]);
        let next_run = now + unit.to_duration(amount);
        return Ok(ParsedSchedule {
            kind: ScheduleKind::Interval,
            schedule_data: serde_json::json!({ "unit": unit_str(&unit), "amount": amount }),
            next_run,
        });
    }

    if let Some(caps) = every_bare_unit_regex().captures(&lower) {
        let unit = normalize_unit(&caps[1]);
        let next_run = now + unit.to_duration(1);
        return Ok(ParsedSchedule {
            kind: ScheduleKind::Interval,
            schedule_data: serde_json::json!({ "unit": unit_str(&unit), "amount": 1 }),
            next_run,
        });
    }

    if let Some(caps) = in_duration_regex().captures(&lower) {
        let amount: i64 = caps[1].parse().unwrap();
        if amount <= 0 {
            return Err(ScheduleError::NonPositiveAmount(amount));
        }
        let unit = normalize_unit(&caps[2]);
        let next_run = now + unit.to_duration(amount);
        return Ok(ParsedSchedule {
            kind: ScheduleKind::Once,
            schedule_data: serde_json::json!({ "at": next_run.to_rfc3339() }),
            next_run,
        });
    }

    if let Some(caps) = daily_at_regex().captures(&lower) {
        let mut hour: u32 = caps[1].parse().unwrap();
        let minute: u32 = caps.get(2).map(|m| m.as_str().parse().unwrap()).unwrap_or(0);
        if let Some(ampm) = caps.get(3) {
            match ampm.as_str() {
                "pm" if hour < 12 => hour += 12,
                "am" if hour == 12 => hour = 0,
                _ => {}
            }
        }
        return daily_at(hour, minute, now);
    }

    let iso_candidate = if lower.starts_with("once at ") {
        text["once at ".len()..].trim()
    } else {
        text
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(iso_candidate) {
        let dt = dt.with_timezone(&Utc);
        return Ok(ParsedSchedule {
            kind: ScheduleKind::Once,
            schedule_data: serde_json::json!({ "at": dt.to_rfc3339() }),
            next_run: dt,
        });
    }

    Err(ScheduleError::Unrecognized(input.to_string()))
}

/// Recompute the next run time for a persisted task after it fires.
/// `Once` tasks return `None`, signalling the caller to disable the task.
pub fn next_occurrence(
    kind: ScheduleKind,
    schedule_data: &serde_json::Value,
    ran_at: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    match kind {
        ScheduleKind::Once => Ok(None),
        ScheduleKind::Interval => {
            let amount = schedule_data["amount"].as_i64().unwrap_or(0);
            let unit = match schedule_data["unit"].as_str().unwrap_or("") {
                "seconds" => IntervalUnit::Seconds,
                "minutes" => IntervalUnit::Minutes,
                "hours" => IntervalUnit::Hours,
                "days" => IntervalUnit::Days,
                other => return Err(ScheduleError::Unrecognized(other.to_string())),
            };
            Ok(Some(ran_at + unit.to_duration(amount)))
        }
        ScheduleKind::Daily => {
            let hour = schedule_data["hour"].as_u64().unwrap_or(0) as u32;
            let minute = schedule_data["minute"].as_u64().unwrap_or(0) as u32;
            let parsed = daily_at(hour, minute, ran_at)?;
            Ok(Some(parsed.next_run))
        }
    }
}

fn normalize_unit(raw: &str) -> IntervalUnit {
    match raw {
        "second" | "seconds" | "sec" | "secs" => IntervalUnit::Seconds,
        "minute" | "minutes" | "min" | "mins" => IntervalUnit::Minutes,
        "hour" | "hours" | "hr" | "hrs" => IntervalUnit::Hours,
        _ => IntervalUnit::Days,
    }
}

fn unit_str(unit: &IntervalUnit) -> &'static str {
    match unit {
        IntervalUnit::Seconds => "seconds",
        IntervalUnit::Minutes => "minutes",
        IntervalUnit::Hours => "hours",
        IntervalUnit::Days => "days",
    }
}

fn daily_at(hour: u32, minute: u32, now: DateTime<Utc>) -> Result<ParsedSchedule, ScheduleError> {
    if hour > 23 || minute > 59 {
        return Err(ScheduleError::InvalidTimeOfDay { hour, minute });
    }
    let today = now
        .with_hour(hour)
        .and_then(|t| t.with_minute(minute))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let next_run = if today > now { today } else { today + Duration::days(1) };
    Ok(ParsedSchedule {
        kind: ScheduleKind::Daily,
        schedule_data: serde_json::json!({ "hour": hour, "minute": minute }),
        next_run,
    })
}
