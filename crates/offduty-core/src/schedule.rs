//! Weekly availability schedule.
//!
//! A [`Schedule`] is an ordered list of [`Window`]s, each naming the weekdays
//! it applies to and a local wall-clock interval. A call is "within hours" when
//! any window covers its arrival instant.
//!
//! ## Matching rules
//!
//! - Weekdays are numbered 0-6 with Sunday = 0, taken from the UTC date of
//!   the arrival instant (not the local date).
//! - Window bounds are `HH:MM` local times. Minutes are validated but matching
//!   happens at whole-hour granularity: `09:30-17:00` behaves exactly like
//!   `09:00-17:00`.
//! - Both bounds are converted to UTC hours with the offset in force at the
//!   arrival instant and compared as a half-open interval that may wrap past
//!   midnight. Equal bounds cover the whole day.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dst::OffsetResolver;

/// Monday through Friday in Sunday-based numbering.
pub const WORKWEEK: [u8; 5] = [1, 2, 3, 4, 5];

/// Every day of the week.
pub const ALL_DAYS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

/// Errors raised while reading a window's times.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Not of the form `H:MM` or `HH:MM`.
    #[error("invalid time {0:?}: expected HH:MM")]
    InvalidFormat(String),

    /// Hour component outside 0-23.
    #[error("invalid time {0:?}: hour must be 0-23")]
    HourOutOfRange(String),

    /// Minute component outside 0-59.
    #[error("invalid time {0:?}: minute must be 0-59")]
    MinuteOutOfRange(String),
}

/// Result type for schedule operations.
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Local wall-clock time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    /// Hour (0-23).
    pub hour: u8,
    /// Minute (0-59).
    pub minute: u8,
}

impl TimeOfDay {
    /// Creates a new TimeOfDay.
    ///
    /// # Panics
    /// Panics if hour >= 24 or minute >= 60.
    pub fn new(hour: u8, minute: u8) -> Self {
        assert!(hour < 24, "hour must be 0-23");
        assert!(minute < 60, "minute must be 0-59");
        Self { hour, minute }
    }

    /// Parses `H:MM` or `HH:MM`.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || ScheduleError::InvalidFormat(value.to_string());

        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| {
            (1..=2).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(hour) || !digits(minute) {
            return Err(invalid());
        }

        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        if hour >= 24 {
            return Err(ScheduleError::HourOutOfRange(value.to_string()));
        }
        if minute >= 60 {
            return Err(ScheduleError::MinuteOutOfRange(value.to_string()));
        }

        Ok(Self { hour, minute })
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Converts a local wall-clock hour to the UTC hour, using the offset in force
/// at `reference`.
pub fn to_utc_hour(local_hour: u8, reference: DateTime<Utc>, resolver: &dyn OffsetResolver) -> u8 {
    let offset = resolver.utc_offset_hours(reference);
    // rem_euclid keeps the result in 0..24 for any offset sign
    (i32::from(local_hour) - offset).rem_euclid(24) as u8
}

/// Tests whether `current` lies in the half-open hour interval `[from, to)`.
///
/// An interval with `from > to` wraps past midnight. Equal bounds match every
/// hour.
pub fn hour_in_window(current: u8, from: u8, to: u8) -> bool {
    if from == to {
        return true;
    }
    if from < to {
        current >= from && current < to
    } else {
        current >= from || current < to
    }
}

/// Sunday-based weekday (0-6) of the UTC date of `instant`.
pub fn utc_weekday(instant: DateTime<Utc>) -> u8 {
    instant.weekday().num_days_from_sunday() as u8
}

/// One recurring weekly interval of allowed local hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    /// Weekdays this window applies to (0 = Sunday).
    pub day_of_week: BTreeSet<u8>,
    /// Local start time, `HH:MM`.
    pub start_time: String,
    /// Local end time, `HH:MM`.
    pub end_time: String,
}

impl Window {
    /// Creates a new window.
    pub fn new(
        days: impl IntoIterator<Item = u8>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            day_of_week: days.into_iter().collect(),
            start_time: start_time.into(),
            end_time: end_time.into(),
        }
    }

    /// Returns true if this window applies on the given weekday.
    pub fn applies_on(&self, weekday: u8) -> bool {
        self.day_of_week.contains(&weekday)
    }

    /// Parsed start time.
    pub fn start(&self) -> Result<TimeOfDay> {
        TimeOfDay::parse(&self.start_time)
    }

    /// Parsed end time.
    pub fn end(&self) -> Result<TimeOfDay> {
        TimeOfDay::parse(&self.end_time)
    }

    /// Returns the `(from, to)` UTC hours of this window at `reference`.
    ///
    /// Each bound is resolved independently with the same reference instant.
    pub fn utc_hours(
        &self,
        reference: DateTime<Utc>,
        resolver: &dyn OffsetResolver,
    ) -> Result<(u8, u8)> {
        let from = to_utc_hour(self.start()?.hour, reference, resolver);
        let to = to_utc_hour(self.end()?.hour, reference, resolver);
        Ok((from, to))
    }

    /// Checks if this window covers `now`.
    ///
    /// Times are only parsed when the window applies on `now`'s weekday.
    pub fn covers(&self, now: DateTime<Utc>, resolver: &dyn OffsetResolver) -> Result<bool> {
        if !self.applies_on(utc_weekday(now)) {
            return Ok(false);
        }
        let (from, to) = self.utc_hours(now, resolver)?;
        Ok(hour_in_window(now.hour() as u8, from, to))
    }

    /// Lists everything wrong with this window, in field order.
    pub fn problems(&self) -> Vec<WindowProblem> {
        let mut problems = Vec::new();
        if self.day_of_week.is_empty() {
            problems.push(WindowProblem::NoDays);
        }
        for &day in self.day_of_week.iter().filter(|&&d| d > 6) {
            problems.push(WindowProblem::DayOutOfRange(day));
        }
        if let Err(e) = self.start() {
            problems.push(WindowProblem::StartTime(e));
        }
        if let Err(e) = self.end() {
            problems.push(WindowProblem::EndTime(e));
        }
        problems
    }
}

/// A defect found by [`Schedule::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowProblem {
    /// The window applies on no day and can never match.
    #[error("no weekdays selected")]
    NoDays,

    /// A weekday number outside 0-6; it never matches.
    #[error("weekday {0} is outside 0-6")]
    DayOutOfRange(u8),

    /// Unreadable start time.
    #[error("start time: {0}")]
    StartTime(ScheduleError),

    /// Unreadable end time.
    #[error("end time: {0}")]
    EndTime(ScheduleError),
}

/// A problem tied to the window it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleIssue {
    /// Zero-based index into `allowed_times`.
    pub window: usize,
    /// What is wrong.
    pub problem: WindowProblem,
}

impl fmt::Display for ScheduleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {}: {}", self.window, self.problem)
    }
}

/// Weekly availability schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// A disabled schedule never matches.
    #[serde(default)]
    pub enabled: bool,
    /// Timezone label. Informational only; offsets come from the engine's resolver.
    #[serde(default)]
    pub timezone: String,
    /// Allowed windows, evaluated in order.
    #[serde(default)]
    pub allowed_times: Vec<Window>,
}

impl Schedule {
    /// Creates an enabled schedule with no windows.
    pub fn new(timezone: impl Into<String>) -> Self {
        Self {
            enabled: true,
            timezone: timezone.into(),
            allowed_times: Vec::new(),
        }
    }

    /// Monday to Friday, 09:00-17:00 local.
    pub fn business_hours() -> Self {
        let mut schedule = Self::new("Asia/Jerusalem");
        schedule.add_window(Window::new(WORKWEEK, "09:00", "17:00"));
        schedule
    }

    /// Adds a window to the end of the schedule.
    pub fn add_window(&mut self, window: Window) {
        self.allowed_times.push(window);
    }

    /// Disables this schedule.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Checks whether `now` falls inside any window.
    ///
    /// Stops at the first matching window. A malformed time on a window that
    /// applies today is an error rather than a silent non-match.
    pub fn is_within(&self, now: DateTime<Utc>, resolver: &dyn OffsetResolver) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        for window in &self.allowed_times {
            if window.covers(now, resolver)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns the index of the first window covering `now`, if any.
    pub fn matching_window(
        &self,
        now: DateTime<Utc>,
        resolver: &dyn OffsetResolver,
    ) -> Result<Option<usize>> {
        if !self.enabled {
            return Ok(None);
        }
        for (index, window) in self.allowed_times.iter().enumerate() {
            if window.covers(now, resolver)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Reports every malformed window without evaluating anything.
    pub fn validate(&self) -> Vec<ScheduleIssue> {
        self.allowed_times
            .iter()
            .enumerate()
            .flat_map(|(window, w)| {
                w.problems()
                    .into_iter()
                    .map(move |problem| ScheduleIssue { window, problem })
            })
            .collect()
    }
}

/// Checks an optional schedule; an absent schedule never matches.
pub fn is_within_schedule(
    schedule: Option<&Schedule>,
    now: DateTime<Utc>,
    resolver: &dyn OffsetResolver,
) -> Result<bool> {
    match schedule {
        Some(schedule) => schedule.is_within(now, resolver),
        None => Ok(false),
    }
}
