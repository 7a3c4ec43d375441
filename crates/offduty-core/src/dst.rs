//! UTC offset resolution for the supported local timezone.
//!
//! The gatekeeper evaluates schedules written in local wall-clock time, so
//! every evaluation needs the UTC offset in force at the call's arrival
//! instant. Offset rules are pluggable through [`OffsetResolver`]:
//!
//! - [`IsraelDst`] - +02:00 standard, +03:00 daylight, switching on a fixed
//!   two-transition calendar (see [`dst_boundaries`]).
//! - [`ConstantOffset`] - a region that never changes its offset.
//!
//! ## Transition calendar
//!
//! - Spring forward: 00:00 UTC on the Friday two days before the last Sunday
//!   of March. This is computed from the last Sunday, not as "last Friday of
//!   March"; the two differ in years such as 2018.
//! - Fall back: 23:00 UTC on the day before the last Sunday of October.
//!
//! Boundaries are computed for the instant's own UTC year only. An instant in
//! early January never consults the previous year's fall-back boundary.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Month number of March in chrono's 1-based numbering.
const MARCH: u32 = 3;

/// Month number of October in chrono's 1-based numbering.
const OCTOBER: u32 = 10;

/// Resolves the UTC offset, in whole hours, in force at an instant.
pub trait OffsetResolver: Send + Sync {
    /// Returns the local UTC offset in hours at `instant` (east of UTC is positive).
    fn utc_offset_hours(&self, instant: DateTime<Utc>) -> i32;

    /// Returns true if daylight-saving time is in force at `instant`.
    fn is_dst_active(&self, _instant: DateTime<Utc>) -> bool {
        false
    }

    /// Short human-readable name used in logs.
    fn name(&self) -> &str;
}

/// UTC instants of one year's two offset transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DstBoundaries {
    /// First instant at which the daylight offset applies.
    pub spring_forward: DateTime<Utc>,
    /// First instant at which the standard offset applies again.
    pub fall_back: DateTime<Utc>,
}

impl DstBoundaries {
    /// Returns true if `instant` lies in `[spring_forward, fall_back)`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.spring_forward && instant < self.fall_back
    }
}

/// Returns the last Sunday of `month` (1-12) in `year`.
///
/// Starts at the last calendar day of the month and steps back 0-6 days, so a
/// month ending on a Sunday returns its last day. Returns `None` only for
/// dates outside chrono's representable range.
pub fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    let last_day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    let back = last_day.weekday().num_days_from_sunday();
    last_day.checked_sub_days(Days::new(u64::from(back)))
}

/// Day on which clocks spring forward: two days before the last Sunday of March.
pub fn spring_forward_day(year: i32) -> Option<NaiveDate> {
    last_sunday(year, MARCH)?.checked_sub_days(Days::new(2))
}

/// Day on which clocks fall back: the last Sunday of October.
pub fn fall_back_day(year: i32) -> Option<NaiveDate> {
    last_sunday(year, OCTOBER)
}

/// Computes the transition instants for `year`.
pub fn dst_boundaries(year: i32) -> Option<DstBoundaries> {
    let spring_midnight = spring_forward_day(year)?.and_hms_opt(0, 0, 0)?;
    let fall_midnight = fall_back_day(year)?.and_hms_opt(0, 0, 0)?;

    Some(DstBoundaries {
        spring_forward: Utc.from_utc_datetime(&spring_midnight),
        fall_back: Utc.from_utc_datetime(&fall_midnight) - TimeDelta::hours(1),
    })
}

/// Israel Standard Time (+02:00) with Israel Daylight Time (+03:00).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsraelDst;

impl IsraelDst {
    /// Offset outside the daylight period.
    pub const STANDARD_OFFSET_HOURS: i32 = 2;
    /// Offset during the daylight period.
    pub const DAYLIGHT_OFFSET_HOURS: i32 = 3;
}

impl OffsetResolver for IsraelDst {
    fn utc_offset_hours(&self, instant: DateTime<Utc>) -> i32 {
        if self.is_dst_active(instant) {
            Self::DAYLIGHT_OFFSET_HOURS
        } else {
            Self::STANDARD_OFFSET_HOURS
        }
    }

    fn is_dst_active(&self, instant: DateTime<Utc>) -> bool {
        // Years at the edge of chrono's range have no boundaries; treat as standard time.
        dst_boundaries(instant.year()).is_some_and(|b| b.contains(instant))
    }

    fn name(&self) -> &str {
        "Asia/Jerusalem"
    }
}

/// A region whose offset never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantOffset {
    hours: i32,
}

impl ConstantOffset {
    /// Creates a resolver that always returns `hours`.
    pub fn new(hours: i32) -> Self {
        Self { hours }
    }

    /// UTC itself.
    pub fn utc() -> Self {
        Self::new(0)
    }
}

impl OffsetResolver for ConstantOffset {
    fn utc_offset_hours(&self, _instant: DateTime<Utc>) -> i32 {
        self.hours
    }

    fn name(&self) -> &str {
        "constant"
    }
}
