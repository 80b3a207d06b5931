//! When should the next organization pass run?
//!
//! All functions here are pure: the current instant is an argument, so the
//! same inputs always give the same trigger. Owning the timer is up to the
//! caller.

use crate::error::ScheduleError;
use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Delay before the startup pass, so the desktop can settle first.
pub const STARTUP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    #[default]
    Daily,
    Weekly,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    #[default]
    Hours,
    Days,
}

impl IntervalUnit {
    fn seconds(self) -> i64 {
        match self {
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }
}

/// Repeat interval of a custom schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub value: u32,
    pub unit: IntervalUnit,
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            value: 4,
            unit: IntervalUnit::Hours,
        }
    }
}

impl Interval {
    pub fn to_delta(self) -> Result<TimeDelta, ScheduleError> {
        if self.value == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        TimeDelta::try_seconds(i64::from(self.value) * self.unit.seconds())
            .ok_or(ScheduleError::IntervalOverflow)
    }
}

/// How often automatic passes run.
///
/// Only the fields relevant to `kind` are read; the rest are kept so that
/// switching kinds in the settings does not lose them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub run_on_startup: bool,
    /// Stored for the settings layer. Idle detection is not implemented, so
    /// passes are never delayed waiting for the machine to go idle.
    pub run_when_idle: bool,
    pub kind: ScheduleKind,
    /// 0-23, used by daily and weekly schedules.
    pub hour_of_day: u32,
    /// 0-6 with 0 = Sunday, used by weekly schedules.
    pub day_of_week: u32,
    /// Used by custom schedules.
    pub interval: Interval,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_on_startup: false,
            run_when_idle: true,
            kind: ScheduleKind::Daily,
            hour_of_day: 20,
            day_of_week: 1,
            interval: Interval::default(),
        }
    }
}

impl ScheduleConfig {
    /// Checks the fields that `kind` uses.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self.kind {
            ScheduleKind::Daily => self.check_hour(),
            ScheduleKind::Weekly => {
                self.check_hour()?;
                if self.day_of_week > 6 {
                    return Err(ScheduleError::InvalidDay(self.day_of_week));
                }
                Ok(())
            }
            ScheduleKind::Custom => self.interval.to_delta().map(|_| ()),
        }
    }

    fn check_hour(&self) -> Result<(), ScheduleError> {
        if self.hour_of_day > 23 {
            return Err(ScheduleError::InvalidHour(self.hour_of_day));
        }
        Ok(())
    }

    /// How long after process start the startup pass should run, if at all.
    pub fn startup_delay(&self) -> Option<Duration> {
        self.run_on_startup.then_some(STARTUP_GRACE)
    }
}

/// The local instant for `date` at `hour:00:00`.
///
/// An hour skipped by a daylight-saving jump resolves to the hour after it.
fn at_hour<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(hour, 0, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest(),
    }
}

/// Computes the first trigger strictly after `now`.
///
/// Returns `Ok(None)` when automatic organization is disabled.
///
/// # Examples
///
/// ```
/// use autotidy::schedule::{next_trigger, ScheduleConfig};
/// use chrono::{TimeZone, Utc};
///
/// let config = ScheduleConfig { hour_of_day: 20, ..ScheduleConfig::default() };
/// let now = Utc.with_ymd_and_hms(2024, 3, 4, 19, 0, 0).unwrap();
///
/// let next = next_trigger(&config, &now, true).unwrap();
/// assert_eq!(next, Some(Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap()));
/// ```
pub fn next_trigger<Tz: TimeZone>(
    config: &ScheduleConfig,
    now: &DateTime<Tz>,
    enabled: bool,
) -> Result<Option<DateTime<Tz>>, ScheduleError> {
    if !enabled {
        return Ok(None);
    }
    config.validate()?;

    let tz = now.timezone();
    let today = now.date_naive();

    let next = match config.kind {
        ScheduleKind::Daily => match at_hour(&tz, today, config.hour_of_day) {
            Some(candidate) if candidate > *now => Some(candidate),
            _ => today
                .checked_add_days(Days::new(1))
                .and_then(|tomorrow| at_hour(&tz, tomorrow, config.hour_of_day)),
        },
        ScheduleKind::Weekly => {
            let current = now.weekday().num_days_from_sunday();
            let days_until = (config.day_of_week + 7 - current) % 7;
            let target = today.checked_add_days(Days::new(u64::from(days_until)));

            match target.and_then(|date| at_hour(&tz, date, config.hour_of_day)) {
                Some(candidate) if candidate > *now => Some(candidate),
                _ => target
                    .and_then(|date| date.checked_add_days(Days::new(7)))
                    .and_then(|date| at_hour(&tz, date, config.hour_of_day)),
            }
        }
        ScheduleKind::Custom => {
            let delta = config.interval.to_delta()?;
            Some(
                now.clone()
                    .checked_add_signed(delta)
                    .ok_or(ScheduleError::IntervalOverflow)?,
            )
        }
    };

    Ok(next)
}

/// Like [`next_trigger`], but custom intervals continue from the last pass.
///
/// A custom schedule restarted after `last_run` fires at
/// `last_run + interval` instead of waiting a full interval from `now`; an
/// overdue trigger is due immediately. Daily and weekly schedules ignore
/// `last_run`.
pub fn resume_trigger<Tz: TimeZone>(
    config: &ScheduleConfig,
    now: &DateTime<Tz>,
    last_run: Option<DateTime<Utc>>,
    enabled: bool,
) -> Result<Option<DateTime<Tz>>, ScheduleError> {
    let (ScheduleKind::Custom, Some(last_run), true) = (config.kind, last_run, enabled) else {
        return next_trigger(config, now, enabled);
    };

    let delta = config.interval.to_delta()?;
    let due = last_run
        .with_timezone(&now.timezone())
        .checked_add_signed(delta)
        .ok_or(ScheduleError::IntervalOverflow)?;

    Ok(Some(if due > *now { due } else { now.clone() }))
}

/// Renders a trigger the way the tray tooltip shows it.
///
/// "Today at 20:00", "Tomorrow at 20:00", or "2024-03-11 at 20:00".
pub fn describe_trigger<Tz>(next: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = next.format("%H:%M");
    let today = now.date_naive();

    if next.date_naive() == today {
        format!("Today at {}", time)
    } else if today.succ_opt() == Some(next.date_naive()) {
        format!("Tomorrow at {}", time)
    } else {
        format!("{} at {}", next.format("%Y-%m-%d"), time)
    }
}
