//! Timer schedules for processors
//!
//! Two forms are accepted:
//!
//! - `@every <duration>` with a humantime duration (`@every 1s`, `@every 5m`)
//! - a seconds-first cron expression (`0 */5 * * * *`) or a shorthand such as
//!   `@hourly`
//!
//! Day-of-week numbers run from 0 to 6 with Sunday as 0, so `0 0 12 * * 1-5`
//! fires at noon Monday to Friday. Day names (`Mon-Fri`) work too.
//!
//! A [`Ticker`] is armed from a schedule when a runner starts and dropped
//! when it stops.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::ScheduleError;

const EVERY_PREFIX: &str = "@every";

#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed period, ticks aligned on whole wall-clock seconds
    Every(Duration),

    /// Wall-clock cron schedule evaluated in UTC
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse an optional spec, treating a blank string as "no schedule"
    pub fn parse_optional(spec: Option<&str>) -> Result<Option<Schedule>, ScheduleError> {
        match spec.map(str::trim) {
            None | Some("") => Ok(None),
            Some(spec) => spec.parse().map(Some),
        }
    }

    /// Arm a ticker for this schedule
    pub fn ticker(&self) -> Ticker {
        self.ticker_at(Utc::now())
    }

    /// Arm a ticker as if the wall clock read `now`
    ///
    /// An `@every` period of at least one second fires first one period after
    /// the start of the current wall-clock second, then every period after
    /// that. Shorter periods fire one period after arming.
    pub fn ticker_at(&self, now: DateTime<Utc>) -> Ticker {
        match self {
            Schedule::Every(period) => {
                let first = first_delay(*period, now.timestamp_subsec_nanos());
                let mut interval = tokio::time::interval_at(Instant::now() + first, *period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Ticker::Interval(interval)
            }
            Schedule::Cron(schedule) => Ticker::Cron {
                schedule: schedule.clone(),
                next: None,
            },
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();

        if let Some(rest) = spec.strip_prefix(EVERY_PREFIX) {
            let period =
                humantime::parse_duration(rest.trim()).map_err(|source| ScheduleError::Duration {
                    spec: spec.to_string(),
                    source,
                })?;
            if period.is_zero() {
                return Err(ScheduleError::ZeroInterval(spec.to_string()));
            }
            return Ok(Schedule::Every(period));
        }

        cron::Schedule::from_str(&normalize_day_of_week(spec))
            .map(|schedule| Schedule::Cron(Box::new(schedule)))
            .map_err(|source| ScheduleError::Cron {
                spec: spec.to_string(),
                source,
            })
    }
}

fn first_delay(period: Duration, subsec_nanos: u32) -> Duration {
    if period < Duration::from_secs(1) {
        return period;
    }
    // leap seconds report more than 1e9 nanos
    period.saturating_sub(Duration::from_nanos(u64::from(subsec_nanos.min(999_999_999))))
}

/// Rewrite numeric day-of-week values from Sunday=0 to the Sunday=1
/// numbering used by the `cron` crate
fn normalize_day_of_week(spec: &str) -> String {
    let mut fields: Vec<String> = spec.split_whitespace().map(String::from).collect();
    if spec.starts_with('@') || fields.len() < 6 {
        return spec.to_string();
    }

    fields[5] = fields[5]
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };
            let range = range.split('-').map(shift_day).collect::<Vec<_>>().join("-");
            match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",");

    fields.join(" ")
}

fn shift_day(day: &str) -> String {
    match day.parse::<u32>() {
        Ok(day) => (day + 1).to_string(),
        Err(_) => day.to_string(),
    }
}

/// Armed timer source
#[derive(Debug)]
pub enum Ticker {
    Interval(Interval),
    Cron {
        schedule: Box<cron::Schedule>,
        next: Option<DateTime<Utc>>,
    },
}

impl Ticker {
    /// Wait for the next fire time
    ///
    /// Cancel safe: the pending fire time is kept until it has elapsed, so a
    /// dropped call does not skip a tick.
    pub async fn tick(&mut self) {
        match self {
            Ticker::Interval(interval) => {
                interval.tick().await;
            }
            Ticker::Cron { schedule, next } => {
                let fire_at = match *next {
                    Some(fire_at) => fire_at,
                    None => match schedule.upcoming(Utc).next() {
                        Some(fire_at) => {
                            *next = Some(fire_at);
                            fire_at
                        }
                        // the expression has no future occurrences
                        None => return std::future::pending().await,
                    },
                };

                let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                *next = schedule.after(&fire_at).next();
                if next.is_none() {
                    // park the ticker on an instant that never comes
                    *next = Some(DateTime::<Utc>::MAX_UTC);
                }
            }
        }
    }
}

/// Wait on an optional ticker, never completing when there is none
pub async fn next_tick(ticker: &mut Option<Ticker>) {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}
