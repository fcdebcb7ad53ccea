//! Next-run computation. Everything here is a pure function of a schedule and
//! a reference instant; the tick loop supplies "now".

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::models::{Frequency, MonthDayPolicy, Schedule};

/// Upper bound on periods examined for one computation. Only reachable by
/// month-day combinations that never occur (day 31 every 12 months from April).
const MAX_PERIODS: u64 = 120;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("interval must be at least 1")]
    InvalidInterval,

    #[error("time_of_day must be HH:MM, got {0:?}")]
    InvalidTimeOfDay(String),

    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),

    #[error("days_of_week entries must be 0 (Sunday) to 6 (Saturday), got {0}")]
    InvalidDayOfWeek(u8),

    #[error("days_of_month entries must be 1 to 31, got {0}")]
    InvalidDayOfMonth(u8),

    #[error("start_date must be before end_date")]
    InvalidWindow,
}

/// A validated [`Schedule`].
#[derive(Debug, Clone)]
pub struct Recurrence {
    frequency: Frequency,
    interval: u32,
    days_of_week: Vec<u8>,
    days_of_month: Vec<u8>,
    time: NaiveTime,
    tz: Tz,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    policy: MonthDayPolicy,
}

impl Recurrence {
    pub fn parse(schedule: &Schedule) -> Result<Self, ScheduleError> {
        if schedule.interval < 1 {
            return Err(ScheduleError::InvalidInterval);
        }
        let time = NaiveTime::parse_from_str(schedule.time_of_day.trim(), "%H:%M")
            .map_err(|_| ScheduleError::InvalidTimeOfDay(schedule.time_of_day.clone()))?;
        let tz: Tz = schedule
            .timezone
            .trim()
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(schedule.timezone.clone()))?;

        if let Some(&day) = schedule.days_of_week.iter().find(|&&d| d > 6) {
            return Err(ScheduleError::InvalidDayOfWeek(day));
        }
        if let Some(&day) = schedule
            .days_of_month
            .iter()
            .find(|&&d| !(1..=31).contains(&d))
        {
            return Err(ScheduleError::InvalidDayOfMonth(day));
        }
        if let (Some(start), Some(end)) = (schedule.start_date, schedule.end_date)
            && start >= end
        {
            return Err(ScheduleError::InvalidWindow);
        }

        let mut days_of_week = schedule.days_of_week.clone();
        days_of_week.sort_unstable();
        days_of_week.dedup();
        let mut days_of_month = schedule.days_of_month.clone();
        days_of_month.sort_unstable();
        days_of_month.dedup();

        Ok(Self {
            frequency: schedule.frequency,
            interval: schedule.interval,
            days_of_week,
            days_of_month,
            time,
            tz,
            start: schedule.start_date,
            end: schedule.end_date,
            policy: schedule.month_day_policy,
        })
    }

    /// First run for a newly created or edited entry: strictly after `now`
    /// and not before `start_date`.
    ///
    /// With `interval > 1` the periods are counted from the one containing
    /// the reference date, so the first run can skip the nearest qualifying
    /// date: monthly on the 1st every 2 months, created on 2024-01-15, first
    /// fires on 2024-03-01, not 2024-02-01.
    pub fn initial_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.frequency == Frequency::Once {
            return match self.start {
                Some(start) if start > now => self.within_end(start),
                _ => self.first_after(self.local_date(now), now),
            };
        }

        let reference = self.start.map_or(now, |start| start.max(now));
        self.first_after(self.local_date(reference), now)
    }

    /// Run after `previous`, counted from `previous` rather than from `now` so
    /// late ticks do not shift the series. Missed runs are not back-filled.
    pub fn following_run(
        &self,
        previous: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if self.frequency == Frequency::Once {
            return None;
        }
        self.first_after(self.local_date(previous), previous.max(now))
    }

    fn first_after(&self, anchor: NaiveDate, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let first = self.periods_to_skip(anchor, self.local_date(after));

        for period in first..first + MAX_PERIODS {
            for date in self.period_dates(anchor, period)? {
                let at = localize(self.tz, date, self.time);
                if at > after && self.start.is_none_or(|start| at >= start) {
                    return self.within_end(at);
                }
                if self.end.is_some_and(|end| at > end) {
                    return None;
                }
            }
        }
        None
    }

    /// Whole periods between the anchor and `target` that cannot hold the
    /// answer, less one so a partially elapsed period is still examined.
    fn periods_to_skip(&self, anchor: NaiveDate, target: NaiveDate) -> u64 {
        let interval = i64::from(self.interval);
        let elapsed = match self.frequency {
            Frequency::Once | Frequency::Daily => (target - anchor).num_days() / interval,
            Frequency::Weekly => (week_start(target) - week_start(anchor)).num_days() / 7 / interval,
            Frequency::Monthly | Frequency::Quarterly | Frequency::Yearly => {
                (month_index(target) - month_index(anchor)) / self.month_step()
            }
        };
        u64::try_from(elapsed - 1).unwrap_or(0)
    }

    fn month_step(&self) -> i64 {
        let interval = i64::from(self.interval);
        match self.frequency {
            Frequency::Quarterly => 3 * interval,
            Frequency::Yearly => 12 * interval,
            _ => interval,
        }
    }

    /// Candidate dates of the `period`-th period after the anchor, ascending.
    fn period_dates(&self, anchor: NaiveDate, period: u64) -> Option<Vec<NaiveDate>> {
        let interval = u64::from(self.interval);
        let dates = match self.frequency {
            Frequency::Once | Frequency::Daily => {
                vec![anchor.checked_add_days(Days::new(period * interval))?]
            }
            Frequency::Weekly => {
                let base = week_start(anchor).checked_add_days(Days::new(7 * interval * period))?;
                let weekdays = if self.days_of_week.is_empty() {
                    vec![anchor.weekday().num_days_from_sunday() as u8]
                } else {
                    self.days_of_week.clone()
                };
                weekdays
                    .into_iter()
                    .filter_map(|d| base.checked_add_days(Days::new(u64::from(d))))
                    .collect()
            }
            Frequency::Monthly => {
                let (year, month) = month_from_index(month_index(anchor) + self.month_step() * period as i64);
                let days = if self.days_of_month.is_empty() {
                    vec![anchor.day() as u8]
                } else {
                    self.days_of_month.clone()
                };
                let last = last_day_of_month(year, month);
                let mut dates: Vec<NaiveDate> = days
                    .into_iter()
                    .filter_map(|day| {
                        let day = u32::from(day);
                        match self.policy {
                            MonthDayPolicy::Skip if day > last => None,
                            _ => NaiveDate::from_ymd_opt(year, month, day.min(last)),
                        }
                    })
                    .collect();
                dates.dedup();
                dates
            }
            Frequency::Quarterly | Frequency::Yearly => {
                let (year, month) = month_from_index(month_index(anchor) + self.month_step() * period as i64);
                let day = self.anchor_day(anchor).min(last_day_of_month(year, month));
                vec![NaiveDate::from_ymd_opt(year, month, day)?]
            }
        };
        Some(dates)
    }

    fn anchor_day(&self, anchor: NaiveDate) -> u32 {
        self.days_of_month
            .first()
            .map(|&d| u32::from(d))
            .or_else(|| self.start.map(|start| self.local_date(start).day()))
            .unwrap_or_else(|| anchor.day())
    }

    fn within_end(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.end {
            Some(end) if at > end => None,
            _ => Some(at),
        }
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }
}

/// Validates `schedule` and fills the implicit day lists from the reference
/// date (`start_date`, else `now`) so later recomputations stay anchored.
pub fn normalize(schedule: &mut Schedule, now: DateTime<Utc>) -> Result<(), ScheduleError> {
    let recurrence = Recurrence::parse(schedule)?;
    let reference = recurrence.local_date(schedule.start_date.unwrap_or(now));

    match schedule.frequency {
        Frequency::Weekly if schedule.days_of_week.is_empty() => {
            schedule
                .days_of_week
                .push(reference.weekday().num_days_from_sunday() as u8);
        }
        Frequency::Monthly | Frequency::Quarterly | Frequency::Yearly
            if schedule.days_of_month.is_empty() =>
        {
            schedule.days_of_month.push(reference.day() as u8);
        }
        _ => {}
    }

    schedule.days_of_week.sort_unstable();
    schedule.days_of_week.dedup();
    schedule.days_of_month.sort_unstable();
    schedule.days_of_month.dedup();
    Ok(())
}

/// Resolves a wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times inside a DST gap are pushed forward by the gap length.
fn localize(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => {
            let before_gap = naive - chrono::Duration::days(1);
            let offset = tz.offset_from_utc_datetime(&before_gap).fix();
            let utc = naive - chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
            Utc.from_utc_datetime(&utc)
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_sunday())))
        .unwrap_or(date)
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn month_from_index(index: i64) -> (i32, u32) {
    (index.div_euclid(12) as i32, index.rem_euclid(12) as u32 + 1)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}
