//! Period resolution: bucket width, truncation and date ranges.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::RetentionError;

/// Retention bucket unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Hour => "Hour",
            Period::Day => "Day",
            Period::Week => "Week",
            Period::Month => "Month",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Period::Hour, Period::Day, Period::Week, Period::Month]
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RetentionError::UnsupportedPeriod(s.to_string()))
    }
}

impl TryFrom<String> for Period {
    type Error = RetentionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.as_str().to_string()
    }
}

/// Bucket alignment rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    StartOfHour,
    StartOfDay,
    /// Weeks start on Sunday.
    StartOfWeek,
    StartOfMonth,
}

impl Truncation {
    /// Align `ts` to the start of its bucket.
    pub fn apply(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = |date: chrono::NaiveDate| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        match self {
            Truncation::StartOfHour => Utc.from_utc_datetime(
                &ts.date_naive()
                    .and_hms_opt(ts.hour(), 0, 0)
                    .unwrap_or_else(|| ts.naive_utc()),
            ),
            Truncation::StartOfDay => midnight(ts.date_naive()),
            Truncation::StartOfWeek => {
                let date = ts.date_naive();
                let back = date.weekday().num_days_from_sunday() as i64;
                midnight(date - Duration::days(back))
            }
            Truncation::StartOfMonth => midnight(ts.date_naive().with_day(1).unwrap_or(ts.date_naive())),
        }
    }
}

/// A span of time: fixed length, or a number of calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    Fixed(Duration),
    Months(u32),
}

impl Span {
    /// Scale the span by `n`. Fails when the result overflows.
    pub fn times(&self, n: u32) -> Result<Span, RetentionError> {
        match self {
            Span::Fixed(d) => i32::try_from(n)
                .ok()
                .and_then(|n| d.checked_mul(n))
                .map(Span::Fixed),
            Span::Months(m) => m.checked_mul(n).map(Span::Months),
        }
        .ok_or(RetentionError::InvalidDateRange)
    }

    pub fn add_to(&self, ts: DateTime<Utc>) -> Result<DateTime<Utc>, RetentionError> {
        match self {
            Span::Fixed(d) => ts.checked_add_signed(*d),
            Span::Months(m) => ts.checked_add_months(Months::new(*m)),
        }
        .ok_or(RetentionError::InvalidDateRange)
    }

    pub fn sub_from(&self, ts: DateTime<Utc>) -> Result<DateTime<Utc>, RetentionError> {
        match self {
            Span::Fixed(d) => ts.checked_sub_signed(*d),
            Span::Months(m) => ts.checked_sub_months(Months::new(*m)),
        }
        .ok_or(RetentionError::InvalidDateRange)
    }
}

/// Resolved window a retention matrix covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

/// Maps a period unit to its step, truncation and increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodResolver {
    period: Period,
    total_intervals: usize,
    step: Span,
    truncation: Truncation,
    increment: Span,
}

impl PeriodResolver {
    /// Create a resolver covering `total_intervals` buckets of `period`.
    pub fn new(period: Period, total_intervals: usize) -> Result<Self, RetentionError> {
        if total_intervals == 0 {
            return Err(RetentionError::InvalidIntervals(total_intervals));
        }
        let n = u32::try_from(total_intervals)
            .map_err(|_| RetentionError::InvalidIntervals(total_intervals))?;

        let (truncation, increment) = match period {
            Period::Hour => (Truncation::StartOfHour, Span::Fixed(Duration::hours(1))),
            Period::Day => (Truncation::StartOfDay, Span::Fixed(Duration::days(1))),
            Period::Week => (Truncation::StartOfWeek, Span::Fixed(Duration::weeks(1))),
            Period::Month => (Truncation::StartOfMonth, Span::Months(1)),
        };

        Ok(Self {
            period,
            total_intervals,
            step: increment
                .times(n)
                .map_err(|_| RetentionError::InvalidIntervals(total_intervals))?,
            truncation,
            increment,
        })
    }

    /// Parse a period token and create a resolver.
    pub fn from_token(token: &str, total_intervals: usize) -> Result<Self, RetentionError> {
        Self::new(token.parse()?, total_intervals)
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn total_intervals(&self) -> usize {
        self.total_intervals
    }

    /// Span covering every bucket.
    pub fn step(&self) -> Span {
        self.step
    }

    pub fn truncation(&self) -> Truncation {
        self.truncation
    }

    /// Width of one bucket.
    pub fn increment(&self) -> Span {
        self.increment
    }

    /// Resolve the window ending at `date_to`.
    ///
    /// `date_to` defaults to `date_from + step` when only `date_from` is
    /// given, otherwise to `now`. Non-hour periods truncate it to midnight.
    /// `date_from` is `date_to - step` aligned to the period's truncation, so
    /// buckets start on clock hours, midnights, Sundays or the first of the month.
    pub fn resolve_range(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DateRange, RetentionError> {
        let date_to = match (date_from, date_to) {
            (_, Some(to)) => to,
            (Some(from), None) => self.step.add_to(from)?,
            (None, None) => now,
        };
        let date_to = match self.period {
            Period::Hour => date_to,
            _ => Truncation::StartOfDay.apply(date_to),
        };

        let date_from = self.truncation.apply(self.step.sub_from(date_to)?);

        Ok(DateRange { date_from, date_to })
    }

    /// Start of bucket `index`, counted from `date_from`.
    pub fn bucket_start(
        &self,
        date_from: DateTime<Utc>,
        index: usize,
    ) -> Result<DateTime<Utc>, RetentionError> {
        let n = u32::try_from(index).map_err(|_| RetentionError::InvalidDateRange)?;
        self.increment.times(n)?.add_to(date_from)
    }

    /// Bucket boundaries `[b0, b1, ..., bN]`; bucket `i` is `[b_i, b_{i+1})`.
    pub fn boundaries(&self, date_from: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, RetentionError> {
        (0..=self.total_intervals)
            .map(|i| self.bucket_start(date_from, i))
            .collect()
    }
}
