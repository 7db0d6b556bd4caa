use crate::error::Error;
use chrono::{Days, NaiveDate};
use std::fmt;

/// The rendered time range, in epoch milliseconds. Computed once per run and
/// shared by every request in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start_millis: i64,
    end_millis: i64,
}

impl TimeWindow {
    /// Creates a window, rejecting empty or inverted ranges.
    pub fn new(start_millis: i64, end_millis: i64) -> Result<Self, Error> {
        if start_millis >= end_millis {
            return Err(Error::invalid(format!(
                "time window start ({start_millis}) must be before its end ({end_millis})"
            )));
        }
        Ok(Self {
            start_millis,
            end_millis,
        })
    }

    /// A window covering `days` whole calendar days that ends one second
    /// before midnight of `today - offset_days`.
    ///
    /// `days = 1, offset_days = 0` is "yesterday". Calendar days are taken
    /// as UTC days.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use panelmail::window::TimeWindow;
    ///
    /// let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    /// let window = TimeWindow::trailing_days(today, 1, 0).unwrap();
    /// assert_eq!(window.start_millis(), 1_709_251_200_000); // 2024-03-01T00:00:00Z
    /// assert_eq!(window.end_millis(), 1_709_337_599_000); // 2024-03-01T23:59:59Z
    /// ```
    pub fn trailing_days(today: NaiveDate, days: u32, offset_days: u32) -> Result<Self, Error> {
        if days == 0 {
            return Err(Error::invalid("the window must span at least one day"));
        }

        let end_day = today
            .checked_sub_days(Days::new(offset_days.into()))
            .ok_or_else(|| {
                Error::invalid(format!("offset of {offset_days} days is out of range"))
            })?;
        let start_day = end_day
            .checked_sub_days(Days::new(days.into()))
            .ok_or_else(|| Error::invalid(format!("span of {days} days is out of range")))?;

        Self::new(midnight_millis(start_day), midnight_millis(end_day) - 1000)
    }

    pub fn start_millis(&self) -> i64 {
        self.start_millis
    }

    pub fn end_millis(&self) -> i64 {
        self.end_millis
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let format = |millis: i64| {
            chrono::DateTime::from_timestamp_millis(millis)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| millis.to_string())
        };
        write!(f, "{} → {}", format(self.start_millis), format(self.end_millis))
    }
}

fn midnight_millis(day: NaiveDate) -> i64 {
    day.and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}
