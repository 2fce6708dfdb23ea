use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Half-open `[start, end)` window covering one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        let next = date.succ_opt().unwrap_or(NaiveDate::MAX);
        Self {
            start: date.and_time(NaiveTime::MIN),
            end: next.and_time(NaiveTime::MIN),
        }
    }

    /// Window of the day containing `timestamp`.
    pub fn containing(timestamp: NaiveDateTime) -> Self {
        Self::for_date(timestamp.date())
    }

    /// Window of the current local day.
    pub fn today() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}
