use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::data::{AppId, DayWindow};

/// One counter, one day, with an offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterQuery {
    pub name: String,
    /// Defaults to the current local date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub skip: usize,
    /// `None` matches samples from every application.
    #[serde(default)]
    pub app_id: Option<AppId>,
}

impl CounterQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date: None,
            skip: 0,
            app_id: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Query the day containing `timestamp`.
    pub fn with_day_of(self, timestamp: NaiveDateTime) -> Self {
        self.with_date(timestamp.date())
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_app_id(mut self, app_id: AppId) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn window(&self) -> DayWindow {
        match self.date {
            Some(date) => DayWindow::for_date(date),
            None => DayWindow::today(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_of_truncates() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        let query = CounterQuery::new("cpu").with_day_of(ts);

        assert_eq!(query.date, Some(ts.date()));
        assert_eq!(query.window(), DayWindow::containing(ts));
    }

    #[test]
    fn test_defaults_from_json() {
        let query: CounterQuery = serde_json::from_str(r#"{"name": "cpu"}"#).unwrap();
        assert_eq!(query, CounterQuery::new("cpu"));
        assert_eq!(query.skip, 0);
    }
}
