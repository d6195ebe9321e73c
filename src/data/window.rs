//! Time window selection for sales periods and rental month columns.

use chrono::NaiveDate;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("empty time window")]
    Empty,
    #[error("invalid date {0:?} in time window (expected YYYY-MM-DD)")]
    BadDate(String),
    #[error("time window starts after it ends: {0} > {1}")]
    Inverted(NaiveDate, NaiveDate),
}

/// Which periods (sales) or month columns (rentals) belong to the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawWindow")]
pub enum TimeWindow {
    /// Label contains the pattern as a plain substring.
    Contains(String),
    /// Label starts with an ISO date or month inside `[start, end]`.
    Range { start: NaiveDate, end: NaiveDate },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWindow {
    Pattern(String),
    Range { start: NaiveDate, end: NaiveDate },
}

impl TryFrom<RawWindow> for TimeWindow {
    type Error = WindowError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        match raw {
            RawWindow::Pattern(s) => s.parse(),
            RawWindow::Range { start, end } => Self::range(start, end),
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::Contains("2022".to_string())
    }
}

impl TimeWindow {
    pub fn range(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Inverted(start, end));
        }
        Ok(TimeWindow::Range { start, end })
    }

    /// Whether a period value or column name falls inside the window.
    pub fn matches(&self, label: &str) -> bool {
        match self {
            TimeWindow::Contains(pattern) => label.contains(pattern.as_str()),
            TimeWindow::Range { start, end } => leading_date(label)
                .map(|date| *start <= date && date <= *end)
                .unwrap_or(false),
        }
    }
}

/// Parse `YYYY-MM-DD...` or `YYYY-MM...` at the start of a label. A bare
/// month reads as its first day.
fn leading_date(label: &str) -> Option<NaiveDate> {
    let label = label.trim();
    if let Some(day) = label.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            return Some(date);
        }
    }
    let month = label.get(..7)?;
    NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()
}

impl FromStr for TimeWindow {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WindowError::Empty);
        }
        match s.split_once("..") {
            Some((start, end)) => {
                let parse = |d: &str| {
                    NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                        .map_err(|_| WindowError::BadDate(d.trim().to_string()))
                };
                Self::range(parse(start)?, parse(end)?)
            }
            None => Ok(TimeWindow::Contains(s.to_string())),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::Contains(pattern) => write!(f, "*{pattern}*"),
            TimeWindow::Range { start, end } => write!(f, "{start}..{end}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_window() {
        let window: TimeWindow = "2022".parse().unwrap();
        assert!(window.matches("2022-03-01"));
        assert!(window.matches("2022-03"));
        assert!(!window.matches("2021-12-31"));
    }

    #[test]
    fn test_range_window_accepts_days_and_months() {
        let window: TimeWindow = "2022-01-01..2022-06-30".parse().unwrap();
        assert!(window.matches("2022-01-01"));
        assert!(window.matches("2022-06"));
        assert!(window.matches("2022-06-30T00:00:00"));
        assert!(!window.matches("2022-07-01"));
        assert!(!window.matches("2021-12"));
        assert!(!window.matches("RegionName"));
    }

    #[test]
    fn test_inverted_and_bad_ranges() {
        assert!(matches!(
            "2022-12-31..2022-01-01".parse::<TimeWindow>(),
            Err(WindowError::Inverted(_, _))
        ));
        assert!(matches!(
            "2022-13-01..2022-12-31".parse::<TimeWindow>(),
            Err(WindowError::BadDate(_))
        ));
        assert_eq!("  ".parse::<TimeWindow>(), Err(WindowError::Empty));
    }

    #[test]
    fn test_deserialize_both_shapes() {
        #[derive(Deserialize)]
        struct Holder {
            window: TimeWindow,
        }

        let h: Holder = toml::from_str(r#"window = "2021""#).unwrap();
        assert_eq!(h.window, TimeWindow::Contains("2021".into()));

        let h: Holder =
            toml::from_str(r#"window = { start = "2022-01-01", end = "2022-03-31" }"#).unwrap();
        assert!(matches!(h.window, TimeWindow::Range { .. }));
    }
}
