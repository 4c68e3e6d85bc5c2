use crate::constants::{AFTERNOON_SESSION, EXCHANGE_TIMEZONE, MORNING_SESSION};
use crate::error::{AppError, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Exchange holidays that fall on weekdays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolidayCalendar {
    dates: HashSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Parse a JSON array of `YYYY-MM-DD` strings
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: Vec<String> = serde_json::from_str(content)?;
        let mut dates = HashSet::with_capacity(raw.len());
        for value in raw {
            let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .map_err(|e| AppError::Parse(format!("Invalid holiday date '{}': {}", value, e)))?;
            dates.insert(date);
        }
        Ok(Self { dates })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Decides whether the exchange is in continuous trading
///
/// Sessions run 09:15-11:30 and 13:00-15:00 exchange-local time, both ends
/// inclusive, on weekdays that are not listed holidays. Without a holiday
/// calendar the gate only checks weekday and clock window, so a weekday
/// holiday is reported as a trading session.
#[derive(Debug, Clone)]
pub struct SessionGate {
    tz: Tz,
    calendar: Option<HolidayCalendar>,
}

impl SessionGate {
    pub fn new(calendar: Option<HolidayCalendar>) -> Self {
        Self {
            tz: chrono_tz::Asia::Shanghai,
            calendar,
        }
    }

    /// Build the gate from an optional calendar file
    ///
    /// A missing or unreadable file degrades to the weekday check.
    pub fn from_calendar_file(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::warn!("No holiday calendar configured, session gate uses weekday and clock checks only");
            return Self::new(None);
        };

        match HolidayCalendar::load(path) {
            Ok(calendar) => {
                tracing::info!(holidays = calendar.len(), "Loaded holiday calendar from {}", path.display());
                Self::new(Some(calendar))
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load holiday calendar {}: {}. Falling back to weekday and clock checks",
                    path.display(),
                    e
                );
                Self::new(None)
            }
        }
    }

    pub fn timezone_name(&self) -> &'static str {
        EXCHANGE_TIMEZONE
    }

    pub fn has_calendar(&self) -> bool {
        self.calendar.is_some()
    }

    /// Exchange-local calendar date of an instant
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        match &self.calendar {
            Some(calendar) => !calendar.contains(date),
            None => true,
        }
    }

    pub fn is_trading_session(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        if !self.is_trading_day(local.date_naive()) {
            return false;
        }

        let time = local.time();
        in_window(time, MORNING_SESSION) || in_window(time, AFTERNOON_SESSION)
    }

    /// Pick a TTL depending on whether the market is open at `now`
    pub fn select_ttl(&self, now: DateTime<Utc>, trading: Duration, closed: Duration) -> Duration {
        if self.is_trading_session(now) {
            trading
        } else {
            closed
        }
    }
}

fn in_window(time: NaiveTime, window: ((u32, u32), (u32, u32))) -> bool {
    let ((start_h, start_m), (end_h, end_m)) = window;
    let (Some(start), Some(end)) = (
        NaiveTime::from_hms_opt(start_h, start_m, 0),
        NaiveTime::from_hms_opt(end_h, end_m, 0),
    ) else {
        return false;
    };
    time >= start && time <= end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Exchange-local wall clock to UTC
    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Shanghai
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_session_windows_on_weekday() {
        let gate = SessionGate::new(None);
        // 2024-06-03 is a Monday
        assert!(!gate.is_trading_session(at(2024, 6, 3, 9, 14)));
        assert!(gate.is_trading_session(at(2024, 6, 3, 9, 15)));
        assert!(gate.is_trading_session(at(2024, 6, 3, 11, 30)));
        assert!(!gate.is_trading_session(at(2024, 6, 3, 12, 0)));
        assert!(gate.is_trading_session(at(2024, 6, 3, 13, 0)));
        assert!(gate.is_trading_session(at(2024, 6, 3, 15, 0)));
        assert!(!gate.is_trading_session(at(2024, 6, 3, 15, 1)));
    }

    #[test]
    fn test_weekend_is_closed() {
        let gate = SessionGate::new(None);
        // 2024-06-01 is a Saturday
        assert!(!gate.is_trading_session(at(2024, 6, 1, 10, 0)));
        assert!(!gate.is_trading_session(at(2024, 6, 2, 14, 0)));
    }

    #[test]
    fn test_holiday_calendar_excludes_weekday() {
        let calendar = HolidayCalendar::from_json(r#"["2024-10-01", "2024-10-02"]"#).unwrap();
        let gate = SessionGate::new(Some(calendar));
        assert!(!gate.is_trading_session(at(2024, 10, 1, 10, 0)));
        assert!(gate.is_trading_session(at(2024, 10, 8, 10, 0)));

        // Degraded gate treats the same holiday as a session
        let degraded = SessionGate::new(None);
        assert!(degraded.is_trading_session(at(2024, 10, 1, 10, 0)));
    }

    #[test]
    fn test_invalid_calendar_rejected() {
        assert!(HolidayCalendar::from_json(r#"["2024-13-01"]"#).is_err());
        assert!(HolidayCalendar::from_json("{}").is_err());
    }

    #[test]
    fn test_missing_calendar_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SessionGate::from_calendar_file(Some(&dir.path().join("absent.json")));
        assert!(!gate.has_calendar());
    }

    #[test]
    fn test_select_ttl() {
        let gate = SessionGate::new(None);
        let trading = Duration::from_secs(60);
        let closed = Duration::from_secs(43_200);
        assert_eq!(gate.select_ttl(at(2024, 6, 3, 10, 0), trading, closed), trading);
        assert_eq!(gate.select_ttl(at(2024, 6, 3, 20, 0), trading, closed), closed);
    }

    #[test]
    fn test_utc_conversion() {
        let gate = SessionGate::new(None);
        // 02:00 UTC is 10:00 in Shanghai
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 2, 0, 0).unwrap();
        assert!(gate.is_trading_session(now));
        assert_eq!(gate.local_date(now), NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }
}
