//! Alarm records and the normalized alarm time type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{collections::BTreeSet, fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

/// Minutes in a day; the exclusive upper bound for [`AlarmTime`].
pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlarmTimeError {
    #[error("`{0}` is not a valid HH:MM time")]
    Format(String),
    #[error("{0} minutes is outside a single day")]
    Range(i64),
}

/// A time of day normalized to minutes since midnight.
///
/// The wire and display form is `HH:MM`; the stored form is the integer,
/// which keeps comparisons and sorting trivial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmTime(u16);

impl AlarmTime {
    pub fn from_minutes(minutes: u16) -> Result<Self, AlarmTimeError> {
        if minutes >= MINUTES_PER_DAY {
            return Err(AlarmTimeError::Range(minutes as i64));
        }
        Ok(Self(minutes))
    }

    pub fn total_minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for AlarmTime {
    type Err = AlarmTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hours, minutes) = s
            .split_once(':')
            .ok_or_else(|| AlarmTimeError::Format(s.to_string()))?;
        let hours: u16 = hours
            .parse()
            .map_err(|_| AlarmTimeError::Format(s.to_string()))?;
        let minutes: u16 = minutes
            .parse()
            .map_err(|_| AlarmTimeError::Format(s.to_string()))?;
        if hours >= 24 || minutes >= 60 {
            return Err(AlarmTimeError::Format(s.to_string()));
        }
        Ok(Self(hours * 60 + minutes))
    }
}

impl TryFrom<String> for AlarmTime {
    type Error = AlarmTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AlarmTime> for String {
    fn from(time: AlarmTime) -> Self {
        time.to_string()
    }
}

impl TryFrom<i64> for AlarmTime {
    type Error = AlarmTimeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let minutes = u16::try_from(value).map_err(|_| AlarmTimeError::Range(value))?;
        Self::from_minutes(minutes).map_err(|_| AlarmTimeError::Range(value))
    }
}

/// Days of the week an alarm repeats on.
///
/// Variant order gives Monday-first sorting when held in a `BTreeSet`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn short_name(self) -> &'static str {
        match self {
            Weekday::Monday => "Mon",
            Weekday::Tuesday => "Tue",
            Weekday::Wednesday => "Wed",
            Weekday::Thursday => "Thu",
            Weekday::Friday => "Fri",
            Weekday::Saturday => "Sat",
            Weekday::Sunday => "Sun",
        }
    }
}

/// A user's alarm.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Alarm {
    /// Unique identifier.
    pub id: Uuid,

    /// Identity that owns this alarm.
    pub user_id: String,

    /// Time of day the alarm fires, normalized to minutes since midnight.
    #[sqlx(rename = "time_minutes", try_from = "i64")]
    pub time: AlarmTime,

    /// Free-text label.
    pub label: String,

    /// Weekdays the alarm repeats on; unique, displayed sorted.
    #[sqlx(json)]
    pub days: BTreeSet<Weekday>,

    /// Whether the alarm is active. Toggled independently of other fields.
    pub enabled: bool,

    /// Blob path of the optional attached image.
    pub image_path: Option<String>,

    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
}

impl Alarm {
    /// Sorted, comma-separated day abbreviations, e.g. `"Mon, Wed, Fri"`.
    pub fn days_display(&self) -> String {
        self.days
            .iter()
            .map(|d| d.short_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_hh_mm() {
        let t: AlarmTime = "07:05".parse().unwrap();
        assert_eq!(t.total_minutes(), 7 * 60 + 5);
        assert_eq!(t.to_string(), "07:05");
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(matches!(
            "0705".parse::<AlarmTime>(),
            Err(AlarmTimeError::Format(_))
        ));
        assert!(matches!(
            "24:00".parse::<AlarmTime>(),
            Err(AlarmTimeError::Format(_))
        ));
        assert!(matches!(
            "12:60".parse::<AlarmTime>(),
            Err(AlarmTimeError::Format(_))
        ));
        assert!(matches!(
            "ab:cd".parse::<AlarmTime>(),
            Err(AlarmTimeError::Format(_))
        ));
    }

    #[test]
    fn times_order_by_minutes() {
        let early: AlarmTime = "06:30".parse().unwrap();
        let late: AlarmTime = "22:15".parse().unwrap();
        assert!(early < late);
    }

    #[test]
    fn stored_minutes_round_trip() {
        let t = AlarmTime::try_from(1439i64).unwrap();
        assert_eq!(t.to_string(), "23:59");
        assert!(AlarmTime::try_from(1440i64).is_err());
        assert!(AlarmTime::try_from(-1i64).is_err());
    }

    #[test]
    fn serde_uses_display_form() {
        let t: AlarmTime = "09:00".parse().unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"09:00\"");
        let back: AlarmTime = serde_json::from_str("\"09:00\"").unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn days_display_sorted_monday_first() {
        let alarm = Alarm {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            time: "08:00".parse().unwrap(),
            label: "gym".into(),
            days: BTreeSet::from([Weekday::Friday, Weekday::Monday, Weekday::Wednesday]),
            enabled: true,
            image_path: None,
            created_at: Utc::now(),
        };
        assert_eq!(alarm.days_display(), "Mon, Wed, Fri");
    }
}
