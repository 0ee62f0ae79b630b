//! Task schedules.
//!
//! A schedule is either a fixed interval in minutes or a six-field cron
//! expression (`sec min hour day-of-month month day-of-week`). Both persist
//! as a single string: a bare positive integer is an interval, anything
//! else is parsed as cron.

use crate::utils::errors::TaskError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Number of fields a cron expression must have
const CRON_FIELDS: usize = 6;

/// Longest accepted interval: one year
pub const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    /// Run every `minutes` minutes, counted from when the task is armed
    Interval { minutes: u64 },

    /// Run whenever the cron expression matches (UTC)
    Cron(String),
}

impl Schedule {
    pub fn every_minutes(minutes: u64) -> Result<Self, TaskError> {
        interval_period(minutes)?;
        Ok(Schedule::Interval { minutes })
    }

    /// Build a cron schedule, normalizing whitespace between fields.
    ///
    /// Only the field count is checked here; field syntax is validated when
    /// the schedule is armed.
    pub fn cron(expression: &str) -> Result<Self, TaskError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != CRON_FIELDS {
            return Err(TaskError::InvalidSchedule(format!(
                "expected {} fields (sec min hour day month weekday), got {}: {:?}",
                CRON_FIELDS,
                fields.len(),
                expression
            )));
        }
        Ok(Schedule::Cron(fields.join(" ")))
    }

    /// Period of an interval schedule, `None` for cron.
    pub fn interval(&self) -> Result<Option<Duration>, TaskError> {
        match self {
            Schedule::Interval { minutes } => interval_period(*minutes).map(Some),
            Schedule::Cron(_) => Ok(None),
        }
    }
}

fn interval_period(minutes: u64) -> Result<Duration, TaskError> {
    if minutes == 0 || minutes > MAX_INTERVAL_MINUTES {
        return Err(TaskError::InvalidSchedule(format!(
            "interval must be between 1 and {} minutes, got {}",
            MAX_INTERVAL_MINUTES, minutes
        )));
    }
    Ok(Duration::from_secs(minutes * 60))
}

impl FromStr for Schedule {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.parse::<u64>() {
            Ok(minutes) => Schedule::every_minutes(minutes),
            Err(_) => Schedule::cron(trimmed),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Interval { minutes } => write!(f, "{}", minutes),
            Schedule::Cron(expression) => f.write_str(expression),
        }
    }
}

impl TryFrom<String> for Schedule {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_is_interval() {
        let schedule: Schedule = "15".parse().unwrap();
        assert_eq!(schedule, Schedule::Interval { minutes: 15 });
        assert_eq!(schedule.interval().unwrap(), Some(Duration::from_secs(900)));
        assert_eq!(schedule.to_string(), "15");
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(matches!(
            "0".parse::<Schedule>(),
            Err(TaskError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_oversized_interval_rejected() {
        assert!(Schedule::every_minutes(MAX_INTERVAL_MINUTES).is_ok());
        assert!(Schedule::every_minutes(MAX_INTERVAL_MINUTES + 1).is_err());
        assert!(Schedule::every_minutes(u64::MAX / 2).is_err());
        assert!(format!("{}", u64::MAX).parse::<Schedule>().is_err());

        let built_directly = Schedule::Interval { minutes: u64::MAX };
        assert!(matches!(
            built_directly.interval(),
            Err(TaskError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_cron_whitespace_normalized() {
        let schedule: Schedule = "  0  */5 *   * * *".parse().unwrap();
        assert_eq!(schedule, Schedule::Cron("0 */5 * * * *".to_string()));
        assert_eq!(schedule.interval().unwrap(), None);
    }

    #[test]
    fn test_cron_field_count_enforced() {
        assert!(Schedule::cron("*/5 * * * *").is_err());
        assert!(Schedule::cron("0 0 0 * * * 2030").is_err());
        assert!(Schedule::cron("").is_err());
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&Schedule::Interval { minutes: 30 }).unwrap();
        assert_eq!(json, "\"30\"");

        let parsed: Schedule = serde_json::from_str("\"0 0 3 * * *\"").unwrap();
        assert_eq!(parsed, Schedule::Cron("0 0 3 * * *".to_string()));

        assert!(serde_json::from_str::<Schedule>("\"nonsense\"").is_err());
    }
}
