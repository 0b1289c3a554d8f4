//! Publish-slot scheduling and privacy settings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How far ahead a video can be scheduled by default.
pub const DEFAULT_HORIZON_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("schedule interval must be positive")]
    NonPositiveInterval,

    #[error("publish time {0} is in the past")]
    InPast(DateTime<Utc>),

    #[error("publish time {slot} is more than {horizon_days} days ahead")]
    BeyondHorizon {
        slot: DateTime<Utc>,
        horizon_days: i64,
    },

    #[error("publish slot {0} is beyond the representable date range")]
    OutOfRange(usize),

    #[error("unknown privacy status '{0}'")]
    UnknownPrivacy(String),
}

/// Visibility of an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    #[default]
    Private,
    Public,
    Unlisted,
    /// Private until `publishAt`
    Scheduled,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Private => "private",
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Scheduled => "scheduled",
        }
    }

    /// Value for the Data API `status.privacyStatus` field.
    pub fn api_status(&self) -> &'static str {
        match self {
            PrivacyStatus::Scheduled => "private",
            other => other.as_str(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, PrivacyStatus::Scheduled)
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyStatus {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(PrivacyStatus::Private),
            "public" => Ok(PrivacyStatus::Public),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            "scheduled" => Ok(PrivacyStatus::Scheduled),
            other => Err(ScheduleError::UnknownPrivacy(other.to_string())),
        }
    }
}

/// Start time plus cadence. Slot `i` is `start + i * interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    start: DateTime<FixedOffset>,
    interval: Duration,
}

impl ScheduleConfig {
    pub fn new(start: DateTime<FixedOffset>, interval: Duration) -> Result<Self, ScheduleError> {
        if interval <= Duration::zero() {
            return Err(ScheduleError::NonPositiveInterval);
        }
        Ok(Self { start, interval })
    }

    pub fn from_hours(start: DateTime<FixedOffset>, hours: u32) -> Result<Self, ScheduleError> {
        Self::new(start, Duration::hours(i64::from(hours)))
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Publish time of the `index`-th processed row, in UTC.
    pub fn slot(&self, index: usize) -> Result<DateTime<Utc>, ScheduleError> {
        let offset = i32::try_from(index)
            .ok()
            .and_then(|steps| self.interval.checked_mul(steps))
            .ok_or(ScheduleError::OutOfRange(index))?;
        self.start
            .with_timezone(&Utc)
            .checked_add_signed(offset)
            .ok_or(ScheduleError::OutOfRange(index))
    }

    pub fn slots(&self, count: usize) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        (0..count).map(|i| self.slot(i)).collect()
    }

    /// Reject cadences whose second slot already falls past `horizon`.
    pub fn check_interval(&self, horizon: Duration) -> Result<(), ScheduleError> {
        if self.interval > horizon {
            return Err(ScheduleError::BeyondHorizon {
                slot: self.slot(1)?,
                horizon_days: horizon.num_days(),
            });
        }
        Ok(())
    }
}

/// Check a slot against YouTube's scheduling window.
pub fn check_slot(
    slot: DateTime<Utc>,
    now: DateTime<Utc>,
    horizon: Duration,
) -> Result<(), ScheduleError> {
    if slot <= now {
        return Err(ScheduleError::InPast(slot));
    }
    let beyond = now
        .checked_add_signed(horizon)
        .is_some_and(|limit| slot > limit);
    if beyond {
        return Err(ScheduleError::BeyondHorizon {
            slot,
            horizon_days: horizon.num_days(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2030-01-01T09:00:00-05:00").unwrap()
    }

    #[test]
    fn test_slots_are_evenly_spaced() {
        let schedule = ScheduleConfig::from_hours(t0(), 2).unwrap();
        let slots = schedule.slots(3).unwrap();
        let start = t0().with_timezone(&Utc);

        assert_eq!(
            slots,
            vec![
                start,
                start + Duration::hours(2),
                start + Duration::hours(4)
            ]
        );
        assert_eq!(slots[0].to_rfc3339(), "2030-01-01T14:00:00+00:00");
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let schedule = ScheduleConfig::from_hours(t0(), u32::MAX).unwrap();
        assert_eq!(schedule.slot(0).unwrap(), t0().with_timezone(&Utc));
        assert_eq!(schedule.slot(1).unwrap_err(), ScheduleError::OutOfRange(1));
        assert!(schedule.slots(3).is_err());

        let horizon = Duration::days(DEFAULT_HORIZON_DAYS);
        assert!(schedule.check_interval(horizon).is_err());
        assert!(ScheduleConfig::from_hours(t0(), 24)
            .unwrap()
            .check_interval(horizon)
            .is_ok());
    }

    #[test]
    fn test_huge_interval_beyond_horizon_is_reported() {
        let schedule = ScheduleConfig::from_hours(t0(), 24 * 400).unwrap();
        assert!(matches!(
            schedule.check_interval(Duration::days(DEFAULT_HORIZON_DAYS)),
            Err(ScheduleError::BeyondHorizon { horizon_days: 365, .. })
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert_eq!(
            ScheduleConfig::new(t0(), Duration::zero()).unwrap_err(),
            ScheduleError::NonPositiveInterval
        );
        assert!(ScheduleConfig::from_hours(t0(), 0).is_err());
    }

    #[test]
    fn test_check_slot_window() {
        let now = Utc::now();
        let horizon = Duration::days(DEFAULT_HORIZON_DAYS);

        assert!(check_slot(now + Duration::hours(1), now, horizon).is_ok());
        assert!(matches!(
            check_slot(now - Duration::minutes(1), now, horizon),
            Err(ScheduleError::InPast(_))
        ));
        assert!(matches!(
            check_slot(now + Duration::days(400), now, horizon),
            Err(ScheduleError::BeyondHorizon { horizon_days: 365, .. })
        ));
    }

    #[test]
    fn test_privacy_status() {
        assert_eq!("Scheduled".parse::<PrivacyStatus>().unwrap(), PrivacyStatus::Scheduled);
        assert_eq!(PrivacyStatus::Scheduled.api_status(), "private");
        assert_eq!(PrivacyStatus::Unlisted.api_status(), "unlisted");
        assert!("secret".parse::<PrivacyStatus>().is_err());
    }
}
