// Lifetime of the seed handed back by a submission.

use chrono::{DateTime, Duration, Utc};

use crate::error::{PandoraError, Result};

/// How long the seed of a submission stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedExpiry {
    /// Expires at the given instant.
    At(DateTime<Utc>),
    /// Expires once the interval has elapsed.
    In(Duration),
    /// Expires after that many seconds. `0` means the seed never expires.
    Seconds(u64),
    /// No seed is requested.
    #[default]
    None,
}

impl SeedExpiry {
    pub const NEVER: SeedExpiry = SeedExpiry::Seconds(0);

    /// Resolve to the `validity` sent to the server, relative to now.
    pub fn to_validity(&self) -> Result<Option<u64>> {
        self.to_validity_at(Utc::now())
    }

    /// Resolve to the `validity` sent to the server, relative to `now`.
    ///
    /// Explicit seconds pass through untouched. Intervals and instants must
    /// land strictly in the future, whole seconds; a computed zero would
    /// otherwise read as "never expires".
    pub fn to_validity_at(&self, now: DateTime<Utc>) -> Result<Option<u64>> {
        let interval = match *self {
            SeedExpiry::Seconds(secs) => return Ok(Some(secs)),
            SeedExpiry::None => return Ok(None),
            SeedExpiry::In(interval) => interval,
            SeedExpiry::At(instant) => instant - now,
        };
        let secs = interval.num_seconds();
        if secs <= 0 {
            let message = match *self {
                SeedExpiry::At(instant) => {
                    format!("expiration date ({}) is in the past, now is {}", instant, now)
                }
                _ => format!("expiration interval ({}s) is not positive", secs),
            };
            return Err(PandoraError::InvalidExpiry(message));
        }
        Ok(Some(secs as u64))
    }
}

impl From<u64> for SeedExpiry {
    fn from(secs: u64) -> Self {
        SeedExpiry::Seconds(secs)
    }
}

impl From<Duration> for SeedExpiry {
    fn from(interval: Duration) -> Self {
        SeedExpiry::In(interval)
    }
}

impl From<DateTime<Utc>> for SeedExpiry {
    fn from(instant: DateTime<Utc>) -> Self {
        SeedExpiry::At(instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_seconds_pass_through() {
        for secs in [1, 60, 3600, 86_400 * 365] {
            assert_eq!(SeedExpiry::Seconds(secs).to_validity_at(now()).unwrap(), Some(secs));
        }
    }

    #[test]
    fn test_zero_means_never() {
        assert_eq!(SeedExpiry::NEVER.to_validity_at(now()).unwrap(), Some(0));
    }

    #[test]
    fn test_none_sends_nothing() {
        assert_eq!(SeedExpiry::None.to_validity_at(now()).unwrap(), None);
    }

    #[test]
    fn test_interval_in_seconds() {
        let expiry = SeedExpiry::In(Duration::minutes(90));
        assert_eq!(expiry.to_validity_at(now()).unwrap(), Some(5400));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = SeedExpiry::In(Duration::zero()).to_validity_at(now()).unwrap_err();
        assert!(matches!(err, PandoraError::InvalidExpiry(_)));
    }

    #[test]
    fn test_negative_interval_rejected() {
        let err = SeedExpiry::In(Duration::seconds(-10)).to_validity_at(now()).unwrap_err();
        assert!(matches!(err, PandoraError::InvalidExpiry(_)));
    }

    #[test]
    fn test_future_instant() {
        let expiry = SeedExpiry::At(now() + Duration::hours(2));
        assert_eq!(expiry.to_validity_at(now()).unwrap(), Some(7200));
    }

    #[test]
    fn test_past_instant_rejected() {
        for back in [Duration::seconds(1), Duration::days(3), Duration::weeks(100)] {
            let err = SeedExpiry::At(now() - back).to_validity_at(now()).unwrap_err();
            assert!(matches!(err, PandoraError::InvalidExpiry(_)));
        }
    }

    #[test]
    fn test_instant_equal_to_now_rejected() {
        let err = SeedExpiry::At(now()).to_validity_at(now()).unwrap_err();
        assert!(matches!(err, PandoraError::InvalidExpiry(_)));
    }

    #[test]
    fn test_sub_second_future_rejected() {
        let expiry = SeedExpiry::At(now() + Duration::milliseconds(400));
        assert!(expiry.to_validity_at(now()).is_err());
    }

    #[test]
    fn test_against_wall_clock() {
        let expiry = SeedExpiry::At(Utc::now() + Duration::seconds(600));
        let secs = expiry.to_validity().unwrap().unwrap();
        assert!((598..=600).contains(&secs), "got {}", secs);
    }
}
