use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the enrichment instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Always returns the same instant. Used for replays and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(SystemTime);

impl FixedClock {
    /// Instant `secs` seconds from the Unix epoch. Values the platform
    /// cannot represent saturate at the epoch.
    pub fn from_epoch_seconds(secs: i64) -> Self {
        let offset = Duration::from_secs(secs.unsigned_abs());
        let at = if secs >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        Self(at.unwrap_or(UNIX_EPOCH))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Whole seconds since the Unix epoch, rounded towards negative infinity.
pub fn epoch_seconds(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(e) => {
            let d = e.duration();
            let secs = -i128::from(d.as_secs());
            let floored = if d.subsec_nanos() > 0 { secs - 1 } else { secs };
            i64::try_from(floored).unwrap_or(i64::MIN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_seconds_floors() {
        assert_eq!(epoch_seconds(UNIX_EPOCH + Duration::from_millis(1_999)), 1);
        assert_eq!(epoch_seconds(UNIX_EPOCH - Duration::from_millis(500)), -1);
        assert_eq!(epoch_seconds(UNIX_EPOCH - Duration::from_secs(2)), -2);
    }

    #[test]
    fn extreme_seconds_do_not_overflow() {
        assert!(epoch_seconds(FixedClock::from_epoch_seconds(i64::MIN).now()) <= 0);
        assert!(epoch_seconds(FixedClock::from_epoch_seconds(i64::MAX).now()) >= 0);
    }

    #[test]
    fn fixed_clock_round_trips_seconds() {
        for secs in [-86_400, 0, 1_700_000_000] {
            assert_eq!(epoch_seconds(FixedClock::from_epoch_seconds(secs).now()), secs);
        }
    }
}
