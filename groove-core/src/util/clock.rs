use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// A source of the current time. Quotas, queue order, and sessions all read from this.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
/// Every reading also ticks it forward by a millisecond, so timestamps taken in a row are distinct.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    const TICK_IN_MILLIS: i64 = 1;

    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: start.into() }
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Moves the clock to the given time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock();
        let current = *now;
        *now += Duration::milliseconds(Self::TICK_IN_MILLIS);

        current
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Clock, ManualClock};

    #[test]
    fn manual_clock_ticks_and_advances() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        let first = clock.now();
        let second = clock.now();
        assert_eq!(first, start);
        assert!(second > first);

        clock.advance(Duration::days(1));
        assert!(clock.now() >= start + Duration::days(1));
    }
}
