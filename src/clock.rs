//! Time source injected into the engine so detection timestamps are testable.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;

    /// Clock that advances one second on every read.
    pub struct StepClock {
        next: Mutex<DateTime<Utc>>,
    }

    impl StepClock {
        pub fn new() -> Self {
            Self {
                next: Mutex::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()),
            }
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = self.next.lock();
            let now = *next;
            *next = now + Duration::seconds(1);
            now
        }
    }

    #[test]
    fn step_clock_is_monotonic() {
        let clock = StepClock::new();
        let a = clock.now();
        let b = clock.now();
        assert_eq!(b - a, Duration::seconds(1));
    }
}
