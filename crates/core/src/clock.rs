use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Source of "now" for temporal validation. Readings are wall-clock time in
/// the calendar's zone, without an offset.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Reads the system time in a fixed zone, independent of the host's zone.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    zone: Tz,
}

impl SystemClock {
    pub fn in_zone(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::in_zone(Tz::UTC)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.zone).naive_local()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use chrono_tz::Tz;

    use super::{Clock, SystemClock};

    #[test]
    fn system_clock_reads_wall_time_of_its_zone() {
        let utc = SystemClock::default();
        let tokyo = SystemClock::in_zone(Tz::Asia__Tokyo);

        let drift = utc.now() - Utc::now().naive_utc();
        assert!(drift.num_seconds().abs() <= 5);

        // Tokyo is UTC+9 all year.
        let offset = tokyo.now() - utc.now();
        assert!((offset - Duration::hours(9)).num_seconds().abs() <= 5);
        assert_eq!(tokyo.zone(), Tz::Asia__Tokyo);
    }
}
