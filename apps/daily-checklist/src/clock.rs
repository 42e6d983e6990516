//! Wall-clock access and day boundaries.

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Midnight of the local calendar day containing `at`.
    fn start_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc>;
}

/// System clock in the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn start_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        start_of_day(&at.with_timezone(&Local))
    }
}

/// First valid instant of the calendar day of `at`, in `at`'s time zone.
///
/// Midnight itself may not exist when a DST jump lands on it, in which case
/// the earliest instant within the following hours is used.
pub fn start_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = at.timezone();
    let midnight = at.date_naive().and_time(NaiveTime::MIN);

    (0..=2)
        .find_map(|h| {
            tz.from_local_datetime(&(midnight + Duration::hours(h)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| at.with_timezone(&Utc))
}

#[cfg(test)]
pub(crate) use manual::ManualClock;
