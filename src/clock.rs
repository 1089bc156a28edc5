//! Timestamps and the clock seam.
//!
//! Every deadline in the system (hold deadlines, claim response windows) is
//! stored as an absolute [`TimeStamp`] and compared against `Clock::now()` at
//! read time. Nothing schedules a timer against these values.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn plus_hours(&self, hours: i64) -> Self {
        Self(self.0 + Duration::hours(hours))
    }
    pub fn plus_minutes(&self, minutes: i64) -> Self {
        Self(self.0 + Duration::minutes(minutes))
    }
    /// Whole minutes from `self` until `later`. Negative once `later` is in
    /// the past relative to `self`.
    pub fn minutes_until(&self, later: &Self) -> i64 {
        (later.0 - self.0).num_minutes()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Source of the current time for every time-gated transition.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::new()
    }
}

/// A clock that only moves when told to. Deadline expiry and urgency are
/// derived values, so tests advance this instead of sleeping.
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(start: TimeStamp<Utc>) -> Self {
        Self {
            current: Mutex::new(start.to_datetime_utc()),
        }
    }
    pub fn advance_hours(&self, hours: i64) {
        let mut current = self.current.lock().expect("clock mutex poisoned");
        *current += Duration::hours(hours);
    }
    pub fn advance_minutes(&self, minutes: i64) {
        let mut current = self.current.lock().expect("clock mutex poisoned");
        *current += Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::from(*self.current.lock().expect("clock mutex poisoned"))
    }
}
