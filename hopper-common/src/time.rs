//! Timestamps and the injectable clock.
//!
//! All durable state carries [`TimestampMs`] values. Components never call
//! [`SystemTime::now`] directly; they take a [`Clock`] so tests can pin and
//! advance time deterministically (the same seam we use for randomness).

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use serde::{de, Deserialize, Deserializer, Serialize};

/// The number of milliseconds since the [`UNIX_EPOCH`].
///
/// Internally represented by a non-negative [`i64`] so the value survives a
/// round-trip through SQLite's INTEGER column type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct TimestampMs(i64);

impl TimestampMs {
    /// Creates a new [`TimestampMs`] from the current [`SystemTime`].
    ///
    /// Panics if the current time is not within bounds.
    pub fn now() -> Self {
        Self::try_from(SystemTime::now()).unwrap()
    }

    /// Returns the contained [`i64`].
    #[inline]
    pub fn to_i64(self) -> i64 {
        self.0
    }

    /// Constructs a [`TimestampMs`] from an [`i64`], e.g. a value read back
    /// from the database. Errors on negative values.
    pub fn try_from_i64(value: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(value >= 0, "Unix timestamp must be non-negative");
        Ok(Self(value))
    }

    /// This timestamp plus a [`Duration`], saturating at the representable
    /// maximum.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// The duration elapsed from `earlier` to `self`, or [`Duration::ZERO`]
    /// if `earlier` is in the future.
    pub fn saturating_duration_since(self, earlier: TimestampMs) -> Duration {
        let millis = self.0.saturating_sub(earlier.0);
        if millis <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

/// Attempts to convert a [`SystemTime`] into a [`TimestampMs`].
impl TryFrom<SystemTime> for TimestampMs {
    type Error = anyhow::Error;
    fn try_from(system_time: SystemTime) -> anyhow::Result<Self> {
        let millis = system_time
            .duration_since(UNIX_EPOCH)
            .context("Current time is before January 1st, 1970")?
            .as_millis();
        let millis = i64::try_from(millis)
            .context("Current time is too far past the epoch")?;
        Ok(Self(millis))
    }
}

/// Enforces that the inner [`i64`] is non-negative.
impl<'de> Deserialize<'de> for TimestampMs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Self::try_from_i64(value).map_err(de::Error::custom)
    }
}

// --- Clock --- //

/// A source of "now", injectable for tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> TimestampMs;
}

/// The production clock; reads [`SystemTime`].
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        TimestampMs::now()
    }
}

/// A manually-advanced clock for tests. Cloning yields a handle to the same
/// underlying instant.
#[derive(Clone, Debug)]
pub struct TestClock(Arc<Mutex<TimestampMs>>);

impl TestClock {
    pub fn new(start: TimestampMs) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn set(&self, now: TimestampMs) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, duration: Duration) {
        let mut locked = self.0.lock().unwrap();
        *locked = locked.saturating_add(duration);
    }
}

impl Clock for TestClock {
    fn now(&self) -> TimestampMs {
        *self.0.lock().unwrap()
    }
}
