use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};

/// Time source for analytics timestamps and durations.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock anchored once, then advanced by a monotonic [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    wall: DateTime<Utc>,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            wall: Utc::now(),
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        self.wall + TimeDelta::from_std(self.anchor.elapsed()).unwrap_or_default()
    }
}

/// Hand-driven clock; clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.now.set(self.now.get() + TimeDelta::seconds(seconds));
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.set(self.now.get() + TimeDelta::milliseconds(millis));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Whole seconds between two instants, rounded to nearest and floored at zero.
pub fn rounded_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let millis = (to - from).num_milliseconds().max(0);
    ((millis as f64) / 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_never_runs_backwards() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        let other = clock.clone();
        clock.advance_millis(1_600);
        assert_eq!(rounded_seconds(DateTime::<Utc>::UNIX_EPOCH, other.now()), 2);
    }
}
