use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Logical ticks per wall-clock millisecond. Leaves room for a million
/// writes per millisecond before the clock runs ahead of real time.
const TICKS_PER_MILLI: u64 = 1_000_000;

/// Strictly monotonic logical clock used to order writes.
///
/// Each call returns `max(now_millis * 1_000_000, last + 1)`, so values
/// track wall-clock time when writes are sparse and keep increasing by one
/// when many writes land in the same millisecond (or the wall clock steps
/// backwards). One engine owns one generator and shares it with every
/// memtable it creates.
#[derive(Debug, Default)]
pub struct TimestampGenerator {
    last: AtomicU64,
}

impl TimestampGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp. Never returns the same value twice, from any thread,
    /// until the counter reaches `u64::MAX`, where it stays. Tables holding
    /// `u64::MAX` are rejected at open, so only `observe` can get it there.
    pub fn next(&self) -> u64 {
        let now = wall_clock_ticks();
        let advance = |last: u64| now.max(last.saturating_add(1));
        match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(advance(last)))
        {
            Ok(prev) | Err(prev) => advance(prev),
        }
    }

    /// Make sure every later `next()` is greater than `timestamp`.
    ///
    /// Called at startup with the newest timestamp found on disk.
    pub fn observe(&self, timestamp: u64) {
        self.last.fetch_max(timestamp, Ordering::AcqRel);
    }

    /// Most recently issued (or observed) timestamp.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

fn wall_clock_ticks() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_millis() as u64).saturating_mul(TICKS_PER_MILLI))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing_in_a_tight_loop() {
        let clock = TimestampGenerator::new();
        let mut prev = clock.next();
        for _ in 0..10_000 {
            let ts = clock.next();
            assert!(ts > prev);
            prev = ts;
        }
    }

    #[test]
    fn observe_raises_the_floor() {
        let clock = TimestampGenerator::new();
        let far_future = u64::MAX / 2;
        clock.observe(far_future);
        assert!(clock.next() > far_future);
        assert_eq!(clock.last(), far_future + 1);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let clock = TimestampGenerator::new();
        clock.observe(u64::MAX - 1);
        assert_eq!(clock.next(), u64::MAX);
        assert_eq!(clock.next(), u64::MAX);
    }

    #[test]
    fn observe_never_lowers() {
        let clock = TimestampGenerator::new();
        let ts = clock.next();
        clock.observe(1);
        assert_eq!(clock.last(), ts);
    }
}
