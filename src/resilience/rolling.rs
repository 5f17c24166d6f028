//! Bucketed rolling window of command outcomes.
//!
//! The window is split into fixed-length buckets addressed by an epoch
//! number (`elapsed / bucket_len`). A bucket whose epoch is older than the
//! current one is recycled lazily on the next write, so no background timer
//! is needed and reads only sum buckets still inside the window.

use std::time::Duration;

use tokio::time::Instant;

/// Classification of one finished invocation as seen by a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    /// The bulkhead refused to start the call.
    Rejected,
}

/// Summed outcome counts over the live part of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub success: u64,
    pub failure: u64,
    pub timeout: u64,
    pub rejected: u64,
}

impl OutcomeCounts {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failure => self.failure += 1,
            Outcome::Timeout => self.timeout += 1,
            Outcome::Rejected => self.rejected += 1,
        }
    }

    fn merge(&mut self, other: &OutcomeCounts) {
        self.success += other.success;
        self.failure += other.failure;
        self.timeout += other.timeout;
        self.rejected += other.rejected;
    }

    /// Outcomes that count against health.
    pub fn errors(&self) -> u64 {
        self.failure + self.timeout + self.rejected
    }

    pub fn total(&self) -> u64 {
        self.success + self.errors()
    }

    /// Integer error percentage, 0 when the window is empty.
    pub fn error_percentage(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        // errors <= total, so the quotient is at most 100.
        u8::try_from(self.errors() * 100 / total).unwrap_or(100)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    epoch: u64,
    counts: OutcomeCounts,
}

/// Rolling outcome statistics for one breaker.
#[derive(Debug)]
pub struct RollingWindow {
    buckets: Vec<Bucket>,
    bucket_len: Duration,
    origin: Instant,
}

impl RollingWindow {
    /// Create an empty window of `window` length split into `buckets`.
    pub fn new(window: Duration, buckets: u32) -> Self {
        let count = buckets.max(1);
        let bucket_len = (window / count).max(Duration::from_millis(1));
        Self {
            buckets: vec![Bucket::default(); count as usize],
            bucket_len,
            origin: Instant::now(),
        }
    }

    fn epoch(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        u64::try_from(elapsed / self.bucket_len.as_nanos()).unwrap_or(u64::MAX)
    }

    /// Count one outcome in the bucket covering `now`.
    pub fn record(&mut self, outcome: Outcome, now: Instant) {
        let epoch = self.epoch(now);
        let len = self.buckets.len() as u64;
        let bucket = &mut self.buckets[(epoch % len) as usize];
        if bucket.epoch != epoch {
            *bucket = Bucket {
                epoch,
                counts: OutcomeCounts::default(),
            };
        }
        bucket.counts.add(outcome);
    }

    /// Sum the buckets still inside the window at `now`.
    pub fn snapshot(&self, now: Instant) -> OutcomeCounts {
        let current = self.epoch(now);
        let len = self.buckets.len() as u64;
        let mut sum = OutcomeCounts::default();
        for bucket in &self.buckets {
            if bucket.epoch <= current && bucket.epoch + len > current {
                sum.merge(&bucket.counts);
            }
        }
        sum
    }

    /// Drop every recorded outcome.
    pub fn reset(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = Bucket::default();
        }
    }
}
