//! The shared accumulator behind timers and distribution summaries.
//!
//! Decaying statistics (min, max, percentile estimates) live in a ring of
//! windows: every recording lands in all of them, and the ring rotates every
//! `expiry / buffer_length`, resetting the stalest window. The reported
//! window has therefore seen between `expiry - step` and `expiry` worth of
//! samples. Count, sum, and SLA violation counters are cumulative and never
//! decay.
//!
//! Percentiles are estimated over a bucket ladder: the configured SLA
//! boundaries plus, when a histogram or explicit percentiles were requested,
//! a doubling series between the expected value clamps. The estimate for a
//! percentile is the smallest bucket boundary covering its rank.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::MetricValue;

/// Cap on the generated doubling series; SLA boundaries come on top.
const MAX_GENERATED_BUCKETS: usize = 64;

/// Unit-agnostic distribution settings. Timers arrive here with every value
/// converted to nanoseconds, summaries with raw counts as `f64`; the clamp
/// bounds are already defaulted and ordered by the conversion.
#[derive(Debug, Clone)]
pub(crate) struct DistributionConfig {
    pub(crate) percentile_histogram: bool,
    pub(crate) percentiles: Vec<f64>,
    pub(crate) expiry: Duration,
    pub(crate) buffer_length: usize,
    pub(crate) min_expected: f64,
    pub(crate) max_expected: f64,
    /// Declaration order, matters for reporting.
    pub(crate) sla: Vec<f64>,
}

impl DistributionConfig {
    /// The sorted bucket ladder used for histogram counts and percentile
    /// estimation. Empty when neither a histogram, percentiles, nor SLA
    /// boundaries were configured.
    fn ladder(&self) -> Vec<f64> {
        let mut buckets = self.sla.clone();
        if self.percentile_histogram || !self.percentiles.is_empty() {
            let mut bound = self.min_expected.max(f64::MIN_POSITIVE);
            let mut generated = 0;
            while bound < self.max_expected && generated < MAX_GENERATED_BUCKETS {
                buckets.push(bound);
                bound *= 2.0;
                generated += 1;
            }
            buckets.push(self.max_expected);
        }
        buckets.sort_by(f64::total_cmp);
        buckets.dedup();
        buckets
    }
}

#[derive(Debug)]
struct Window {
    count: u64,
    min: f64,
    max: f64,
    /// One slot per ladder bucket plus an overflow slot at the end.
    bucket_counts: Vec<u64>,
}

impl Window {
    fn new(buckets: usize) -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            bucket_counts: vec![0; buckets + 1],
        }
    }

    fn record(&mut self, value: f64, bucket: usize) {
        self.count += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.bucket_counts[bucket] += 1;
    }

    fn reset(&mut self) {
        self.count = 0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.bucket_counts.fill(0);
    }
}

#[derive(Debug)]
struct Inner {
    count: u64,
    sum: f64,
    sla: Vec<f64>,
    violations: Vec<u64>,
    percentiles: Vec<f64>,
    buckets: Vec<f64>,
    min_expected: f64,
    max_expected: f64,
    windows: Vec<Window>,
    /// Index of the stalest window, the one currently reported and the next
    /// to be reset.
    current: usize,
    rotate_every: Duration,
    last_rotate: Instant,
}

impl Inner {
    fn new(config: DistributionConfig, start: Instant) -> Self {
        let buckets = config.ladder();
        let violations = vec![0; config.sla.len()];
        // validated nonzero at configuration load; hand-built settings get
        // clamped instead of dividing by zero
        let buffer_length = config.buffer_length.max(1);
        let windows = (0..buffer_length)
            .map(|_| Window::new(buckets.len()))
            .collect();
        let rotate_every = config.expiry / buffer_length as u32;
        Self {
            count: 0,
            sum: 0f64,
            sla: config.sla,
            violations,
            percentiles: config.percentiles,
            buckets,
            min_expected: config.min_expected,
            max_expected: config.max_expected,
            windows,
            current: 0,
            rotate_every,
            last_rotate: start,
        }
    }

    fn rotate_if_due(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_rotate);
        if elapsed < self.rotate_every {
            return;
        }
        let due = (elapsed.as_nanos() / self.rotate_every.as_nanos().max(1)) as usize;
        if due >= self.windows.len() {
            // Idle longer than the whole ring, everything has decayed.
            for window in &mut self.windows {
                window.reset();
            }
            self.current = 0;
            self.last_rotate = now;
            return;
        }
        for _ in 0..due {
            self.windows[self.current].reset();
            self.current = (self.current + 1) % self.windows.len();
            self.last_rotate += self.rotate_every;
        }
    }

    fn record_at(&mut self, now: Instant, value: f64) {
        self.rotate_if_due(now);
        self.count += 1;
        self.sum += value;
        for (index, &boundary) in self.sla.iter().enumerate() {
            if value > boundary {
                self.violations[index] += 1;
            }
        }
        let clamped = value.clamp(self.min_expected, self.max_expected);
        let bucket = self.buckets.partition_point(|&bound| bound < clamped);
        for window in &mut self.windows {
            window.record(value, bucket);
        }
    }

    fn snapshot_at(&mut self, now: Instant) -> MetricValue {
        self.rotate_if_due(now);
        let window = &self.windows[self.current];
        let percentiles = self
            .percentiles
            .iter()
            .map(|&p| (p, estimate(p, window, &self.buckets)))
            .collect();
        let sla = self
            .sla
            .iter()
            .copied()
            .zip(self.violations.iter().copied())
            .collect();
        MetricValue::Distribution {
            count: self.count,
            sum: self.sum,
            min: if window.count == 0 { 0f64 } else { window.min },
            max: if window.count == 0 { 0f64 } else { window.max },
            percentiles,
            sla,
        }
    }
}

/// Estimate one percentile from the window's bucket counts: the smallest
/// ladder boundary whose cumulative count covers the percentile's rank.
/// Values past the last boundary fall back to the window max.
fn estimate(percentile: f64, window: &Window, buckets: &[f64]) -> f64 {
    if window.count == 0 {
        return 0f64;
    }
    let rank = (percentile * window.count as f64).ceil().max(1f64) as u64;
    let mut cumulative = 0u64;
    for (index, &bound) in buckets.iter().enumerate() {
        cumulative += window.bucket_counts[index];
        if cumulative >= rank {
            return bound;
        }
    }
    window.max
}

/// A threadsafe, configuration-shaped accumulator for distribution-style
/// meters.
#[derive(Debug)]
pub(crate) struct DistributionStats {
    inner: Mutex<Inner>,
}

impl DistributionStats {
    pub(crate) fn new(config: DistributionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::new(config, Instant::now())),
        }
    }

    pub(crate) fn record(&self, value: f64) {
        self.inner.lock().record_at(Instant::now(), value);
    }

    pub(crate) fn snapshot(&self) -> MetricValue {
        self.inner.lock().snapshot_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sla: Vec<f64>, percentiles: Vec<f64>) -> DistributionConfig {
        DistributionConfig {
            percentile_histogram: false,
            percentiles,
            expiry: Duration::from_secs(120),
            buffer_length: 3,
            min_expected: 1f64,
            max_expected: 1_000_000f64,
            sla,
        }
    }

    fn distribution_parts(value: MetricValue) -> (u64, f64, f64, f64, Vec<(f64, f64)>, Vec<(f64, u64)>) {
        match value {
            MetricValue::Distribution {
                count,
                sum,
                min,
                max,
                percentiles,
                sla,
            } => (count, sum, min, max, percentiles, sla),
            other => panic!("expected a distribution value, got {other:?}"),
        }
    }

    #[test]
    fn counts_sla_violations_in_declaration_order() {
        let stats = DistributionStats::new(config(vec![100f64, 10f64], Vec::new()));
        for value in [5f64, 15f64, 150f64] {
            stats.record(value);
        }
        let (count, sum, min, max, _, sla) = distribution_parts(stats.snapshot());
        assert_eq!(count, 3);
        assert_eq!(sum, 170f64);
        assert_eq!(min, 5f64);
        assert_eq!(max, 150f64);
        // declaration order kept even though the boundaries are unsorted
        assert_eq!(sla, vec![(100f64, 1), (10f64, 2)]);
    }

    #[test]
    fn empty_distribution_reports_zeros() {
        let stats = DistributionStats::new(config(Vec::new(), vec![0.5]));
        let (count, sum, min, max, percentiles, _) = distribution_parts(stats.snapshot());
        assert_eq!(count, 0);
        assert_eq!(sum, 0f64);
        assert_eq!(min, 0f64);
        assert_eq!(max, 0f64);
        assert_eq!(percentiles, vec![(0.5, 0f64)]);
    }

    #[test]
    fn percentile_estimates_follow_the_ladder() {
        // requesting percentiles generates the doubling ladder 1, 2, 4, ...
        let stats = DistributionStats::new(config(Vec::new(), vec![0.5, 1.0]));
        for value in [1f64, 2f64, 3f64, 50f64] {
            stats.record(value);
        }
        let (_, _, _, _, percentiles, _) = distribution_parts(stats.snapshot());
        // rank 2 of 4 is covered at boundary 2, rank 4 at boundary 64
        assert_eq!(percentiles[0], (0.5, 2f64));
        assert_eq!(percentiles[1], (1.0, 64f64));
    }

    #[test]
    fn percentiles_are_monotonic() {
        let stats = DistributionStats::new(config(Vec::new(), vec![0.5, 0.9, 0.99]));
        for value in 1..=1000 {
            stats.record(value as f64);
        }
        let (_, _, _, _, percentiles, _) = distribution_parts(stats.snapshot());
        assert!(percentiles.windows(2).all(|pair| pair[0].1 <= pair[1].1));
        assert!(percentiles.iter().all(|&(_, v)| v >= 1f64));
    }

    #[test]
    fn clamping_only_affects_bucketing() {
        let mut cfg = config(Vec::new(), vec![1.0]);
        cfg.max_expected = 100f64;
        let stats = DistributionStats::new(cfg);
        stats.record(5000f64);
        let (_, _, _, max, percentiles, _) = distribution_parts(stats.snapshot());
        // raw max is untouched; the percentile estimate is capped by the
        // clamped ladder
        assert_eq!(max, 5000f64);
        assert_eq!(percentiles[0].1, 100f64);
    }

    #[test]
    fn decayed_statistics_reset_after_expiry() {
        let start = Instant::now();
        let mut inner = Inner::new(config(Vec::new(), vec![0.5]), start);
        inner.record_at(start, 100f64);
        // one rotation step: the recording is still visible
        let step = inner.rotate_every;
        let value = inner.snapshot_at(start + step);
        let (count, _, _, max, _, _) = distribution_parts(value);
        assert_eq!(count, 1);
        assert_eq!(max, 100f64);
        // past the full expiry every window has rotated out
        let value = inner.snapshot_at(start + step * 4);
        let (count, _, _, max, _, _) = distribution_parts(value);
        // cumulative count survives, decaying max does not
        assert_eq!(count, 1);
        assert_eq!(max, 0f64);
    }

    #[test]
    fn staggered_rotation_keeps_recent_samples() {
        let start = Instant::now();
        let mut inner = Inner::new(config(Vec::new(), Vec::new()), start);
        let step = inner.rotate_every;
        inner.record_at(start, 1f64);
        inner.record_at(start + step, 2f64);
        inner.record_at(start + step * 2, 3f64);
        // the first sample has decayed out of the reported window, the
        // later two have not
        let (_, _, min, max, _, _) = distribution_parts(inner.snapshot_at(start + step * 3));
        assert_eq!(min, 2f64);
        assert_eq!(max, 3f64);
    }
}
