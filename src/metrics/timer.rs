use std::{
    any::Any,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::resolve::{MeterKind, Resolver, TimerConfig};

use super::distribution::{DistributionConfig, DistributionStats};
use super::MetricValue;

const NANOS_PER_SEC: f64 = 1e9;

/// Bucketing clamps used when the configuration sets no expected range:
/// 1ms to 30s covers the useful resolution for request-style timings.
const DEFAULT_MIN_NANOS: f64 = 1e6;
const DEFAULT_MAX_NANOS: f64 = 30.0 * NANOS_PER_SEC;

fn to_nanos(duration: Duration) -> f64 {
    // exact for anything under ~104 days
    duration.as_nanos() as f64
}

/// A meter tracking the distribution of event durations. All internal
/// bookkeeping is in nanoseconds; the shape of the distribution (histogram,
/// percentiles, SLA boundaries, decay) comes from the [`TimerConfig`]
/// resolved for the timer's name at creation time.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<DistributionStats>,
}

impl Timer {
    pub fn record(&self, duration: Duration) {
        self.inner.record(to_nanos(duration));
    }

    /// Time a closure and record its wall-clock duration.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let out = f();
        self.record(start.elapsed());
        out
    }
}

impl From<TimerConfig> for DistributionConfig {
    fn from(config: TimerConfig) -> Self {
        let min_expected = config
            .minimum_expected_value
            .map(to_nanos)
            .unwrap_or(DEFAULT_MIN_NANOS);
        let max_expected = config
            .maximum_expected_value
            .map(to_nanos)
            .unwrap_or(DEFAULT_MAX_NANOS)
            .max(min_expected);
        Self {
            percentile_histogram: config.percentile_histogram,
            percentiles: config.percentiles,
            expiry: config.histogram_expiry,
            buffer_length: config.histogram_buffer_length,
            min_expected,
            max_expected,
            sla: config.sla.into_iter().map(to_nanos).collect(),
        }
    }
}

impl super::Metric for Timer {
    type Settings = TimerConfig;

    const KIND: MeterKind = MeterKind::Timer;

    fn settings(resolver: &Resolver, name: &str) -> Self::Settings {
        resolver.resolve_timer(name)
    }

    fn build(settings: Self::Settings) -> Self {
        Self {
            inner: Arc::new(DistributionStats::new(settings.into())),
        }
    }
}

impl super::Recordable for Timer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self) -> MetricValue {
        self.inner.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Metric, Recordable};

    #[test]
    fn sla_boundaries_convert_to_nanos() {
        let mut config = TimerConfig::default();
        config.sla = vec![Duration::from_millis(100), Duration::from_millis(500)];
        let timer = Timer::build(config);
        for _ in 0..9 {
            timer.record(Duration::from_millis(50));
        }
        timer.record(Duration::from_secs(1));
        match timer.value() {
            MetricValue::Distribution { count, sla, .. } => {
                assert_eq!(count, 10);
                assert_eq!(sla, vec![(1e8, 1), (5e8, 1)]);
            }
            other => panic!("expected a distribution value, got {other:?}"),
        }
    }

    #[test]
    fn time_returns_the_closure_output() {
        let timer = Timer::build(TimerConfig::default());
        let out = timer.time(|| 41 + 1);
        assert_eq!(out, 42);
        match timer.value() {
            MetricValue::Distribution { count, .. } => assert_eq!(count, 1),
            other => panic!("expected a distribution value, got {other:?}"),
        }
    }
}
