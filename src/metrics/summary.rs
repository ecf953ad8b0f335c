use std::{any::Any, sync::Arc};

use crate::resolve::{MeterKind, Resolver, SummaryConfig};

use super::distribution::{DistributionConfig, DistributionStats};
use super::MetricValue;

/// Bucketing clamps used when the configuration sets no expected range.
const DEFAULT_MIN_COUNT: f64 = 1f64;
const DEFAULT_MAX_COUNT: f64 = u64::MAX as f64;

/// A meter tracking the distribution of recorded amounts that are not
/// durations, like payload sizes or batch lengths. Shaped by the
/// [`SummaryConfig`] resolved for its name at creation time.
#[derive(Clone)]
pub struct Summary {
    inner: Arc<DistributionStats>,
}

impl Summary {
    pub fn record(&self, amount: u64) {
        self.inner.record(amount as f64);
    }
}

impl From<SummaryConfig> for DistributionConfig {
    fn from(config: SummaryConfig) -> Self {
        let min_expected = config
            .minimum_expected_value
            .map(|v| v as f64)
            .unwrap_or(DEFAULT_MIN_COUNT);
        let max_expected = config
            .maximum_expected_value
            .map(|v| v as f64)
            .unwrap_or(DEFAULT_MAX_COUNT)
            .max(min_expected);
        Self {
            percentile_histogram: config.percentile_histogram,
            percentiles: config.percentiles,
            expiry: config.histogram_expiry,
            buffer_length: config.histogram_buffer_length,
            min_expected,
            max_expected,
            sla: config.sla.into_iter().map(|v| v as f64).collect(),
        }
    }
}

impl super::Metric for Summary {
    type Settings = SummaryConfig;

    const KIND: MeterKind = MeterKind::Summary;

    fn settings(resolver: &Resolver, name: &str) -> Self::Settings {
        resolver.resolve_summary(name)
    }

    fn build(settings: Self::Settings) -> Self {
        Self {
            inner: Arc::new(DistributionStats::new(settings.into())),
        }
    }
}

impl super::Recordable for Summary {
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
    fn sla_keeps_declaration_order() {
        let mut config = SummaryConfig::default();
        config.sla = vec![4096, 1024];
        let summary = Summary::build(config);
        summary.record(2048);
        match summary.value() {
            MetricValue::Distribution { sla, .. } => {
                assert_eq!(sla, vec![(4096f64, 0), (1024f64, 1)]);
            }
            other => panic!("expected a distribution value, got {other:?}"),
        }
    }

    #[test]
    fn records_accumulate_count_and_sum() {
        let summary = Summary::build(SummaryConfig::default());
        summary.record(10);
        summary.record(30);
        match summary.value() {
            MetricValue::Distribution {
                count, sum, min, max, ..
            } => {
                assert_eq!(count, 2);
                assert_eq!(sum, 40f64);
                assert_eq!(min, 10f64);
                assert_eq!(max, 30f64);
            }
            other => panic!("expected a distribution value, got {other:?}"),
        }
    }
}
