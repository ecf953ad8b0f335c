//! Resolution of per-meter distribution settings.
//!
//! Every distribution statistic has its own name-keyed override table, and
//! each one resolves independently: the longest key prefixing the meter name
//! wins, and a miss falls back to the built-in default. Timer-valued and
//! summary-valued tables are kept as distinct types so a lookup can never
//! cross kinds.

use std::time::Duration;

use crate::overrides::OverrideTable;

/// Default ring-buffer rotation window for decaying distribution statistics.
pub const DEFAULT_HISTOGRAM_EXPIRY: Duration = Duration::from_secs(120);
/// Default number of ring-buffer windows.
pub const DEFAULT_HISTOGRAM_BUFFER_LENGTH: usize = 5;

/// The kind of a meter as tracked by the registry. Only [`Timer`] and
/// [`Summary`] carry distribution statistics.
///
/// [`Timer`]: MeterKind::Timer
/// [`Summary`]: MeterKind::Summary
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MeterKind {
    Counter,
    Gauge,
    Timer,
    Summary,
}

impl MeterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeterKind::Counter => "counter",
            MeterKind::Gauge => "gauge",
            MeterKind::Timer => "timer",
            MeterKind::Summary => "summary",
        }
    }
}

/// The fully resolved settings applied to one meter at creation time.
///
/// `T` is the clamp/SLA value type: [`Duration`] for timers, `u64` (a raw
/// count) for distribution summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig<T> {
    /// When false the meter is constructed but never registered or collected.
    pub enabled: bool,
    /// Publish a histogram structure usable for server-side percentile
    /// aggregation.
    pub percentile_histogram: bool,
    /// Client-computed percentiles, each in (0, 1]. Emitted sorted ascending
    /// with duplicates removed.
    pub percentiles: Vec<f64>,
    /// Ring buffers holding decaying statistics rotate after this expiry.
    pub histogram_expiry: Duration,
    /// Number of ring-buffer windows accumulating decaying statistics.
    pub histogram_buffer_length: usize,
    /// Clamp recorded values to at least this before bucketing.
    pub minimum_expected_value: Option<T>,
    /// Clamp recorded values to at most this before bucketing.
    pub maximum_expected_value: Option<T>,
    /// SLA boundaries, in declaration order. One violation counter is
    /// published per boundary.
    pub sla: Vec<T>,
}

impl<T> Default for EffectiveConfig<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            percentile_histogram: false,
            percentiles: Vec::new(),
            histogram_expiry: DEFAULT_HISTOGRAM_EXPIRY,
            histogram_buffer_length: DEFAULT_HISTOGRAM_BUFFER_LENGTH,
            minimum_expected_value: None,
            maximum_expected_value: None,
            sla: Vec::new(),
        }
    }
}

/// Resolved settings for a [`Timer`](crate::Timer).
pub type TimerConfig = EffectiveConfig<Duration>;
/// Resolved settings for a [`Summary`](crate::Summary).
pub type SummaryConfig = EffectiveConfig<u64>;

/// The override tables shared by both distribution kinds plus the
/// kind-specific clamp/SLA tables.
#[derive(Debug, Clone, Default)]
pub(crate) struct DistributionTables<T> {
    pub(crate) percentile_histogram: OverrideTable<bool>,
    pub(crate) percentiles: OverrideTable<Vec<f64>>,
    pub(crate) histogram_expiry: OverrideTable<Duration>,
    pub(crate) histogram_buffer_length: OverrideTable<usize>,
    pub(crate) minimum_expected_value: OverrideTable<T>,
    pub(crate) maximum_expected_value: OverrideTable<T>,
    pub(crate) sla: OverrideTable<Vec<T>>,
}

impl<T: Clone> DistributionTables<T> {
    fn resolve(&self, name: &str, enabled: bool) -> EffectiveConfig<T> {
        EffectiveConfig {
            enabled,
            percentile_histogram: self.percentile_histogram.get_or(name, false),
            percentiles: self.percentiles.get_or(name, Vec::new()),
            histogram_expiry: self
                .histogram_expiry
                .get_or(name, DEFAULT_HISTOGRAM_EXPIRY),
            histogram_buffer_length: self
                .histogram_buffer_length
                .get_or(name, DEFAULT_HISTOGRAM_BUFFER_LENGTH),
            minimum_expected_value: self.minimum_expected_value.get(name).cloned(),
            maximum_expected_value: self.maximum_expected_value.get(name).cloned(),
            sla: self.sla.get_or(name, Vec::new()),
        }
    }
}

/// Resolves the effective configuration for a meter name against the
/// compiled override tables.
///
/// A resolver is immutable once built ([`MetricsConfig::build`]) and safe to
/// share across threads; reconfiguration replaces the whole resolver via
/// [`Registry::configure`] rather than mutating tables in place.
///
/// [`MetricsConfig::build`]: crate::config::MetricsConfig::build
/// [`Registry::configure`]: crate::Registry::configure
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    pub(crate) enabled: OverrideTable<bool>,
    pub(crate) timers: DistributionTables<Duration>,
    pub(crate) summaries: DistributionTables<u64>,
}

impl Resolver {
    /// Whether a meter with this name should collect at all. Applies to
    /// every meter kind and defaults to enabled.
    pub fn enabled(&self, name: &str) -> bool {
        self.enabled.get_or(name, true)
    }

    /// Resolve the effective settings for a timer named `name`.
    pub fn resolve_timer(&self, name: &str) -> TimerConfig {
        self.timers.resolve(name, self.enabled(name))
    }

    /// Resolve the effective settings for a distribution summary named
    /// `name`.
    pub fn resolve_summary(&self, name: &str) -> SummaryConfig {
        self.summaries.resolve(name, self.enabled(name))
    }
}
