use std::{any::Any, marker::PhantomData};

use crate::registry::{Registry, DEFAULT_REGISTRY};
use crate::resolve::{MeterKind, Resolver};

pub(crate) mod counter;
pub(crate) mod distribution;
pub(crate) mod gauge;
pub(crate) mod summary;
pub(crate) mod timer;

/// A trait representing the public meter interface. Construction is settings
/// driven: the registry resolves the effective configuration for the meter
/// name once, at creation time, and hands it to [`build`](Metric::build).
/// Counters and gauges take no settings; timers and summaries take the
/// resolved distribution configuration for their kind, which keeps a timer
/// from ever being built against summary-valued overrides.
pub trait Metric: Sized + Clone {
    type Settings;

    const KIND: MeterKind;

    /// Resolve the creation-time settings for a meter with this name.
    fn settings(resolver: &Resolver, name: &str) -> Self::Settings;

    fn build(settings: Self::Settings) -> Self;
}

/// A point-in-time reading of a meter, drained on collection.
#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Distribution {
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
        /// `(percentile, estimated value)` pairs, ascending by percentile.
        percentiles: Vec<(f64, f64)>,
        /// `(boundary, violation count)` pairs in declaration order.
        sla: Vec<(f64, u64)>,
    },
}

/// A trait representing the internal chunk of the meter interface. We use
/// this to collect observations of the underlying metric value, as well as
/// store references to the meter in the registry.
pub trait Recordable: Send + Sync + 'static {
    /// Recover the concrete [`Metric`] from a `dyn Recordable` held by the
    /// registry.
    fn as_any(&self) -> &dyn Any;

    fn value(&self) -> MetricValue;
}

/// A constant definition of a meter. Provides a single spot for defining the
/// schema of a meter at compile time; at runtime it calls out to the
/// registry, which resolves the effective configuration for the name and
/// registers the meter.
pub struct MeterDef<M> {
    name: &'static str,
    tags: &'static [&'static str],
    _kind: PhantomData<M>,
}

impl<M> MeterDef<M>
where
    M: Metric + Recordable,
{
    pub const fn new(name: &'static str, tags: &'static [&'static str]) -> Self {
        Self {
            name,
            tags,
            _kind: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Resolve (or create) this meter with the given tag values against the
    /// process-wide default registry.
    pub fn must(&self, tags: &[(&str, &str)]) -> M {
        self.must_with_registry(&DEFAULT_REGISTRY, tags)
    }

    pub fn must_with_registry(&self, registry: &Registry, tags: &[(&str, &str)]) -> M {
        debug_assert!(
            tags.iter()
                .all(|(key, _)| self.tags.iter().any(|declared| declared == key)),
            "tag key not declared in the schema for {}",
            self.name
        );
        registry.register(self.name, tags)
    }
}
