use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    hash::{BuildHasher, Hash, Hasher},
    sync::{Arc, LazyLock},
};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use twox_hash::XxHash64;

use crate::config::{MetricsConfig, ValidationError};
use crate::metrics::{Metric, MetricValue, Recordable};
use crate::resolve::{MeterKind, Resolver};

/// The process-wide registry that [`MeterDef::must`](crate::MeterDef::must)
/// resolves against.
pub static DEFAULT_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

const MID_SEED: u64 = 0xdeadbeef;

/// Build a resolver from `config` and return a fresh registry using it. When
/// `use_global_registry` is set the same resolver snapshot is also installed
/// into [`DEFAULT_REGISTRY`], so def-based meters created afterwards pick up
/// the configuration too. This is the one place global wiring happens; leave
/// the flag off in tests to keep them independent.
pub fn init(config: &MetricsConfig) -> Result<Registry, ValidationError> {
    let resolver = config.build()?;
    if config.use_global_registry {
        DEFAULT_REGISTRY.configure(resolver.clone());
    }
    Ok(Registry::with_resolver(resolver))
}

struct MeterMetadata {
    name: &'static str,
    kind: MeterKind,
    tags: SmallVec<[(&'static str, &'static str); 8]>,
    metric: Box<dyn Recordable>,
}

/// One meter's reading as drained by [`Registry::collect`].
#[derive(Debug, Clone)]
pub struct MeterSnapshot {
    pub name: &'static str,
    pub kind: MeterKind,
    pub tags: Vec<(&'static str, &'static str)>,
    pub value: MetricValue,
}

#[derive(Default)]
struct Interner {
    inner: Mutex<HashSet<&'static str>>,
}

impl Interner {
    /// Tag strings are interned by leaking them once and handing out the
    /// `&'static str` ever after. Meters live for the process, so the leak
    /// is bounded by the set of distinct tag strings.
    fn intern_tags(&self, tags: &[(&str, &str)]) -> SmallVec<[(&'static str, &'static str); 8]> {
        let mut inner = self.inner.lock();
        let intern = |i: &mut HashSet<&'static str>, s| -> &'static str {
            if let Some(is) = i.get(s) {
                is
            } else {
                let s = String::from(s);
                let leaked: &'static str = Box::leak(s.into_boxed_str());
                i.insert(leaked);
                leaked
            }
        };
        tags.iter()
            .map(|(k, v)| (intern(&mut inner, *k), intern(&mut inner, *v)))
            .collect()
    }
}

/// Holds every enabled meter plus the configuration snapshot meters resolve
/// against at creation time.
///
/// Reconfiguration ([`configure`](Registry::configure)) swaps the whole
/// resolver atomically: in-flight registrations keep the `Arc` they already
/// cloned and never observe a half-updated table. Meters that already exist
/// keep the settings they were created with.
#[derive(Default)]
pub struct Registry {
    metrics: RwLock<HashMap<u64, MeterMetadata, BuildNoopHasher>>,
    interner: Interner,
    resolver: RwLock<Arc<Resolver>>,
}

impl Registry {
    /// A registry with an empty configuration: everything enabled, all
    /// distribution settings at their defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: Resolver) -> Self {
        Self {
            resolver: RwLock::new(Arc::new(resolver)),
            ..Self::default()
        }
    }

    /// Replace the configuration snapshot. Only meters created after the
    /// swap see the new settings.
    pub fn configure(&self, resolver: Resolver) {
        *self.resolver.write() = Arc::new(resolver);
    }

    /// The current configuration snapshot.
    pub fn resolver(&self) -> Arc<Resolver> {
        Arc::clone(&self.resolver.read())
    }

    /// Calculate a metric-id for this meter. This is used as a key internally
    /// to the registry to handle lookups of registered meters.
    /// NOTE: tags **must** be sorted to get an accurate mid.
    fn mid(&self, name: &str, tags: &[(&str, &str)]) -> u64 {
        debug_assert!(tags.is_sorted());
        let mut hasher = XxHash64::with_seed(MID_SEED);
        name.hash(&mut hasher);
        tags.hash(&mut hasher);
        hasher.finish()
    }

    /// Register is a fairly heavyweight operation: the effective
    /// configuration for the name is resolved here, tags are interned, and
    /// the meter is deduplicated by mid. Concrete meters are expected to be
    /// cached at a higher level, so everything after registration is
    /// coordination free.
    ///
    /// A name that resolves to disabled gets a meter that is real but never
    /// registered, so nothing it records is ever collected.
    pub fn register<R: Recordable + Metric + Clone>(
        &self,
        name: &'static str,
        tags: &[(&str, &str)],
    ) -> R {
        let resolver = self.resolver();
        let settings = R::settings(&resolver, name);
        if !resolver.enabled(name) {
            tracing::debug!(
                message = "meter disabled by configuration",
                name = name,
                kind = R::KIND.as_str()
            );
            return R::build(settings);
        }

        let mut tags = self.interner.intern_tags(tags);
        // To ensure consistent mid generation we sort and dedupe our tags.
        tags.sort_unstable();
        tags.dedup();
        let mid = self.mid(name, &tags);
        let mut metrics = self.metrics.write();
        match metrics.entry(mid) {
            Entry::Occupied(entry) => entry
                .get()
                .metric
                .as_any()
                .downcast_ref::<R>()
                .cloned()
                .expect("attempted to register meter with same mid with different type"),
            Entry::Vacant(entry) => {
                let metric = R::build(settings);
                entry.insert(MeterMetadata {
                    name,
                    kind: R::KIND,
                    tags,
                    metric: Box::new(metric.clone()),
                });
                metric
            }
        }
    }

    /// Drain a reading from every registered meter. Counters and
    /// distribution windows reset on read, so callers own delta semantics.
    pub fn collect(&self) -> Vec<MeterSnapshot> {
        let metrics = self.metrics.read();
        let mut snapshots = Vec::with_capacity(metrics.len());
        for metadata in metrics.values() {
            snapshots.push(MeterSnapshot {
                name: metadata.name,
                kind: metadata.kind,
                tags: metadata.tags.to_vec(),
                value: metadata.metric.value(),
            });
        }
        tracing::debug!(message = "collected meters", meters = snapshots.len());
        snapshots
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.metrics.read().len()
    }
}

/// Pass a pre-hashed mid straight through instead of hashing it again.
struct NoopHasher {
    inner: u64,
}

impl Hasher for NoopHasher {
    fn finish(&self) -> u64 {
        self.inner
    }

    fn write(&mut self, _bytes: &[u8]) {
        debug_assert!(
            false,
            "NoopHasher only supports u64s that were already hashed"
        );
    }

    fn write_u64(&mut self, i: u64) {
        self.inner = i;
    }
}

#[derive(Default, Clone, Copy)]
struct BuildNoopHasher;

impl BuildHasher for BuildNoopHasher {
    type Hasher = NoopHasher;

    fn build_hasher(&self) -> Self::Hasher {
        NoopHasher { inner: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Counter, CounterDef, MeterDef, Timer};

    const CLIENT_REQUESTS: CounterDef = MeterDef::new(
        "alleycat.client.requests",
        &["service", "method", "status"],
    );

    #[test]
    fn register_dedupes_by_sorted_tags() {
        let registry = Registry::new();
        let counter: Counter = registry.register(
            CLIENT_REQUESTS.name(),
            &[("service", "collector"), ("method", "push"), ("status", "ok")],
        );
        let counter2: Counter = registry.register(
            CLIENT_REQUESTS.name(),
            &[("status", "ok"), ("service", "collector"), ("method", "push")],
        );
        counter.incr();
        counter2.incr();
        assert_eq!(registry.len(), 1);
        match &registry.collect()[0].value {
            MetricValue::Counter(v) => assert_eq!(*v, 2),
            other => panic!("expected a counter value, got {other:?}"),
        }
    }

    #[test]
    fn distinct_tag_values_are_distinct_meters() {
        let registry = Registry::new();
        let _ok: Counter = registry.register(CLIENT_REQUESTS.name(), &[("status", "ok")]);
        let _err: Counter = registry.register(CLIENT_REQUESTS.name(), &[("status", "error")]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn disabled_meters_are_never_collected() -> anyhow::Result<()> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = MetricsConfig::from_toml_str(
            r#"
            [enabled]
            "jvm" = false
            "#,
        )?;
        let registry = Registry::with_resolver(config.build()?);
        let counter: Counter = registry.register("jvm.memory.used", &[]);
        counter.incr();
        let _kept: Counter = registry.register("http.server.requests", &[]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.collect()[0].name, "http.server.requests");
        Ok(())
    }

    #[test]
    fn timers_pick_up_resolved_settings() -> anyhow::Result<()> {
        let config = MetricsConfig::from_toml_str(
            r#"
            [timers.sla]
            "http.server.requests" = ["100ms"]
            "#,
        )?;
        let registry = Registry::with_resolver(config.build()?);
        let timer: Timer = registry.register("http.server.requests", &[]);
        timer.record(std::time::Duration::from_millis(250));
        let snapshots = registry.collect();
        assert_eq!(snapshots[0].kind, MeterKind::Timer);
        match &snapshots[0].value {
            MetricValue::Distribution { sla, .. } => assert_eq!(sla, &vec![(1e8, 1)]),
            other => panic!("expected a distribution value, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn configure_swaps_the_snapshot_for_new_meters() {
        let registry = Registry::new();
        let before: Timer = registry.register("http.server.requests", &[("phase", "before")]);
        let config = MetricsConfig::from_toml_str(
            r#"
            [enabled]
            "http" = false
            "#,
        )
        .unwrap();
        registry.configure(config.build().unwrap());
        let _after: Timer = registry.register("http.server.requests", &[("phase", "after")]);
        // the pre-swap meter is untouched, the post-swap one was dropped
        before.record(std::time::Duration::from_millis(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn init_respects_the_global_registry_flag() {
        let config = MetricsConfig::from_toml_str("use_global_registry = false").unwrap();
        let registry = init(&config).unwrap();
        assert_eq!(registry.len(), 0);
    }
}
