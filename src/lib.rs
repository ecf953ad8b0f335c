//! Configuration-driven metrics instrumentation.
//!
//! Meters are declared as compile-time constants and resolved against a
//! registry. How a timer or distribution summary behaves (histogram on or
//! off, which percentiles, SLA boundaries, decay windows, whether the meter
//! collects at all) is decided at creation time by name-keyed configuration
//! overrides, where the longest key prefixing the meter name wins.
//!
//! ```
//! use std::time::Duration;
//! use meterconf::{MetricsConfig, Registry, Timer};
//!
//! let config = MetricsConfig::from_toml_str(r#"
//!     use_global_registry = false
//!
//!     [timers.percentiles]
//!     "http.server" = [0.5, 0.99]
//!
//!     [timers.sla]
//!     "http.server.requests" = ["250ms"]
//! "#)?;
//! let registry = Registry::with_resolver(config.build()?);
//!
//! let timer: Timer = registry.register("http.server.requests", &[("method", "GET")]);
//! timer.record(Duration::from_millis(90));
//! for snapshot in registry.collect() {
//!     println!("{} {:?}", snapshot.name, snapshot.value);
//! }
//! # Ok::<(), meterconf::ConfigError>(())
//! ```

pub mod config;
mod metrics;
mod overrides;
mod registry;
pub mod resolve;
pub mod web;

pub use config::{ConfigError, MetricsConfig, ValidationError};
pub use metrics::{
    counter::Counter, gauge::Gauge, summary::Summary, timer::Timer, MeterDef, Metric, MetricValue,
    Recordable,
};
pub use overrides::OverrideTable;
pub use registry::{init, MeterSnapshot, Registry, DEFAULT_REGISTRY};
pub use resolve::{EffectiveConfig, MeterKind, Resolver, SummaryConfig, TimerConfig};

pub type CounterDef = MeterDef<Counter>;
pub type GaugeDef = MeterDef<Gauge>;
pub type TimerDef = MeterDef<Timer>;
pub type SummaryDef = MeterDef<Summary>;

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST_TIMER: TimerDef = TimerDef::new("http.server.requests", &["method"]);

    #[test]
    fn def_resolves_against_the_default_registry() {
        let timer = REQUEST_TIMER.must(&[("method", "GET")]);
        timer.record(std::time::Duration::from_millis(5));
    }
}
