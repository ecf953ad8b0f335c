//! Configuration binding for the metrics subsystem.
//!
//! [`MetricsConfig`] declares every recognized tunable: HTTP client/server
//! metric naming, the global-registry wiring flag, enable/disable overrides,
//! and the per-meter-name distribution override maps for timers and
//! summaries. A loader deserializes it (all fields default, so an empty
//! document is valid), then [`MetricsConfig::build`] validates the maps and
//! compiles them into an immutable [`Resolver`].
//!
//! Duration-valued settings are written as humantime strings (`"2m"`,
//! `"150ms"`).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::overrides::OverrideTable;
use crate::resolve::{DistributionTables, Resolver};

/// A configuration value that cannot be accepted. Raised while building the
/// resolver, before any meter is created; the load is aborted rather than
/// the value coerced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Percentiles must lie in (0, 1]; 0.999 means the 99.9th percentile.
    #[error("percentile {percentile} for '{key}' is outside (0, 1]")]
    PercentileOutOfRange { key: String, percentile: f64 },

    /// A ring buffer needs at least one window.
    #[error("histogram buffer length for '{key}' must be at least 1")]
    ZeroBufferLength { key: String },
}

/// Failure to read or parse a configuration document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Root configuration for the metrics subsystem.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether registries built from this configuration also install their
    /// resolved settings into the process-wide default registry. Set to
    /// false in tests to maximize independence.
    pub use_global_registry: bool,
    /// Name-keyed enable overrides. A meter whose name matches a `false`
    /// entry is a no-op. Applies to every meter kind.
    pub enabled: BTreeMap<String, bool>,
    /// Settings read by the HTTP instrumentation layer.
    pub web: WebConfig,
    /// Distribution overrides for timers; clamp and SLA values are
    /// durations.
    pub timers: TimerDistributions,
    /// Distribution overrides for summaries; clamp and SLA values are raw
    /// counts.
    pub summaries: SummaryDistributions,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            use_global_registry: true,
            enabled: BTreeMap::new(),
            web: WebConfig::default(),
            timers: TimerDistributions::default(),
            summaries: SummaryDistributions::default(),
        }
    }
}

impl MetricsConfig {
    /// Parse a TOML document. An empty string yields the all-defaults
    /// configuration.
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(doc)?)
    }

    /// Validate the override maps and compile them into an immutable
    /// [`Resolver`]. Fails fast on the first invalid value.
    pub fn build(&self) -> Result<Resolver, ValidationError> {
        validate_percentiles("timers.percentiles", &self.timers.percentiles)?;
        validate_percentiles("summaries.percentiles", &self.summaries.percentiles)?;
        validate_buffer_lengths(&self.timers.histogram_buffer_length)?;
        validate_buffer_lengths(&self.summaries.histogram_buffer_length)?;

        Ok(Resolver {
            enabled: OverrideTable::from_map(self.enabled.clone()),
            timers: DistributionTables {
                percentile_histogram: OverrideTable::from_map(
                    self.timers.percentile_histogram.clone(),
                ),
                percentiles: percentile_table(&self.timers.percentiles),
                histogram_expiry: OverrideTable::from_map(
                    self.timers.histogram_expiry.clone(),
                ),
                histogram_buffer_length: OverrideTable::from_map(
                    self.timers.histogram_buffer_length.clone(),
                ),
                minimum_expected_value: OverrideTable::from_map(
                    self.timers.minimum_expected_value.clone(),
                ),
                maximum_expected_value: OverrideTable::from_map(
                    self.timers.maximum_expected_value.clone(),
                ),
                sla: OverrideTable::from_map(self.timers.sla.clone()),
            },
            summaries: DistributionTables {
                percentile_histogram: OverrideTable::from_map(
                    self.summaries.percentile_histogram.clone(),
                ),
                percentiles: percentile_table(&self.summaries.percentiles),
                histogram_expiry: OverrideTable::from_map(
                    self.summaries.histogram_expiry.clone(),
                ),
                histogram_buffer_length: OverrideTable::from_map(
                    self.summaries.histogram_buffer_length.clone(),
                ),
                minimum_expected_value: OverrideTable::from_map(
                    self.summaries.minimum_expected_value.clone(),
                ),
                maximum_expected_value: OverrideTable::from_map(
                    self.summaries.maximum_expected_value.clone(),
                ),
                sla: OverrideTable::from_map(self.summaries.sla.clone()),
            },
        })
    }
}

/// Settings consumed by HTTP client/server instrumentation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebConfig {
    pub client: WebClientConfig,
    pub server: WebServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebClientConfig {
    /// Name of the metric for sent requests.
    pub requests_metric_name: String,
    /// Maximum number of distinct URI tag values before further values are
    /// collapsed by the limiting filter.
    pub max_uri_tags: usize,
}

impl Default for WebClientConfig {
    fn default() -> Self {
        Self {
            requests_metric_name: "http.client.requests".to_string(),
            max_uri_tags: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebServerConfig {
    /// Name of the metric for received requests.
    pub requests_metric_name: String,
    /// Whether handled requests are timed automatically. Disable when
    /// per-mapping timings blow up the number of series emitted.
    pub auto_time_requests: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            requests_metric_name: "http.server.requests".to_string(),
            auto_time_requests: true,
        }
    }
}

/// Distribution override maps for timers. See the field docs on
/// [`EffectiveConfig`](crate::resolve::EffectiveConfig) for what each
/// statistic controls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimerDistributions {
    pub percentile_histogram: BTreeMap<String, bool>,
    pub percentiles: BTreeMap<String, Vec<f64>>,
    #[serde(deserialize_with = "de::duration_map")]
    pub histogram_expiry: BTreeMap<String, Duration>,
    pub histogram_buffer_length: BTreeMap<String, usize>,
    #[serde(deserialize_with = "de::duration_map")]
    pub minimum_expected_value: BTreeMap<String, Duration>,
    #[serde(deserialize_with = "de::duration_map")]
    pub maximum_expected_value: BTreeMap<String, Duration>,
    #[serde(deserialize_with = "de::duration_seq_map")]
    pub sla: BTreeMap<String, Vec<Duration>>,
}

/// Distribution override maps for summaries; clamp and SLA values are raw
/// counts of whatever unit the summary records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryDistributions {
    pub percentile_histogram: BTreeMap<String, bool>,
    pub percentiles: BTreeMap<String, Vec<f64>>,
    #[serde(deserialize_with = "de::duration_map")]
    pub histogram_expiry: BTreeMap<String, Duration>,
    pub histogram_buffer_length: BTreeMap<String, usize>,
    pub minimum_expected_value: BTreeMap<String, u64>,
    pub maximum_expected_value: BTreeMap<String, u64>,
    pub sla: BTreeMap<String, Vec<u64>>,
}

fn validate_percentiles(
    scope: &str,
    map: &BTreeMap<String, Vec<f64>>,
) -> Result<(), ValidationError> {
    for (key, percentiles) in map {
        for &percentile in percentiles {
            if !(percentile > 0.0 && percentile <= 1.0) {
                return Err(ValidationError::PercentileOutOfRange {
                    key: format!("{scope}.{key}"),
                    percentile,
                });
            }
        }
    }
    Ok(())
}

fn validate_buffer_lengths(
    map: &BTreeMap<String, usize>,
) -> Result<(), ValidationError> {
    for (key, &length) in map {
        if length == 0 {
            return Err(ValidationError::ZeroBufferLength { key: key.clone() });
        }
    }
    Ok(())
}

/// Percentiles are declared as lists but treated as sets: sort and dedupe so
/// emission order is deterministic. SLA boundaries, by contrast, keep their
/// declaration order.
fn percentile_table(map: &BTreeMap<String, Vec<f64>>) -> OverrideTable<Vec<f64>> {
    OverrideTable::from_map(
        map.iter()
            .map(|(key, percentiles)| {
                let mut percentiles = percentiles.clone();
                percentiles.sort_by(f64::total_cmp);
                percentiles.dedup();
                (key.clone(), percentiles)
            })
            .collect(),
    )
}

mod de {
    //! Humantime-backed deserializers for duration-valued override maps.

    use std::collections::BTreeMap;
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn duration_map<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                humantime::parse_duration(&value)
                    .map(|duration| (key, duration))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }

    pub(super) fn duration_seq_map<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<Duration>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: BTreeMap<String, Vec<String>> = BTreeMap::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, values)| {
                values
                    .iter()
                    .map(|value| {
                        humantime::parse_duration(value).map_err(serde::de::Error::custom)
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(|durations| (key, durations))
            })
            .collect()
    }
}
