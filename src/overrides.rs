//! Name-keyed override tables with longest-prefix matching.
//!
//! Configuration keys are meter-name prefixes: the key `"http.server"`
//! applies to every meter under that namespace unless a longer key like
//! `"http.server.requests"` also matches. Tables are built once from a map
//! and never mutated afterwards, so lookups are pure reads.

use std::collections::BTreeMap;

/// An immutable table mapping meter-name prefixes to override values.
///
/// Keys are held sorted. A lookup binary-searches for the insertion point of
/// the meter name and scans backwards; because a key that prefixes `name`
/// always sorts at or before `name`, and longer matching prefixes sort later
/// than shorter ones, the first prefix hit on the way back is the longest.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable<V> {
    entries: Vec<(String, V)>,
}

impl<V> OverrideTable<V> {
    /// Build a table from a key/value map. The map guarantees key
    /// uniqueness, so ties between equal-length keys cannot occur.
    pub fn from_map(map: BTreeMap<String, V>) -> Self {
        // BTreeMap iteration is already sorted by key.
        Self {
            entries: map.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the value for the longest key that is a prefix of `name`, or
    /// `None` when no key matches.
    pub fn get(&self, name: &str) -> Option<&V> {
        let idx = self
            .entries
            .partition_point(|(key, _)| key.as_str() <= name);
        self.entries[..idx]
            .iter()
            .rev()
            .find(|(key, _)| name.starts_with(key.as_str()))
            .map(|(_, value)| value)
    }

    /// Like [`get`](Self::get), but falls back to `default` on no match.
    pub fn get_or(&self, name: &str, default: V) -> V
    where
        V: Clone,
    {
        self.get(name).cloned().unwrap_or(default)
    }
}
