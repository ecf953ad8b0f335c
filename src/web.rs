//! Support for HTTP client/server instrumentation.
//!
//! The instrumentation layer itself lives with the HTTP stack; this module
//! carries the piece that belongs to the metrics side: capping the number of
//! distinct `uri` tag values so a bad route pattern cannot blow up series
//! cardinality. The metric names and the cap come from
//! [`WebConfig`](crate::config::WebConfig).

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashSet;

/// Tag value reported once the distinct-URI cap is hit.
pub const URI_TAG_OVERFLOW: &str = "URI_TAG_LIMIT_EXCEEDED";

/// Caps the number of distinct URI tag values. The first `max_uri_tags`
/// distinct values pass through; anything new after that collapses into
/// [`URI_TAG_OVERFLOW`]. Safe for concurrent use.
pub struct UriTagLimiter {
    max_uri_tags: usize,
    seen: DashSet<String>,
    warned: AtomicBool,
}

impl UriTagLimiter {
    pub fn new(max_uri_tags: usize) -> Self {
        Self {
            max_uri_tags,
            seen: DashSet::new(),
            warned: AtomicBool::new(false),
        }
    }

    /// Map a URI tag value to the value that should actually be tagged.
    pub fn tag_value<'a>(&self, uri: &'a str) -> &'a str {
        if self.seen.contains(uri) {
            return uri;
        }
        if self.seen.len() < self.max_uri_tags {
            self.seen.insert(uri.to_string());
            return uri;
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                message = "reached the maximum number of URI tags, further URIs are collapsed",
                max_uri_tags = self.max_uri_tags
            );
        }
        URI_TAG_OVERFLOW
    }
}
