//! Service configuration.

use std::time::Duration;

/// Configuration for the in-process backend.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Capacity of the realtime notice channel. Slow subscribers that fall
    /// further behind see one collapsed notice.
    pub feed_capacity: usize,
    /// Simulated round-trip latency added to every call.
    pub latency: Duration,
}

impl ServiceConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            feed_capacity: 256,
            latency: Duration::ZERO,
        }
    }

    /// Sets the notice channel capacity.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity.max(1);
        self
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}
