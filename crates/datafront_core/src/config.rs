//! Registry configuration.

use std::time::Duration;

/// Configuration for a [`DataFront`](crate::DataFront) registry.
#[derive(Debug, Clone)]
pub struct FrontConfig {
    /// Dispatcher scope inbound commands are routed on; also the Comms
    /// scope outbound updates are broadcast under.
    pub scope: String,
    /// Delay between a client's delivery queue becoming non-empty and its
    /// contents being flushed as one message.
    pub debounce: Duration,
    /// How often the action token sweep runs.
    pub sweep_interval: Duration,
}

impl FrontConfig {
    /// Creates a configuration for the given scope.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            debounce: Duration::from_millis(20),
            sweep_interval: Duration::from_secs(120),
        }
    }

    /// Sets the delivery debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the action token sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

impl Default for FrontConfig {
    fn default() -> Self {
        Self::new("data")
    }
}
