//! # Dispatcher configuration.
//!
//! [`DispatcherConfig`] sets the admission threshold of the invocation queue,
//! the fan-out mode given to newly created groups, and the worker thread name.
//!
//! # Example
//! ```
//! use event_relay::{DispatcherConfig, FanOutMode};
//!
//! let mut cfg = DispatcherConfig::default();
//! cfg.max_capacity = 16;
//! cfg.fan_out = FanOutMode::FirstSuccessWins;
//!
//! assert_eq!(cfg.max_capacity, 16);
//! ```

use crate::group::FanOutMode;

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Queue length at which new invocations are rejected.
    pub max_capacity: usize,
    /// Fan-out mode of groups created by later registrations.
    pub fan_out: FanOutMode,
    /// Name given to the worker thread.
    pub worker_name: String,
}

impl Default for DispatcherConfig {
    /// Provides a default configuration:
    /// - `max_capacity = 100`
    /// - `fan_out = FanOutMode::All`
    /// - `worker_name = "event-relay-worker"`
    fn default() -> Self {
        Self {
            max_capacity: 100,
            fan_out: FanOutMode::All,
            worker_name: "event-relay-worker".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOutMode) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_worker_name(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = worker_name.into();
        self
    }
}
