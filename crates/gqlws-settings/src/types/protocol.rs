//! Per-connection protocol policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol policy applied to every upgraded connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// Reject `start` until `connection_init` has been acknowledged.
    pub require_connection_init: bool,
    /// Interval between `ka` frames after `connection_ack`; `0` disables them.
    pub keep_alive_interval_ms: u64,
    /// Live operations allowed per connection; `0` means unlimited.
    pub max_operations_per_connection: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            require_connection_init: false,
            keep_alive_interval_ms: 0,
            max_operations_per_connection: 100,
        }
    }
}

impl ProtocolSettings {
    /// Keep-alive interval, if enabled.
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        (self.keep_alive_interval_ms > 0).then(|| Duration::from_millis(self.keep_alive_interval_ms))
    }

    /// Whether one more operation fits next to `live` running ones.
    pub fn admits(&self, live: usize) -> bool {
        self.max_operations_per_connection == 0 || live < self.max_operations_per_connection
    }
}
