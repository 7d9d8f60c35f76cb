use std::time::Duration;

/// Object server configuration.
///
/// Controls nested-call timeouts, the reactor's timeout sweep and shutdown
/// draining.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Timeout applied to nested calls that do not set their own, in milliseconds.
    pub nested_call_timeout_ms: u64,
    /// How often the reactor checks parked calls for expired nested calls.
    pub timeout_sweep_interval_ms: u64,
    /// How long a draining server keeps driving suspended calls before
    /// failing them.
    pub drain_timeout_ms: u64,
}

impl ServerConfig {
    #[must_use]
    pub fn nested_call_timeout(&self) -> Duration {
        Duration::from_millis(self.nested_call_timeout_ms)
    }

    #[must_use]
    pub fn timeout_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_sweep_interval_ms.max(1))
    }

    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            nested_call_timeout_ms: 25_000,
            timeout_sweep_interval_ms: 50,
            drain_timeout_ms: 5_000,
        }
    }
}
