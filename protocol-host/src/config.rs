use std::time::Duration;

/// Open-time parameters for a [`crate::Session`], grouped so callers don't
/// thread four positional arguments through `open` (spec §4.1, §9).
///
/// This is a data-grouping convenience, not a config-file/env-loading layer —
/// that remains out of scope (spec Non-goal: "configuration loading").
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// Plotter firmware model name, used for bootstrap hex lookup.
    pub model: String,
    /// Applied to every write: writing the sync preamble, the header, the
    /// checksummed body, and the `ALL_WRITTEN` marker (spec §4.1: 200 ms).
    pub write_timeout: Duration,
    /// Applied to every read: sync ack, header echo, and response frame
    /// (spec §4.1: 500 ms).
    pub read_timeout: Duration,
    /// How long the host waits after invoking the bootstrapper before
    /// retrying the handshake once (spec §4.1 step 4: "model-dependent grace
    /// period").
    pub bootstrap_grace_period: Duration,
}

impl SessionConfig {
    pub fn new(port_name: impl Into<String>, model: impl Into<String>) -> Self {
        SessionConfig {
            port_name: port_name.into(),
            baud_rate: 115_200,
            model: model.into(),
            write_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(500),
            bootstrap_grace_period: Duration::from_secs(2),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_bootstrap_grace_period(mut self, grace_period: Duration) -> Self {
        self.bootstrap_grace_period = grace_period;
        self
    }
}
