//! Engine timing and bounds configuration

use std::time::Duration;

/// Fixed engine configuration, set at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Consecutive failed opens tolerated before giving up
    pub max_reconnect_attempts: u32,

    /// First reconnect delay; doubles every attempt
    pub reconnect_base_delay: Duration,

    /// Ceiling for the reconnect delay
    pub reconnect_max_delay: Duration,

    /// Channel silence longer than this forces a reconnect
    pub heartbeat_staleness: Duration,

    /// Cadence of the staleness check
    pub heartbeat_check_interval: Duration,

    /// How long an action may stay pending before it times out
    pub action_timeout: Duration,

    /// Resolved action ids remembered for duplicate suppression
    pub completed_window: usize,

    /// Close code used when the heartbeat monitor drops the channel
    pub heartbeat_close_code: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 10,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(10),
            heartbeat_staleness: Duration::from_secs(15),
            heartbeat_check_interval: Duration::from_secs(1),
            action_timeout: Duration::from_secs(8),
            completed_window: 500,
            heartbeat_close_code: 4000,
        }
    }
}

impl EngineConfig {
    /// Reason attached to a heartbeat-triggered close.
    pub const HEARTBEAT_CLOSE_REASON: &'static str = "Heartbeat timeout";

    /// Backoff delay before reconnect `attempt` (1-based):
    /// `min(base · 2^(attempt−1), max)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let doubled = self.reconnect_base_delay.saturating_mul(1u32 << exponent);
        doubled.min(self.reconnect_max_delay)
    }
}
