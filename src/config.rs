// src/config.rs
// Recognized configuration options (spec §6) with their defaults.

use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REPLAY_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FUTURE_SKEW_TOLERANCE: Duration = Duration::from_secs(60);
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Configuration shared by `PhoenixDappClient` and `PhoenixWalletClient`.
#[derive(Debug, Clone)]
pub struct PhoenixConfig {
    pub server_url: String,
    pub reconnect: bool,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub enable_persistence: bool,
    pub request_timeout: Duration,
    pub replay_window: Duration,
    pub future_skew_tolerance: Duration,
    pub session_ttl: Duration,
}

impl PhoenixConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        PhoenixConfig {
            server_url: server_url.into(),
            reconnect: true,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            enable_persistence: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            replay_window: DEFAULT_REPLAY_WINDOW,
            future_skew_tolerance: DEFAULT_FUTURE_SKEW_TOLERANCE,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.enable_persistence = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
