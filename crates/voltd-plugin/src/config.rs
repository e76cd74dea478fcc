//! Runtime configuration resolved from the environment.

use std::time::Duration;

/// Overrides the handshake deadline, in milliseconds.
pub const HANDSHAKE_TIMEOUT_ENV: &str = "VOLTD_PLUGIN_HANDSHAKE_TIMEOUT_MS";

/// Sets a per-dispatch deadline, in milliseconds. Unset means unbounded.
pub const DISPATCH_TIMEOUT_ENV: &str = "VOLTD_PLUGIN_DISPATCH_TIMEOUT_MS";

const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Timeouts governing the plugin lifecycle.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Deadline for the whole handshake exchange.
    pub handshake_timeout: Duration,
    /// Optional deadline for each handler invocation.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            dispatch_timeout: None,
        }
    }
}

impl PluginConfig {
    /// Resolve the configuration from the environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(
                read_millis(HANDSHAKE_TIMEOUT_ENV).unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            ),
            dispatch_timeout: read_millis(DISPATCH_TIMEOUT_ENV).map(Duration::from_millis),
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }
}

fn read_millis(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.parse() {
        Ok(millis) => Some(millis),
        Err(_) => {
            tracing::warn!("Ignoring {var}={raw}: expected milliseconds as an integer");
            None
        }
    }
}
