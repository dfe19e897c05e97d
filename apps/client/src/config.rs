use hookrelay_common::constants::{DEFAULT_TUNNEL_ADDRESS, FORWARD_TIMEOUT_SECS};
use std::time::Duration;

use crate::cli::SubscribeArgs;

/// Configuration for one relay session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the relay server (e.g., "wss://tunnel.hookrelay.dev/v1")
    pub tunnel_address: String,

    /// Timeout when calling the local service
    pub request_timeout: Duration,

    /// Stop the session on SIGINT/SIGTERM
    pub handle_signals: bool,
}

impl SessionConfig {
    pub fn new(tunnel_address: impl Into<String>) -> Self {
        Self {
            tunnel_address: tunnel_address.into(),
            request_timeout: Duration::from_secs(FORWARD_TIMEOUT_SECS),
            handle_signals: true,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn from_args(args: &SubscribeArgs) -> Self {
        Self::new(args.credentials.tunnel_address.clone())
            .with_request_timeout(Duration::from_secs(args.request_timeout))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TUNNEL_ADDRESS)
    }
}
