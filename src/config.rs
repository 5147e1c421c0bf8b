use std::time::Duration;

use crate::{DEF_TIMEOUT_SEC, MAX_RETRY_COUNT};

/// Timing and retry settings shared by client and server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bound on every single receive.
    pub timeout: Duration,

    /// Send attempts per datagram, and consecutive receive timeouts per block.
    pub max_retries: u8,

    /// Server read path: re-send a block when the ACK carries another block
    /// number instead of accepting any ACK.
    pub strict_ack: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEF_TIMEOUT_SEC),
            max_retries: MAX_RETRY_COUNT,
            strict_ack: false,
        }
    }
}

impl Config {
    pub fn new(timeout: Duration, max_retries: u8) -> Self {
        Self {
            timeout,
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_strict_ack(mut self, strict_ack: bool) -> Self {
        self.strict_ack = strict_ack;
        self
    }
}
