use std::time::Duration;

/// Largest accepted payload, for a single frame and for a reassembled message.
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 16 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Websocket client configuration.
///
/// ```
/// use framelink::ws::config::Config;
///
/// let config = Config::default()
///     .with_max_payload_length(1024 * 1024)
///     .with_keepalive_interval(None)
///     .with_mtu(4096);
/// assert_eq!(None, config.keepalive_interval());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    max_payload_length: usize,
    timeout: Option<Duration>,
    keepalive_interval: Option<Duration>,
    mtu: Option<usize>,
    mask_frames: bool,
    user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
            timeout: Some(DEFAULT_TIMEOUT),
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            mtu: None,
            mask_frames: true,
            user_agent: format!("framelink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    pub fn with_max_payload_length(self, max_payload_length: usize) -> Self {
        Self {
            max_payload_length,
            ..self
        }
    }

    /// Bounds the connect and every blocking socket read or write. A read that times out fails
    /// the connection, so the timeout should exceed the keepalive interval. `None` blocks
    /// indefinitely and only [`close`](crate::ws::WebsocketClient::close) interrupts the reader.
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// Interval between keepalive pings, `None` disables the keepalive worker.
    pub fn with_keepalive_interval(self, keepalive_interval: Option<Duration>) -> Self {
        Self {
            keepalive_interval,
            ..self
        }
    }

    /// Overrides the mtu guessed from the peer address.
    pub fn with_mtu(self, mtu: usize) -> Self {
        Self { mtu: Some(mtu), ..self }
    }

    /// Sends frames without the mask bit. Only for servers that accept unmasked client frames.
    pub fn with_unmasked_frames(self) -> Self {
        Self {
            mask_frames: false,
            ..self
        }
    }

    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..self
        }
    }

    pub const fn max_payload_length(&self) -> usize {
        self.max_payload_length
    }

    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub const fn keepalive_interval(&self) -> Option<Duration> {
        self.keepalive_interval
    }

    pub const fn mtu(&self) -> Option<usize> {
        self.mtu
    }

    pub const fn mask_frames(&self) -> bool {
        self.mask_frames
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_defaults() {
        let config = Config::default();
        assert_eq!(16 * 1024 * 1024, config.max_payload_length());
        assert_eq!(Some(Duration::from_secs(15)), config.timeout());
        assert_eq!(Some(Duration::from_secs(10)), config.keepalive_interval());
        assert_eq!(None, config.mtu());
        assert!(config.mask_frames());
        assert!(config.user_agent().starts_with("framelink/"));
    }

    #[test]
    fn should_override_values() {
        let config = Config::default()
            .with_max_payload_length(10)
            .with_timeout(None)
            .with_keepalive_interval(Some(Duration::from_millis(50)))
            .with_mtu(512)
            .with_unmasked_frames()
            .with_user_agent("agent/1.0");
        assert_eq!(10, config.max_payload_length());
        assert_eq!(None, config.timeout());
        assert_eq!(Some(Duration::from_millis(50)), config.keepalive_interval());
        assert_eq!(Some(512), config.mtu());
        assert!(!config.mask_frames());
        assert_eq!("agent/1.0", config.user_agent());
    }
}
