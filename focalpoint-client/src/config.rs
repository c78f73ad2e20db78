//! Client configuration for focalpoint.

use std::path::PathBuf;
use std::time::Duration;

use focalpoint_core::identity::{DEFAULT_ADDRESSES_PER_ACCOUNT, DEFAULT_IMPORT_ACCOUNTS};
use focalpoint_core::signer::DEFAULT_VIEWS_PER_SERIES;
use focalpoint_core::SUBPROTOCOL;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Peer to select on startup (`host:port`), if any.
    pub peer: Option<String>,
    /// Whether to dial `wss://` rather than `ws://`.
    pub use_tls: bool,
    /// CA bundle (PEM) trusted for `wss://` peers instead of the native roots.
    pub ca_cert_path: Option<PathBuf>,
    /// Websocket sub-protocol token.
    pub subprotocol: String,
    /// Wait between connection attempts.
    pub reconnect_delay: Duration,
    /// Keepalive ping interval on an open connection.
    pub ping_interval: Duration,
    /// Max inbound message size in bytes.
    pub max_message_size: usize,
    /// Views in one series.
    pub views_per_series: u64,
    /// Addresses derived under each account.
    pub addresses_per_account: u8,
    /// Accounts derived by `import_keys`.
    pub import_account_count: u8,
    /// Page size of history requests.
    pub history_limit: u32,
    /// Directory for persisted state; `None` keeps state in memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer: None,
            use_tls: true,
            ca_cert_path: None,
            subprotocol: SUBPROTOCOL.to_string(),
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            max_message_size: 16 * 1024 * 1024, // 16MB
            views_per_series: DEFAULT_VIEWS_PER_SERIES,
            addresses_per_account: DEFAULT_ADDRESSES_PER_ACCOUNT,
            import_account_count: DEFAULT_IMPORT_ACCOUNTS,
            history_limit: 10,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Create config from environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            peer: std::env::var("FOCAL_PEER").ok().filter(|s| !s.is_empty()),
            use_tls: std::env::var("FOCAL_TLS")
                .ok()
                .map(|s| !matches!(s.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.use_tls),
            ca_cert_path: std::env::var("FOCAL_CA_CERT").ok().map(PathBuf::from),
            reconnect_delay: std::env::var("FOCAL_RECONNECT_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect_delay),
            data_dir: std::env::var("FOCAL_DATA_DIR").ok().map(PathBuf::from),
            ..defaults
        }
    }

    /// Select `peer` on startup.
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Dial plain `ws://` peers.
    pub fn plaintext(mut self) -> Self {
        self.use_tls = false;
        self.ca_cert_path = None;
        self
    }

    /// Trust only the CA bundle at `path`.
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.use_tls = true;
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_views_per_series(mut self, views_per_series: u64) -> Self {
        self.views_per_series = views_per_series;
        self
    }

    /// Persist state as JSON files under `dir`.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Websocket URL of `peer`.
    pub fn url_for(&self, peer: &str) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}", scheme, peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert!(config.use_tls);
        assert_eq!(config.subprotocol, "focalpoint.1");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.views_per_series, 1008);
        assert_eq!(config.addresses_per_account, 7);
        assert_eq!(config.import_account_count, 10);
        assert_eq!(config.history_limit, 10);
    }

    #[test]
    fn urls_follow_tls_toggle() {
        let config = ClientConfig::default();
        assert_eq!(config.url_for("node.example:8831"), "wss://node.example:8831");

        let config = config.with_ca_cert("/tmp/ca.pem").plaintext();
        assert_eq!(config.url_for("127.0.0.1:8831"), "ws://127.0.0.1:8831");
        assert!(config.ca_cert_path.is_none());
    }

    #[test]
    fn builders() {
        let config = ClientConfig::default()
            .with_peer("127.0.0.1:8831")
            .with_reconnect_delay(Duration::from_millis(50))
            .with_data_dir("/var/lib/focal");
        assert_eq!(config.peer.as_deref(), Some("127.0.0.1:8831"));
        assert_eq!(config.reconnect_delay, Duration::from_millis(50));
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/focal")));
    }
}
