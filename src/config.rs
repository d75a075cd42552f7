//! Peer configuration.

use crate::net::{DEFAULT_GREETING, RendezvousOptions};
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Lowest port a peer may agree on.
pub const MIN_PORT: u16 = 5000;

/// Where the peer is and how hard to try reaching it.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Host name or IP of the other peer.
    #[serde(default)]
    peer_host: String,

    /// Port both peers agreed on.
    #[serde(default)]
    port: u16,

    /// Local IP to listen on.
    #[serde(default)]
    bind_address: Option<IpAddr>,

    /// Milliseconds to wait for an incoming connection per attempt.
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,

    /// Rendezvous rounds before giving up; unbounded if absent.
    #[serde(default)]
    max_attempts: Option<u32>,

    /// Greeting sent when this peer dials.
    #[serde(default = "default_greeting")]
    greeting: String,
}

#[instrument]
fn default_poll_interval_ms() -> u64 {
    1000
}

#[instrument]
fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

impl PeerConfig {
    /// Creates a configuration with default tuning.
    #[instrument(skip(peer_host), fields(peer_host = %peer_host))]
    pub fn new(peer_host: String, port: u16) -> Self {
        Self {
            peer_host,
            port,
            bind_address: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: None,
            greeting: default_greeting(),
        }
    }

    /// Loads configuration from TOML file.
    ///
    /// The peer endpoint may be left out and supplied later with
    /// [`with_peer`](Self::with_peer); call [`validate`](Self::validate)
    /// once the configuration is complete.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(peer_host = %config.peer_host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Checks the values a peer cannot start with.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer_host.trim().is_empty() {
            return Err(ConfigError::new("Peer host is empty".to_string()));
        }
        if self.port < MIN_PORT {
            return Err(ConfigError::new(format!(
                "Port {} is below the minimum of {}",
                self.port, MIN_PORT
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::new(
                "Poll interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Replaces the peer endpoint.
    pub fn with_peer(mut self, peer_host: String, port: u16) -> Self {
        self.peer_host = peer_host;
        self.port = port;
        self
    }

    /// Replaces the listen address.
    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = Some(bind_address);
        self
    }

    /// Replaces the poll interval.
    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Bounds the number of rendezvous rounds.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Rendezvous tuning derived from this configuration.
    pub fn rendezvous_options(&self) -> RendezvousOptions {
        RendezvousOptions {
            bind_address: self.bind_address,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_attempts,
            greeting: self.greeting.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
