//! Configuration types for the negotiation coordinator

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a [`NegotiationCoordinator`](crate::NegotiationCoordinator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Local peer ID (auto-generated if None)
    pub peer_id: Option<String>,

    /// Maximum peers in the mesh (default: 10, max: 16)
    pub max_peers: u32,

    /// Connection capability configuration (STUN/TURN)
    pub connection: ConnectionConfig,

    /// How long a session may stay degraded before a restart is scheduled
    /// (default: 3000ms)
    pub degraded_debounce_ms: u64,

    /// Settle delay before honoring a server-initiated hard restart
    /// (default: 1000ms)
    pub retry_settle_ms: u64,

    /// Bounds for repeated restart attempts
    pub restart: RestartPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            peer_id: None,
            max_peers: 10,
            connection: ConnectionConfig::default(),
            degraded_debounce_ms: 3000,
            retry_settle_ms: 1000,
            restart: RestartPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) when any
    /// field is out of range.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_peers == 0 || self.max_peers > 16 {
            return Err(crate::Error::InvalidConfig(format!(
                "max_peers must be in range 1-16, got {}",
                self.max_peers
            )));
        }

        if let Some(ref id) = self.peer_id {
            if id.is_empty() {
                return Err(crate::Error::InvalidConfig(
                    "peer_id must not be empty".to_string(),
                ));
            }
        }

        self.connection.validate()?;
        self.restart.validate()
    }

    /// Degraded debounce window as a [`Duration`]
    pub fn degraded_debounce(&self) -> Duration {
        Duration::from_millis(self.degraded_debounce_ms)
    }

    /// Retry settle delay as a [`Duration`]
    pub fn retry_settle(&self) -> Duration {
        Duration::from_millis(self.retry_settle_ms)
    }
}

/// Configuration handed to the connection capability when a session is built
///
/// A `hard-restart` signaling message may carry a replacement value that
/// overrides the coordinator-wide default for the rebuilt session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            turn_servers: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    fn validate(&self) -> crate::Result<()> {
        if self.stun_servers.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "at least one STUN server is required".to_string(),
            ));
        }

        for url in &self.stun_servers {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(crate::Error::InvalidConfig(format!(
                    "invalid STUN URL: {}",
                    url
                )));
            }
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(crate::Error::InvalidConfig(format!(
                    "invalid TURN URL: {}",
                    turn.url
                )));
            }
        }

        Ok(())
    }
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Bounds for repeated hard-restart attempts against one peer
///
/// The delay before attempt `n` is `settle + min(initial * multiplier^n, max)`,
/// so restarts back off instead of hammering a peer that keeps failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Maximum restart attempts per session before giving up (default: 5)
    pub max_restarts: u32,

    /// Initial backoff step in milliseconds (default: 100)
    pub backoff_initial_ms: u64,

    /// Maximum backoff step in milliseconds (default: 2000)
    pub backoff_max_ms: u64,

    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            backoff_initial_ms: 100,
            backoff_max_ms: 2000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RestartPolicy {
    /// Backoff step for a given attempt number (0-indexed)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = (self.backoff_initial_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(ms.min(self.backoff_max_ms as f64) as u64)
    }

    /// Check if another attempt is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_restarts
    }

    fn validate(&self) -> crate::Result<()> {
        if self.backoff_multiplier < 1.0 {
            return Err(crate::Error::InvalidConfig(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(crate::Error::InvalidConfig(
                "backoff_max_ms must be >= backoff_initial_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_peers, 10);
        assert_eq!(config.degraded_debounce(), Duration::from_millis(3000));
        assert_eq!(config.retry_settle(), Duration::from_millis(1000));
    }

    #[test]
    fn test_max_peers_range() {
        let mut config = CoordinatorConfig::default();

        config.max_peers = 0;
        assert!(config.validate().is_err());

        config.max_peers = 17;
        assert!(config.validate().is_err());

        config.max_peers = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stun_required() {
        let mut config = CoordinatorConfig::default();
        config.connection.stun_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_turn_url() {
        let mut config = CoordinatorConfig::default();
        config.connection.turn_servers.push(TurnServerConfig {
            url: "http://not-a-turn-server".to_string(),
            username: "user".to_string(),
            credential: "pass".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_restart_backoff_ladder() {
        let policy = RestartPolicy::default();

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        // Clamped to the maximum step
        assert_eq!(policy.backoff(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_restart_retry_bound() {
        let policy = RestartPolicy {
            max_restarts: 2,
            ..Default::default()
        };

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = CoordinatorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CoordinatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_peers, config.max_peers);
        assert_eq!(parsed.connection, config.connection);
    }
}
