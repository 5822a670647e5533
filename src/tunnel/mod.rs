//! Tunnel connection lifecycle
//!
//! [`TunnelManager`] owns the state machine; this module defines the
//! observable status model, the lifecycle error type and the tuning
//! knobs.

mod manager;

pub use manager::TunnelManager;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoError;

/// Lifecycle errors
#[derive(Debug, Clone, Error)]
pub enum TunnelError {
    /// The server did not answer the reachability probe
    #[error("server {host}:{port} unreachable")]
    UnreachableHost { host: String, port: u16 },

    /// The platform refused to establish the virtual interface
    #[error("interface establishment failed: {0}")]
    InterfaceEstablishment(String),

    /// The traffic counter source failed mid-session
    #[error("traffic source failed: {0}")]
    TrafficSource(String),

    /// A cipher operation was requested without an active connection
    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl TunnelError {
    /// Whether the reconnect policy applies to this failure.
    ///
    /// Interface-establishment refusals are permission problems and do
    /// not heal by retrying; reachability and mid-session failures do.
    pub fn retryable(&self) -> bool {
        match self {
            TunnelError::UnreachableHost { .. } | TunnelError::TrafficSource(_) => true,
            TunnelError::Crypto(CryptoError::AuthenticationFailure) => true,
            TunnelError::InterfaceEstablishment(_)
            | TunnelError::NotConnected
            | TunnelError::Crypto(_) => false,
        }
    }
}

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

/// Observable connection status: the state plus its context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Profile involved, absent for `Disconnected`
    pub profile_name: Option<String>,
    /// When the session reached `Connected` (unix millis)
    pub connected_at: Option<u64>,
    /// Failure description, only for `Error`
    pub message: Option<String>,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            profile_name: None,
            connected_at: None,
            message: None,
        }
    }

    pub fn connecting(profile_name: &str) -> Self {
        Self {
            state: ConnectionState::Connecting,
            profile_name: Some(profile_name.to_string()),
            connected_at: None,
            message: None,
        }
    }

    pub fn connected(profile_name: &str) -> Self {
        Self {
            state: ConnectionState::Connected,
            profile_name: Some(profile_name.to_string()),
            connected_at: Some(crate::stats::now_millis()),
            message: None,
        }
    }

    pub fn disconnecting(profile_name: &str) -> Self {
        Self {
            state: ConnectionState::Disconnecting,
            profile_name: Some(profile_name.to_string()),
            connected_at: None,
            message: None,
        }
    }

    pub fn error(profile_name: &str, error: &TunnelError) -> Self {
        Self {
            state: ConnectionState::Error,
            profile_name: Some(profile_name.to_string()),
            connected_at: None,
            message: Some(error.to_string()),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// Connection lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSettings {
    /// Reachability probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Flat delay between reconnect attempts in seconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Interval between health-check probes in seconds
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
    /// Reconnect attempts allowed per connect cycle
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,
    /// Statistics tick interval in milliseconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,
    /// Speed measurement window in milliseconds
    #[serde(default = "default_speed_window")]
    pub speed_window_ms: u64,
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_health_interval() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_stats_interval() -> u64 {
    1000
}

fn default_speed_window() -> u64 {
    5000
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            health_check_interval_secs: default_health_interval(),
            max_reconnect_attempts: default_max_attempts(),
            stats_interval_ms: default_stats_interval(),
            speed_window_ms: default_speed_window(),
        }
    }
}

impl TunnelSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn speed_window(&self) -> Duration {
        Duration::from_millis(self.speed_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = TunnelSettings::default();
        assert_eq!(settings.probe_timeout(), Duration::from_secs(10));
        assert_eq!(settings.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(settings.health_check_interval(), Duration::from_secs(30));
        assert_eq!(settings.max_reconnect_attempts, 5);
        assert_eq!(settings.stats_interval(), Duration::from_millis(1000));
        assert_eq!(settings.speed_window(), Duration::from_millis(5000));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: TunnelSettings =
            toml::from_str("max_reconnect_attempts = 3").unwrap();
        assert_eq!(settings.max_reconnect_attempts, 3);
        assert_eq!(settings.reconnect_delay_secs, 5);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TunnelError::UnreachableHost {
            host: "h".to_string(),
            port: 1
        }
        .retryable());
        assert!(TunnelError::TrafficSource("closed".to_string()).retryable());
        assert!(TunnelError::Crypto(CryptoError::AuthenticationFailure).retryable());
        assert!(!TunnelError::InterfaceEstablishment("denied".to_string()).retryable());
        assert!(!TunnelError::NotConnected.retryable());
    }

    #[test]
    fn test_status_constructors() {
        let status = ConnectionStatus::error(
            "home",
            &TunnelError::UnreachableHost {
                host: "example.com".to_string(),
                port: 8388,
            },
        );
        assert_eq!(status.state, ConnectionState::Error);
        assert_eq!(status.profile_name.as_deref(), Some("home"));
        assert!(status.message.unwrap().contains("unreachable"));

        assert_eq!(
            ConnectionStatus::default().state,
            ConnectionState::Disconnected
        );
        assert!(ConnectionStatus::connected("home").connected_at.is_some());
        assert!(ConnectionStatus::connecting("home").connected_at.is_none());
    }
}
