//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crypto::{self, CipherMethod};
use crate::tunnel::TunnelSettings;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tunnel server profiles
    #[serde(default)]
    pub profiles: Vec<Profile>,
    /// Connection lifecycle tuning
    #[serde(default)]
    pub tunnel: TunnelSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::Error::Config(format!("Failed to write config: {}", e)))
    }

    /// Find a profile by name
    pub fn find_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            tunnel: TunnelSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// A tunnel server profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Unique profile id
    #[serde(default)]
    pub id: u64,
    /// Human-readable name
    pub name: String,
    /// Server hostname or IP
    pub server: String,
    /// Server port
    pub server_port: u16,
    /// Shared password, fed to the key derivation chain
    pub password: String,
    /// AEAD cipher method
    pub method: CipherMethod,
    /// Creation time (unix millis)
    #[serde(default)]
    pub created_at: Option<u64>,
    /// Last successful connection time (unix millis)
    #[serde(default)]
    pub last_connected_at: Option<u64>,
}

impl Profile {
    /// `host:port` endpoint string
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.server, self.server_port)
    }

    /// Derive this profile's symmetric key from its password
    pub fn derive_key(&self) -> Vec<u8> {
        crypto::derive_key(&self.password, self.method.key_len())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: String,
    /// Log file path (optional)
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Generate example configuration with one placeholder profile
pub fn generate_example_config() -> Config {
    Config {
        profiles: vec![Profile {
            id: 1,
            name: "example".to_string(),
            server: "tunnel.example.com".to_string(),
            server_port: 8388,
            password: "change-me".to_string(),
            method: CipherMethod::Aes256Gcm,
            created_at: None,
            last_connected_at: None,
        }],
        tunnel: TunnelSettings::default(),
        logging: LoggingConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        Profile {
            id: 7,
            name: "home".to_string(),
            server: "10.20.30.40".to_string(),
            server_port: 8388,
            password: "pw".to_string(),
            method: CipherMethod::ChaCha20Poly1305,
            created_at: Some(1_700_000_000_000),
            last_connected_at: None,
        }
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(sample_profile().endpoint(), "10.20.30.40:8388");
    }

    #[test]
    fn test_derive_key_length_matches_method() {
        let profile = sample_profile();
        assert_eq!(profile.derive_key().len(), profile.method.key_len());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config {
            profiles: vec![sample_profile()],
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.profiles.len(), 1);
        assert_eq!(parsed.profiles[0].name, "home");
        assert_eq!(parsed.profiles[0].method, CipherMethod::ChaCha20Poly1305);
    }

    #[test]
    fn test_method_name_in_toml() {
        let text = toml::to_string_pretty(&sample_profile()).unwrap();
        assert!(text.contains("ChaCha20-Poly1305"));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let text = r#"
            [[profiles]]
            name = "bad"
            server = "example.com"
            server_port = 8388
            password = "pw"
            method = "rc4-md5"
        "#;
        assert!(toml::from_str::<Config>(text).is_err());
    }

    #[test]
    fn test_find_profile() {
        let config = Config {
            profiles: vec![sample_profile()],
            ..Config::default()
        };
        assert!(config.find_profile("home").is_some());
        assert!(config.find_profile("work").is_none());
    }
}
