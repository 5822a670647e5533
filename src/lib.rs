//! # Veil Tunnel
//!
//! Client-side core of a password-authenticated secure tunnel:
//! key derivation, AEAD payload encryption, and the lifecycle of a
//! single logical tunnel session with auto-reconnect and live statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Connection Manager                   │
//! │  (connect / disconnect, health checks, reconnect)    │
//! ├──────────────────────────┬──────────────────────────┤
//! │      Cipher Sessions     │  Statistics Aggregator    │
//! │  (per-connection AEAD    │  (sliding-window speeds,  │
//! │   streams, inline nonce) │   latency, totals)        │
//! ├──────────────────────────┴──────────────────────────┤
//! │              External Collaborators                  │
//! │  (virtual interface, reachability probe, storage)    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The operating-system virtual interface, persistent storage and all
//! presentation logic stay behind trait boundaries ([`net::InterfaceProvider`],
//! [`net::ReachabilityProbe`], [`store::TunnelStore`]); the core only
//! orchestrates them.

pub mod config;
pub mod crypto;
pub mod net;
pub mod stats;
pub mod store;
pub mod tunnel;

pub use config::{Config, Profile};
pub use crypto::CipherMethod;
pub use tunnel::{ConnectionState, ConnectionStatus, TunnelManager, TunnelSettings};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] tunnel::TunnelError),

    #[error("Interface error: {0}")]
    Interface(#[from] net::InterfaceError),

    #[error("Storage error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}
