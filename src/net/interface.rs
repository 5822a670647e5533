//! Virtual network interface abstraction

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::Profile;
use crate::stats::TrafficSample;

use super::InterfaceError;

/// A route installed on the virtual interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network address
    pub destination: String,
    /// Prefix length
    pub prefix_len: u8,
    /// Whether traffic for this route goes through the tunnel
    pub via_tunnel: bool,
}

impl Route {
    pub fn tunneled(destination: &str, prefix_len: u8) -> Self {
        Self {
            destination: destination.to_string(),
            prefix_len,
            via_tunnel: true,
        }
    }

    pub fn bypass(destination: &str, prefix_len: u8) -> Self {
        Self {
            destination: destination.to_string(),
            prefix_len,
            via_tunnel: false,
        }
    }
}

/// Plan for establishing a virtual interface
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    /// Interface address
    pub address: String,
    /// Address prefix length
    pub prefix_len: u8,
    /// Maximum transmission unit
    pub mtu: u16,
    /// DNS resolvers pushed to the interface
    pub dns_servers: Vec<String>,
    /// Routing table: default route via tunnel, private ranges bypassed
    pub routes: Vec<Route>,
    /// Session name shown by the platform
    pub session_name: String,
}

impl InterfaceConfig {
    /// Standard interface plan for a profile: all traffic tunneled
    /// except the RFC 1918 private ranges.
    pub fn for_profile(profile: &Profile) -> Self {
        Self {
            address: "10.0.0.2".to_string(),
            prefix_len: 24,
            mtu: 1500,
            dns_servers: vec![
                "1.1.1.1".to_string(),
                "8.8.8.8".to_string(),
                "208.67.222.222".to_string(),
            ],
            routes: vec![
                Route::tunneled("0.0.0.0", 0),
                Route::bypass("10.0.0.0", 8),
                Route::bypass("172.16.0.0", 12),
                Route::bypass("192.168.0.0", 16),
            ],
            session_name: profile.name.clone(),
        }
    }
}

/// Establishes virtual interfaces on behalf of the connection manager
#[async_trait]
pub trait InterfaceProvider: Send + Sync {
    /// Establish an interface according to `config`. Returns a handle for
    /// traffic and counter access, or [`InterfaceError::Denied`] when the
    /// platform refuses.
    async fn establish(
        &self,
        config: &InterfaceConfig,
    ) -> Result<Arc<dyn InterfaceHandle>, InterfaceError>;
}

/// A live virtual interface
#[async_trait]
pub trait InterfaceHandle: Send + Sync {
    /// Read the cumulative traffic counters. Fails with
    /// [`InterfaceError::Closed`] after [`close`](Self::close).
    async fn sample(&self) -> Result<TrafficSample, InterfaceError>;

    /// Tear the interface down. Idempotent.
    async fn close(&self);
}

/// In-process interface provider used by the bundled client and tests.
///
/// Handles count the bytes explicitly recorded through them instead of
/// moving real packets, which makes the statistics path fully
/// deterministic.
#[derive(Default)]
pub struct LoopbackInterface {
    handles: Mutex<Vec<Arc<LoopbackHandle>>>,
}

impl LoopbackInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles established so far, in order
    pub async fn handles(&self) -> Vec<Arc<LoopbackHandle>> {
        self.handles.lock().await.clone()
    }

    /// Number of handles still open
    pub async fn open_count(&self) -> usize {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_closed())
            .count()
    }
}

#[async_trait]
impl InterfaceProvider for LoopbackInterface {
    async fn establish(
        &self,
        config: &InterfaceConfig,
    ) -> Result<Arc<dyn InterfaceHandle>, InterfaceError> {
        let handle = Arc::new(LoopbackHandle::new(config.clone()));
        self.handles.lock().await.push(handle.clone());
        Ok(handle)
    }
}

/// Handle produced by [`LoopbackInterface`]
pub struct LoopbackHandle {
    config: InterfaceConfig,
    uploaded: AtomicU64,
    downloaded: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    latency_ms: AtomicU64,
    closed: AtomicBool,
}

impl LoopbackHandle {
    fn new(config: InterfaceConfig) -> Self {
        Self {
            config,
            uploaded: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            latency_ms: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The plan this handle was established with
    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    /// Account one outbound packet of `bytes` bytes
    pub fn record_upload(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Account one inbound packet of `bytes` bytes
    pub fn record_download(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the most recent path latency
    pub fn set_latency(&self, millis: u64) {
        self.latency_ms.store(millis, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InterfaceHandle for LoopbackHandle {
    async fn sample(&self) -> Result<TrafficSample, InterfaceError> {
        if self.is_closed() {
            return Err(InterfaceError::Closed);
        }
        Ok(TrafficSample {
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            latency_ms: self.latency_ms.load(Ordering::Relaxed),
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherMethod;

    fn profile() -> Profile {
        Profile {
            id: 1,
            name: "test".to_string(),
            server: "example.com".to_string(),
            server_port: 8388,
            password: "pw".to_string(),
            method: CipherMethod::Aes256Gcm,
            created_at: None,
            last_connected_at: None,
        }
    }

    #[test]
    fn test_interface_plan() {
        let config = InterfaceConfig::for_profile(&profile());
        assert_eq!(config.address, "10.0.0.2");
        assert_eq!(config.mtu, 1500);
        assert_eq!(config.dns_servers.len(), 3);
        assert_eq!(config.routes[0], Route::tunneled("0.0.0.0", 0));
        assert!(config.routes[1..].iter().all(|r| !r.via_tunnel));
        assert_eq!(config.session_name, "test");
    }

    #[tokio::test]
    async fn test_loopback_counters() {
        let provider = LoopbackInterface::new();
        let handle = provider
            .establish(&InterfaceConfig::for_profile(&profile()))
            .await
            .unwrap();

        let handles = provider.handles().await;
        handles[0].record_upload(1000);
        handles[0].record_upload(500);
        handles[0].record_download(4000);
        handles[0].set_latency(42);

        let sample = handle.sample().await.unwrap();
        assert_eq!(sample.uploaded, 1500);
        assert_eq!(sample.downloaded, 4000);
        assert_eq!(sample.packets_sent, 2);
        assert_eq!(sample.packets_received, 1);
        assert_eq!(sample.latency_ms, 42);
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_sampling() {
        let provider = LoopbackInterface::new();
        let handle = provider
            .establish(&InterfaceConfig::for_profile(&profile()))
            .await
            .unwrap();
        assert_eq!(provider.open_count().await, 1);

        handle.close().await;
        handle.close().await;
        assert_eq!(provider.open_count().await, 0);
        assert!(matches!(
            handle.sample().await,
            Err(InterfaceError::Closed)
        ));
    }
}
