//! Server reachability probing

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Answers "can the tunnel server be reached right now?"
///
/// Used before interface establishment and by the periodic health check.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Return `true` if `host:port` accepts a connection within `timeout`.
    /// Never hangs past the timeout.
    async fn is_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Probe that attempts a real TCP connection
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn is_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new();
        assert!(
            probe
                .is_reachable("127.0.0.1", port, Duration::from_secs(2))
                .await
        );
    }

    #[tokio::test]
    async fn test_refused_connection() {
        // Bind then drop so the port is known-free
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new();
        assert!(
            !probe
                .is_reachable("127.0.0.1", port, Duration::from_secs(2))
                .await
        );
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let probe = TcpProbe::new();
        assert!(
            !probe
                .is_reachable("host.invalid", 8388, Duration::from_secs(2))
                .await
        );
    }
}
