//! Internet reachability probe.
//!
//! Deliberately independent of the broker connection: a half-dead MQTT
//! session can look connected long after the uplink is gone, so the sync
//! loop asks a known external endpoint instead before each cycle.

use std::time::Duration;
use tokio::net::TcpStream;

/// True if a TCP connection to `addr` succeeds within `timeout`.
pub async fn reachable(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            tracing::debug!(addr, error = %err, "reachability probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(addr, "reachability probe timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reachable_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(reachable(&addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_unreachable_closed_port() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(!reachable(&addr, Duration::from_secs(1)).await);
    }
}
