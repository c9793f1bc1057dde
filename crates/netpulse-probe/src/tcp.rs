//! Reachability probing via TCP connect.

use async_trait::async_trait;
use netpulse_core::ports::{ProbeEngine, ProbeOutcome};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};

/// Fallback engine: a completed TCP handshake against a fixed port counts
/// as reachable, with RTT measured as connect latency.
pub struct TcpConnectEngine {
    port: u16,
}

impl TcpConnectEngine {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    async fn connect_once(&self, ip: &str, timeout_ms: u32) -> ProbeOutcome {
        let addr: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => return ProbeOutcome::down(ip, format!("Invalid address: {ip}")),
        };
        let target = SocketAddr::new(addr, self.port);
        let deadline = Duration::from_millis(u64::from(timeout_ms));

        let start = Instant::now();
        match timeout(deadline, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => ProbeOutcome::up(ip, start.elapsed().as_millis() as u64),
            Ok(Err(e)) => ProbeOutcome::down(ip, e.to_string()),
            Err(_) => ProbeOutcome::down(ip, "timeout"),
        }
    }
}

#[async_trait]
impl ProbeEngine for TcpConnectEngine {
    async fn probe(&self, ip: &str, timeout_ms: u32, retries: u32) -> ProbeOutcome {
        let attempts = retries.saturating_add(1);
        let mut last = ProbeOutcome::down(ip, "timeout");

        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(Duration::from_millis(u64::from(timeout_ms))).await;
            }
            last = self.connect_once(ip, timeout_ms).await;
            if last.reachable {
                return last;
            }
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let engine = TcpConnectEngine::new(port);
        let outcome = engine.probe("127.0.0.1", 1000, 0).await;

        assert!(outcome.reachable);
        assert!(outcome.latency_ms.is_some());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn closed_port_is_down_with_error() {
        // Bind then drop to find a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let engine = TcpConnectEngine::new(port);
        let outcome = engine.probe("127.0.0.1", 500, 0).await;

        assert!(!outcome.reachable);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn unroutable_host_is_down() {
        // TEST-NET-1, guaranteed unassigned.
        let engine = TcpConnectEngine::new(80);
        let outcome = engine.probe("192.0.2.1", 100, 0).await;
        assert!(!outcome.reachable);
    }

    #[tokio::test]
    async fn bad_address_is_down_not_a_panic() {
        let engine = TcpConnectEngine::new(80);
        let outcome = engine.probe("not-an-ip", 100, 0).await;
        assert!(!outcome.reachable);
    }
}
