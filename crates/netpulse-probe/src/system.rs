//! ICMP probing via the system `ping(8)` binary.

use async_trait::async_trait;
use netpulse_core::ports::{ProbeEngine, ProbeOutcome};
use tokio::process::Command;
use tokio::time::{sleep, timeout, Duration};
use tracing::debug;

/// Probes by spawning one `ping -c 1` per attempt and parsing the RTT.
///
/// Needs no raw-socket privileges; the setuid ping binary does the ICMP.
pub struct SystemPingEngine {
    binary: String,
}

impl SystemPingEngine {
    pub fn new() -> Self {
        Self {
            binary: "ping".to_string(),
        }
    }

    /// Use a non-default ping binary.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn ping_once(&self, ip: &str, timeout_ms: u32) -> Result<Option<u64>, String> {
        // ping -W takes whole seconds; round up and keep a hard deadline
        // ourselves so one attempt never overruns timeout_ms by much.
        let wait_secs = timeout_ms.div_ceil(1000).max(1);
        let deadline = Duration::from_millis(u64::from(timeout_ms) + 500);

        let output = timeout(
            deadline,
            Command::new(&self.binary)
                .arg("-n")
                .arg("-c")
                .arg("1")
                .arg("-W")
                .arg(wait_secs.to_string())
                .arg(ip)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Err(_) => Ok(None), // deadline elapsed
            Ok(Err(e)) => Err(format!("Failed to spawn {}: {}", self.binary, e)),
            Ok(Ok(out)) if out.status.success() => {
                Ok(parse_rtt_ms(&String::from_utf8_lossy(&out.stdout)))
            }
            Ok(Ok(_)) => Ok(None), // no reply within -W
        }
    }
}

impl Default for SystemPingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeEngine for SystemPingEngine {
    async fn probe(&self, ip: &str, timeout_ms: u32, retries: u32) -> ProbeOutcome {
        let attempts = retries.saturating_add(1);
        let mut last_error = "timeout".to_string();

        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(Duration::from_millis(u64::from(timeout_ms))).await;
            }
            match self.ping_once(ip, timeout_ms).await {
                Ok(Some(latency_ms)) => return ProbeOutcome::up(ip, latency_ms),
                Ok(None) => {
                    last_error = "timeout".to_string();
                }
                Err(e) => {
                    debug!(ip, error = %e, "Ping attempt failed");
                    last_error = e;
                }
            }
        }
        ProbeOutcome::down(ip, last_error)
    }
}

/// Extract the round-trip time from ping output, rounded to whole ms.
fn parse_rtt_ms(stdout: &str) -> Option<u64> {
    let rest = &stdout[stdout.find("time=")? + "time=".len()..];
    let value: &str = rest
        .split(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default();
    value.parse::<f64>().ok().map(|ms| ms.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_ping_output() {
        let stdout = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
                      64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=12.4 ms\n";
        assert_eq!(parse_rtt_ms(stdout), Some(12));
    }

    #[test]
    fn parses_sub_millisecond_rtt() {
        let stdout = "64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=0.041 ms\n";
        assert_eq!(parse_rtt_ms(stdout), Some(0));
    }

    #[test]
    fn missing_rtt_yields_none() {
        assert_eq!(parse_rtt_ms("Request timeout for icmp_seq 0\n"), None);
        assert_eq!(parse_rtt_ms(""), None);
    }

    #[tokio::test]
    async fn missing_binary_is_reported_as_down() {
        let engine = SystemPingEngine::with_binary("netpulse-no-such-ping");
        let outcome = engine.probe("127.0.0.1", 200, 0).await;
        assert!(!outcome.reachable);
        assert!(outcome.error.is_some());
    }
}
