use std::time::{Duration, Instant};

use tokio::net::TcpStream;

/// Per-attempt connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a connect-probe run against one target.
#[derive(Debug, Clone, Default)]
pub struct ProbeStats {
    pub rtts_ms: Vec<f64>,
    pub packets_sent: i64,
    pub packets_received: i64,
}

impl ProbeStats {
    pub fn is_alive(&self) -> bool {
        self.packets_received > 0
    }

    pub fn packet_loss(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        (self.packets_sent - self.packets_received) as f64 / self.packets_sent as f64 * 100.0
    }

    pub fn rtt_min(&self) -> f64 {
        if self.rtts_ms.is_empty() {
            return 0.0;
        }
        self.rtts_ms.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn rtt_max(&self) -> f64 {
        self.rtts_ms.iter().copied().fold(0.0, f64::max)
    }

    pub fn rtt_avg(&self) -> f64 {
        if self.rtts_ms.is_empty() {
            return 0.0;
        }
        self.rtts_ms.iter().sum::<f64>() / self.rtts_ms.len() as f64
    }

    /// Mean absolute difference between consecutive round trips.
    pub fn jitter(&self) -> f64 {
        if self.rtts_ms.len() < 2 {
            return 0.0;
        }
        let diffs: f64 = self
            .rtts_ms
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .sum();
        diffs / (self.rtts_ms.len() - 1) as f64
    }
}

/// Measure round-trip latency by repeated TCP connects.
///
/// ICMP needs raw-socket privileges the agent does not assume, so both
/// ping-style modules probe over TCP; the RTT is the connect handshake
/// time. Failed attempts count as sent-but-lost.
pub async fn tcp_probe(host: &str, port: u16, count: i64) -> ProbeStats {
    let target = format!("{host}:{port}");
    let mut stats = ProbeStats::default();

    for _ in 0..count.max(1) {
        stats.packets_sent += 1;
        let begin = Instant::now();
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&target)).await {
            Ok(Ok(_stream)) => {
                stats.packets_received += 1;
                stats.rtts_ms.push(begin.elapsed().as_secs_f64() * 1_000.0);
            }
            Ok(Err(e)) => {
                tracing::debug!(%target, error = %e, "probe connect failed");
            }
            Err(_) => {
                tracing::debug!(%target, "probe connect timed out");
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_and_aggregates() {
        let stats = ProbeStats {
            rtts_ms: vec![10.0, 20.0, 12.0],
            packets_sent: 4,
            packets_received: 3,
        };
        assert!(stats.is_alive());
        assert_eq!(stats.packet_loss(), 25.0);
        assert_eq!(stats.rtt_min(), 10.0);
        assert_eq!(stats.rtt_max(), 20.0);
        assert!((stats.rtt_avg() - 14.0).abs() < 1e-9);
        assert!((stats.jitter() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_are_calm() {
        let stats = ProbeStats::default();
        assert!(!stats.is_alive());
        assert_eq!(stats.packet_loss(), 0.0);
        assert_eq!(stats.rtt_avg(), 0.0);
        assert_eq!(stats.jitter(), 0.0);
    }

    #[tokio::test]
    async fn probe_reaches_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let stats = tcp_probe("127.0.0.1", port, 3).await;
        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.packets_received, 3);
        assert_eq!(stats.rtts_ms.len(), 3);
        assert!(stats.is_alive());
    }

    #[tokio::test]
    async fn probe_counts_refused_connects_as_loss() {
        // Bind-then-drop guarantees a port nothing is listening on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let stats = tcp_probe("127.0.0.1", port, 2).await;
        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.packets_received, 0);
        assert!(!stats.is_alive());
        assert_eq!(stats.packet_loss(), 100.0);
    }
}
