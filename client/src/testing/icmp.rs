//! ICMP ping latency

use anyhow::{Context, Result};
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config as PingConfig, PingIdentifier, PingSequence};
use tracing::debug;

pub struct IcmpPinger {
    client: Client,
    timeout: Duration,
}

impl IcmpPinger {
    pub fn new(timeout: Duration) -> Result<Self> {
        let ping_config = PingConfig::default();
        let client = Client::new(&ping_config)
            .context("Failed to create ICMP client (CAP_NET_RAW required)")?;

        Ok(Self { client, timeout })
    }

    /// Best round-trip time over `count` echo requests
    pub async fn best_of(&self, host: &str, count: u32) -> Result<Duration> {
        let target = resolve_hostname(host).await?;
        let mut pinger = self.client.pinger(target, PingIdentifier(rand::random())).await;
        let payload = [0u8; 56]; // Standard ping payload size

        let mut best: Option<Duration> = None;
        for seq in 0..u16::try_from(count).unwrap_or(u16::MAX) {
            match tokio::time::timeout(
                self.timeout,
                pinger.ping(PingSequence(seq), &payload)
            ).await {
                Ok(Ok((_packet, rtt))) => {
                    debug!("ICMP {} seq={} -> {:?}", target, seq, rtt);
                    best = Some(best.map_or(rtt, |b| b.min(rtt)));
                }
                Ok(Err(e)) => debug!("ICMP {} seq={} -> error: {}", target, seq, e),
                Err(_) => debug!("ICMP {} seq={} -> timeout", target, seq),
            }
        }

        best.ok_or_else(|| anyhow::anyhow!("No ICMP reply from {} after {} attempts", target, count))
    }
}

async fn resolve_hostname(hostname: &str) -> Result<IpAddr> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addr = tokio::net::lookup_host((hostname, 0))
        .await
        .with_context(|| format!("Failed to resolve {}", hostname))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("No addresses found for {}", hostname))?;

    Ok(addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let ip = resolve_hostname("192.0.2.1").await.unwrap();
        assert_eq!(ip, "192.0.2.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_ping_localhost() {
        // Needs CAP_NET_RAW; skipped silently otherwise
        if let Ok(pinger) = IcmpPinger::new(Duration::from_secs(1)) {
            if let Ok(rtt) = pinger.best_of("127.0.0.1", 2).await {
                assert!(rtt < Duration::from_secs(1));
            }
        }
    }
}
