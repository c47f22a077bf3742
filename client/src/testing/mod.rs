//! Network testing implementation
//!
//! [`HttpProvider`] measures against the public speedtest.net server pool:
//! the listing comes from the servers API, latency from `latency.txt` (or
//! ICMP), throughput from timed image downloads and uploads to the server's
//! upload endpoint.

mod icmp;
mod servers;
mod transfer;

use crate::config::{LatencyMethod, ProviderConfig};
use crate::network::IpApiClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use icmp::IcmpPinger;
use servers::{base_url, host_without_port, ServerEntry};
use speedlog_core::{
    MeasurementProvider, NetworkIdentity, ProviderError, ServerCandidate, TransferRate,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use transfer::{request_error, TransferBudget};

pub struct HttpProvider {
    config: ProviderConfig,
    client: reqwest::Client,
    geo: Arc<IpApiClient>,
    icmp: Option<IcmpPinger>,
    /// Coordinates from the last identity lookup, for distance fallback
    origin: Mutex<Option<(f64, f64)>>,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig, geo: Arc<IpApiClient>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(request_timeout)
            .build()
            .context("Failed to build measurement HTTP client")?;

        let icmp = match config.latency_method {
            LatencyMethod::Icmp => Some(IcmpPinger::new(request_timeout)?),
            LatencyMethod::Http => None,
        };

        Ok(Self {
            config: config.clone(),
            client,
            geo,
            icmp,
            origin: Mutex::new(None),
        })
    }

    fn budget(&self) -> TransferBudget {
        TransferBudget {
            max_bytes: self.config.max_transfer_bytes,
            max_duration: Duration::from_secs(self.config.transfer_budget_secs),
        }
    }

    fn origin(&self) -> Option<(f64, f64)> {
        self.origin.lock().ok().and_then(|guard| *guard)
    }

    async fn http_ping(&self, server: &ServerCandidate) -> Result<Duration, ProviderError> {
        let url = format!("{}latency.txt", base_url(&server.url));
        let mut best: Option<Duration> = None;

        for attempt in 0..self.config.ping_count {
            let start = Instant::now();
            let result = self
                .client
                .get(&url)
                .query(&[("x", attempt)])
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(response) => {
                    // Body is tiny; read it so the timing covers the full reply
                    let _ = response.bytes().await;
                    let rtt = start.elapsed();
                    best = Some(best.map_or(rtt, |b| b.min(rtt)));
                }
                Err(e) => debug!("HTTP ping {} attempt {} failed: {}", url, attempt, e),
            }
        }

        best.ok_or_else(|| ProviderError::Request(format!("no reply from {}", url)))
    }
}

#[async_trait]
impl MeasurementProvider for HttpProvider {
    async fn network_identity(&self) -> Result<NetworkIdentity, ProviderError> {
        let identity = self
            .geo
            .identity()
            .await
            .map_err(|e| ProviderError::Request(format!("{:#}", e)))?;

        if let Ok(mut origin) = self.origin.lock() {
            *origin = identity.lat.zip(identity.lon);
        }
        Ok(identity)
    }

    async fn fetch_servers(&self) -> Result<Vec<ServerCandidate>, ProviderError> {
        let entries: Vec<ServerEntry> = self
            .client
            .get(&self.config.servers_url)
            .query(&[("limit", self.config.server_list_limit)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let origin = self.origin();
        Ok(entries.into_iter().map(|e| e.into_candidate(origin)).collect())
    }

    async fn rank_servers(
        &self,
        candidates: Vec<ServerCandidate>,
    ) -> Result<Vec<ServerCandidate>, ProviderError> {
        let mut ranked: Vec<ServerCandidate> = candidates
            .into_iter()
            .filter(|s| !s.url.is_empty())
            .collect();
        ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(ranked)
    }

    async fn ping(&self, server: &ServerCandidate) -> Result<Duration, ProviderError> {
        match &self.icmp {
            Some(pinger) => {
                let host = if server.host.is_empty() {
                    reqwest::Url::parse(&server.url)
                        .ok()
                        .and_then(|u| u.host_str().map(str::to_string))
                        .unwrap_or_default()
                } else {
                    host_without_port(&server.host).to_string()
                };
                pinger
                    .best_of(&host, self.config.ping_count)
                    .await
                    .map_err(|e| ProviderError::Request(format!("{:#}", e)))
            }
            None => self.http_ping(server).await,
        }
    }

    async fn download(&self, server: &ServerCandidate) -> Result<TransferRate, ProviderError> {
        let base = base_url(&server.url);
        let urls: Vec<String> = self
            .config
            .download_sizes
            .iter()
            .map(|size| format!("{}random{}x{}.jpg", base, size, size))
            .collect();

        transfer::download(&self.client, &urls, self.budget()).await
    }

    async fn upload(&self, server: &ServerCandidate) -> Result<TransferRate, ProviderError> {
        let rate = transfer::upload(
            &self.client,
            &server.url,
            self.config.upload_size_bytes,
            self.budget(),
        )
        .await;

        if let Err(e) = &rate {
            warn!("Upload to {} failed: {}", server.url, e);
        }
        rate
    }
}
