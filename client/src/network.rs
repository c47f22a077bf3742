//! Public IP and geolocation lookups

use crate::config::ProviderConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use speedlog_core::NetworkIdentity;
use speedlog_dashboard::{GeoError, GeoLocator, IpDetail};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Get public IP address from external service
pub async fn get_public_ip(client: &reqwest::Client, service_url: &str) -> Result<IpAddr> {
    debug!("Querying public IP from: {}", service_url);

    let response = client
        .get(service_url)
        .send()
        .await
        .context("Failed to query public IP service")?;

    if !response.status().is_success() {
        anyhow::bail!("Public IP service returned error: {}", response.status());
    }

    let ip_str = response
        .text()
        .await
        .context("Failed to read public IP response")?
        .trim()
        .to_string();

    let ip = IpAddr::from_str(&ip_str)
        .context("Failed to parse public IP address")?;

    debug!("Detected public IP: {}", ip);
    Ok(ip)
}

/// ip-api.com response. Every field is optional: failed lookups only carry
/// `status` and `message`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpApiResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    pub query: Option<String>,
    pub country: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl IpApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    pub fn into_detail(self, ip: &str) -> IpDetail {
        IpDetail {
            ip: ip.to_string(),
            country: self.country.unwrap_or_default(),
            province: self.region_name.unwrap_or_default(),
            city: self.city.unwrap_or_default(),
            isp: self.isp.unwrap_or_default(),
        }
    }

    pub fn into_identity(self) -> Result<NetworkIdentity> {
        if !self.is_success() {
            anyhow::bail!(
                "Geolocation service refused lookup: {}",
                self.message.unwrap_or_else(|| "no reason given".to_string())
            );
        }

        Ok(NetworkIdentity {
            ip: self.query.unwrap_or_default(),
            isp: self.isp.unwrap_or_default(),
            lat: self.lat,
            lon: self.lon,
        })
    }
}

/// Client for ip-api.com and the public IP echo service
pub struct IpApiClient {
    client: reqwest::Client,
    base_url: String,
    language: String,
    public_ip_url: String,
}

impl IpApiClient {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build geolocation HTTP client")?;

        Ok(Self {
            client,
            base_url: config.geolocation_url.clone(),
            language: config.geolocation_language.clone(),
            public_ip_url: config.public_ip_url.clone(),
        })
    }

    /// Look up `ip`, or the caller's own address when `None`
    pub async fn lookup(&self, ip: Option<&str>) -> Result<IpApiResponse> {
        let url = format!("{}{}", self.base_url, ip.unwrap_or_default());
        debug!("Geolocation lookup: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("lang", self.language.as_str())])
            .send()
            .await
            .context("Failed to query geolocation service")?;

        if !response.status().is_success() {
            anyhow::bail!("Geolocation service returned error: {}", response.status());
        }

        response
            .json::<IpApiResponse>()
            .await
            .context("Failed to decode geolocation response")
    }

    pub async fn identity(&self) -> Result<NetworkIdentity> {
        self.lookup(None).await?.into_identity()
    }
}

#[async_trait]
impl GeoLocator for IpApiClient {
    async fn public_ip(&self) -> Result<String, GeoError> {
        get_public_ip(&self.client, &self.public_ip_url)
            .await
            .map(|ip| ip.to_string())
            .map_err(|e| GeoError::PublicIp(format!("{:#}", e)))
    }

    async fn locate(&self, ip: &str) -> Result<IpDetail, GeoError> {
        let response = self.lookup(Some(ip)).await.map_err(|e| GeoError::Lookup {
            ip: ip.to_string(),
            reason: format!("{:#}", e),
        })?;

        if !response.is_success() {
            debug!("No location for {}: {:?}", ip, response.message);
        }
        Ok(response.into_detail(ip))
    }
}
