//! Geolocation seam for `/api/ip-info`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Location details for one IP address. Unknown fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpDetail {
    pub ip: String,
    pub country: String,
    pub province: String,
    pub city: String,
    pub isp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpInfo {
    pub server_ip: IpDetail,
    pub visitor_ip: IpDetail,
}

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Public IP lookup failed: {0}")]
    PublicIp(String),

    #[error("Geolocation of {ip} failed: {reason}")]
    Lookup { ip: String, reason: String },
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Public address of this host
    async fn public_ip(&self) -> Result<String, GeoError>;

    async fn locate(&self, ip: &str) -> Result<IpDetail, GeoError>;
}
