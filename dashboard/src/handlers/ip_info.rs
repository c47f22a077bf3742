//! Geolocation of the server and the caller

use crate::DashboardState;
use crate::error::ApiError;
use crate::geo::IpInfo;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

/// Handler for `/api/ip-info`.
///
/// A visitor on loopback or a private network has no useful public
/// location, so it is reported as the server's own public address.
pub async fn ip_info_handler(
    State(state): State<Arc<DashboardState>>,
    request: Request,
) -> Result<Json<IpInfo>, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let visitor = visitor_ip(request.headers(), peer);
    debug!("ip-info request from {:?}", visitor);

    let server_ip = state.geo.public_ip().await?;
    let server_detail = state.geo.locate(&server_ip).await?;

    let visitor_detail = match visitor.filter(|ip| !is_local(ip)) {
        Some(ip) => state.geo.locate(&ip.to_string()).await?,
        None => server_detail.clone(),
    };

    Ok(Json(IpInfo {
        server_ip: server_detail,
        visitor_ip: visitor_detail,
    }))
}

/// First `X-Forwarded-For` hop, else the socket peer
fn visitor_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or(peer)
}

fn is_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
