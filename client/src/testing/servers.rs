//! speedtest.net server listing

use serde::{Deserialize, Deserializer};
use speedlog_core::ServerCandidate;

/// One entry of the `api/js/servers` listing
#[derive(Debug, Deserialize)]
pub struct ServerEntry {
    pub url: String,
    #[serde(default, deserialize_with = "opt_f64_from_any")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_from_any")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_from_any")]
    pub distance: Option<f64>,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(deserialize_with = "string_from_any")]
    pub id: String,
    #[serde(default)]
    pub host: String,
}

impl ServerEntry {
    /// Convert to a candidate; distance from the listing, else great-circle
    /// from `origin` (lat, lon), else zero
    pub fn into_candidate(self, origin: Option<(f64, f64)>) -> ServerCandidate {
        let distance_km = match (self.distance, self.lat.zip(self.lon), origin) {
            (Some(d), _, _) if d.is_finite() && d >= 0.0 => d,
            (_, Some(server), Some(origin)) => haversine_km(origin, server),
            _ => 0.0,
        };

        ServerCandidate {
            id: self.id,
            name: self.name,
            sponsor: self.sponsor,
            country: self.country,
            host: self.host,
            url: self.url,
            distance_km,
            latency: None,
        }
    }
}

/// Great-circle distance in kilometers between two (lat, lon) points
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Directory of the upload endpoint; latency.txt and the images live there
pub fn base_url(upload_url: &str) -> String {
    match upload_url.rfind('/') {
        Some(idx) if idx + 1 < upload_url.len() && !upload_url[..idx].ends_with('/') => {
            upload_url[..=idx].to_string()
        }
        _ if upload_url.ends_with('/') => upload_url.to_string(),
        _ => format!("{}/", upload_url),
    }
}

/// Host part of `host:port`, brackets removed for IPv6
pub fn host_without_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

fn string_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {}", other))),
    }
}

fn opt_f64_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.as_f64()),
        serde_json::Value::String(s) => Ok(s.trim().parse().ok()),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {"url":"http://speedtest.example.at:8080/speedtest/upload.php","lat":"48.2083","lon":"16.3731",
         "distance":3,"name":"Vienna","country":"Austria","cc":"AT","sponsor":"Example AG",
         "id":"12345","preferred":0,"https_functional":1,"host":"speedtest.example.at:8080"},
        {"url":"http://graz.example.at/speedtest/upload.php","lat":"47.0707","lon":"15.4395",
         "name":"Graz","country":"Austria","sponsor":"Other","id":678,"host":"graz.example.at:8080"}
    ]"#;

    #[test]
    fn test_parse_listing() {
        let entries: Vec<ServerEntry> = serde_json::from_str(LISTING).unwrap();
        assert_eq!(entries.len(), 2);

        let origin = Some((48.2083, 16.3731));
        let candidates: Vec<_> = entries.into_iter().map(|e| e.into_candidate(origin)).collect();

        assert_eq!(candidates[0].id, "12345");
        assert_eq!(candidates[0].distance_km, 3.0);
        assert_eq!(candidates[1].id, "678");
        // Vienna to Graz is roughly 145 km
        assert!((candidates[1].distance_km - 145.0).abs() < 10.0);
    }

    #[test]
    fn test_distance_without_origin() {
        let entries: Vec<ServerEntry> = serde_json::from_str(LISTING).unwrap();
        let graz = entries.into_iter().nth(1).unwrap().into_candidate(None);
        assert_eq!(graz.distance_km, 0.0);
    }

    #[test]
    fn test_haversine_zero_and_symmetric() {
        let vienna = (48.2083, 16.3731);
        let paris = (48.8566, 2.3522);
        assert!(haversine_km(vienna, vienna).abs() < 1e-9);
        assert!((haversine_km(vienna, paris) - haversine_km(paris, vienna)).abs() < 1e-9);
        assert!((haversine_km(vienna, paris) - 1034.0).abs() < 15.0);
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            base_url("http://host:8080/speedtest/upload.php"),
            "http://host:8080/speedtest/"
        );
        assert_eq!(base_url("http://host/speedtest/"), "http://host/speedtest/");
    }

    #[test]
    fn test_host_without_port() {
        assert_eq!(host_without_port("speedtest.example.at:8080"), "speedtest.example.at");
        assert_eq!(host_without_port("speedtest.example.at"), "speedtest.example.at");
        assert_eq!(host_without_port("[2001:db8::1]:8080"), "2001:db8::1");
        assert_eq!(host_without_port("2001:db8::1"), "2001:db8::1");
    }
}
