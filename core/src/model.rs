//! Measurement data structures

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One completed measurement, ready to be committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// ISP reported by the provider (may be empty)
    pub isp: String,

    pub server_name: String,

    pub server_country: String,

    /// Distance to the server in kilometers
    pub server_distance_km: f64,

    /// Round-trip latency in milliseconds, None if the probe did not complete
    pub latency_ms: Option<u32>,

    /// Download throughput in Mbps
    pub download_mbps: f64,

    /// Upload throughput in Mbps
    pub upload_mbps: f64,

    /// Local wall clock at commit, whole seconds
    pub tested_at: NaiveDateTime,
}

/// A measurement as stored, with its store-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: i64,

    #[serde(flatten)]
    pub measurement: Measurement,
}

/// Candidate server offered by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCandidate {
    pub id: String,
    pub name: String,
    pub sponsor: String,
    pub country: String,
    pub host: String,
    /// Upload endpoint; the other endpoints live next to it
    pub url: String,
    pub distance_km: f64,
    /// Filled in by the ping phase
    #[serde(skip)]
    pub latency: Option<Duration>,
}

impl ServerCandidate {
    pub fn latency_ms(&self) -> Option<u32> {
        self.latency.map(duration_to_ms)
    }
}

/// Who we are on the network, as seen by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub ip: String,
    pub isp: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Raw output of a throughput phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferRate {
    pub bytes_per_second: f64,
}

impl TransferRate {
    pub fn new(bytes_per_second: f64) -> Self {
        Self { bytes_per_second }
    }

    /// Rate from a byte count transferred over `elapsed`
    pub fn from_transfer(bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self::new(0.0);
        }
        Self::new(bytes as f64 / secs)
    }

    /// Megabits per second: bytes/s * 8 / 1_000_000
    pub fn mbps(&self) -> f64 {
        self.bytes_per_second * 8.0 / 1_000_000.0
    }

    /// Negative or non-finite rates cannot be stored
    pub fn is_valid(&self) -> bool {
        self.bytes_per_second.is_finite() && self.bytes_per_second >= 0.0
    }
}

/// Whole milliseconds, saturating at `u32::MAX`
pub fn duration_to_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}
