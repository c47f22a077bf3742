//! Chart-ready time series built from stored measurements

use crate::error::StoreError;
use crate::model::MeasurementRecord;
use crate::store::ResultStore;
use crate::LABEL_FORMAT;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Largest record count a single trend request may ask for
pub const MAX_TREND_LIMIT: usize = 10_000;

/// Parallel sequences in ascending time order, plus the latest server info
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSeries {
    pub labels: Vec<String>,
    pub download_data: Vec<f64>,
    pub upload_data: Vec<f64>,
    pub latency_data: Vec<Option<u32>>,
    pub isp: String,
    pub server_name: String,
    pub distance: f64,
}

impl TrendSeries {
    /// Project records given newest first into an oldest-first series
    pub fn from_newest_first(records: Vec<MeasurementRecord>) -> Self {
        let mut series = Self::default();

        // One reversal of the records keeps all sequences aligned
        for record in records.into_iter().rev() {
            let m = record.measurement;
            series.labels.push(m.tested_at.format(LABEL_FORMAT).to_string());
            series.download_data.push(m.download_mbps);
            series.upload_data.push(m.upload_mbps);
            series.latency_data.push(m.latency_ms);
        }

        series
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TrendAggregator {
    store: ResultStore,
}

impl TrendAggregator {
    pub fn new(store: ResultStore) -> Self {
        Self { store }
    }

    /// Latest `limit` records as an ascending series, at most
    /// [`MAX_TREND_LIMIT`]. An empty store or a zero limit gives an empty
    /// series, not an error.
    pub fn get_trend(&self, limit: usize) -> Result<TrendSeries, StoreError> {
        let records = match limit.min(MAX_TREND_LIMIT) {
            0 => Vec::new(),
            limit => self.store.list_recent(limit)?,
        };
        let mut series = TrendSeries::from_newest_first(records);

        match self.store.latest() {
            Ok(latest) => {
                series.isp = latest.measurement.isp;
                series.server_name = latest.measurement.server_name;
                series.distance = latest.measurement.server_distance_km;
            }
            Err(StoreError::NotFound) => {}
            Err(e) => warn!("Failed to load latest server info: {}", e),
        }

        Ok(series)
    }

    /// Same as [`get_trend`](Self::get_trend) on a blocking task
    pub async fn get_trend_async(&self, limit: usize) -> Result<TrendSeries, StoreError> {
        let aggregator = self.clone();
        tokio::task::spawn_blocking(move || aggregator.get_trend(limit))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
