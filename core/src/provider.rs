//! Measurement provider seam
//!
//! The core never talks to measurement servers itself. Discovery and the raw
//! latency/throughput probes come from an implementation of
//! [`MeasurementProvider`]; the runner only orders the calls, bounds them
//! with timeouts and assembles the result.

use crate::error::ProviderError;
use crate::model::{NetworkIdentity, ServerCandidate, TransferRate};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait MeasurementProvider: Send + Sync {
    /// Current public identity (IP, ISP, coordinates if known)
    async fn network_identity(&self) -> Result<NetworkIdentity, ProviderError>;

    /// Full candidate list, unordered
    async fn fetch_servers(&self) -> Result<Vec<ServerCandidate>, ProviderError>;

    /// Best candidates first; may drop unusable ones
    async fn rank_servers(
        &self,
        candidates: Vec<ServerCandidate>,
    ) -> Result<Vec<ServerCandidate>, ProviderError>;

    /// Round-trip latency to the server
    async fn ping(&self, server: &ServerCandidate) -> Result<Duration, ProviderError>;

    async fn download(&self, server: &ServerCandidate) -> Result<TransferRate, ProviderError>;

    async fn upload(&self, server: &ServerCandidate) -> Result<TransferRate, ProviderError>;
}
