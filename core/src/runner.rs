//! Measurement cycle orchestration
//!
//! One cycle runs identity -> server selection -> latency -> download ->
//! upload -> commit, strictly in that order. Only the latency phase may fail
//! without aborting the cycle.

use crate::error::{Phase, ProviderError, RunError, StoreError};
use crate::model::{Measurement, MeasurementRecord, NetworkIdentity, ServerCandidate, TransferRate};
use crate::provider::MeasurementProvider;
use crate::store::ResultStore;
use chrono::{Local, NaiveDateTime, Timelike};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound for each provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimeouts {
    pub identity: Duration,
    pub discovery: Duration,
    pub latency: Duration,
    pub download: Duration,
    pub upload: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            identity: Duration::from_secs(10),
            discovery: Duration::from_secs(15),
            latency: Duration::from_secs(10),
            download: Duration::from_secs(60),
            upload: Duration::from_secs(60),
        }
    }
}

/// Candidate listing with latencies, for the server overview
#[derive(Debug, Clone)]
pub struct ServerSurvey {
    pub identity: NetworkIdentity,
    pub servers: Vec<ServerCandidate>,
    pub total: usize,
}

pub struct MeasurementRunner {
    provider: Arc<dyn MeasurementProvider>,
    store: ResultStore,
    timeouts: PhaseTimeouts,
}

impl MeasurementRunner {
    pub fn new(
        provider: Arc<dyn MeasurementProvider>,
        store: ResultStore,
        timeouts: PhaseTimeouts,
    ) -> Self {
        Self {
            provider,
            store,
            timeouts,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Run one full measurement cycle and commit the result
    pub async fn run(&self, server_id: Option<&str>) -> Result<MeasurementRecord, RunError> {
        let identity = bounded(self.timeouts.identity, self.provider.network_identity())
            .await
            .map_err(|source| RunError::Provider {
                stage: Phase::Identity,
                source,
            })?;
        debug!("ISP: {} ({})", identity.isp, identity.ip);

        let mut server = self.select_server(server_id).await?;
        info!(
            "Selected server {} {} ({}), {:.2} km",
            server.id, server.name, server.country, server.distance_km
        );

        match bounded(self.timeouts.latency, self.provider.ping(&server)).await {
            Ok(latency) => server.latency = Some(latency),
            Err(e) => warn!("Latency unavailable for {}: {}", server.name, e),
        }

        let download = bounded(self.timeouts.download, self.provider.download(&server))
            .await
            .and_then(|rate| checked_rate(rate, "download"))
            .map_err(|source| RunError::MeasurementFailed {
                phase: Phase::Download,
                source,
            })?;

        let upload = bounded(self.timeouts.upload, self.provider.upload(&server))
            .await
            .and_then(|rate| checked_rate(rate, "upload"))
            .map_err(|source| RunError::MeasurementFailed {
                phase: Phase::Upload,
                source,
            })?;

        let measurement = Measurement {
            isp: identity.isp,
            server_name: server.name.clone(),
            server_country: server.country.clone(),
            server_distance_km: server.distance_km.max(0.0),
            latency_ms: server.latency_ms(),
            download_mbps: download.mbps(),
            upload_mbps: upload.mbps(),
            tested_at: now_seconds(),
        };

        let record = self.commit(measurement).await?;
        info!(
            "Measurement {} complete: download {:.2} Mbps, upload {:.2} Mbps, latency {}",
            record.id,
            record.measurement.download_mbps,
            record.measurement.upload_mbps,
            format_latency(record.measurement.latency_ms)
        );

        Ok(record)
    }

    async fn select_server(&self, server_id: Option<&str>) -> Result<ServerCandidate, RunError> {
        let candidates = bounded(self.timeouts.discovery, self.provider.fetch_servers())
            .await
            .map_err(|source| RunError::Provider {
                stage: Phase::ServerSelection,
                source,
            })?;
        debug!("Provider offered {} servers", candidates.len());

        if let Some(id) = server_id {
            return candidates
                .into_iter()
                .find(|s| s.id == id)
                .ok_or_else(|| RunError::ServerNotFound(id.to_string()));
        }

        let ranked = bounded(self.timeouts.discovery, self.provider.rank_servers(candidates))
            .await
            .map_err(|source| RunError::Provider {
                stage: Phase::ServerSelection,
                source,
            })?;

        ranked.into_iter().next().ok_or(RunError::NoServerAvailable)
    }

    async fn commit(&self, measurement: Measurement) -> Result<MeasurementRecord, StoreError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.commit(measurement))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Identity plus the first `limit` candidates, each pinged once
    pub async fn survey_servers(&self, limit: usize) -> Result<ServerSurvey, RunError> {
        let identity = bounded(self.timeouts.identity, self.provider.network_identity())
            .await
            .map_err(|source| RunError::Provider {
                stage: Phase::Identity,
                source,
            })?;

        let candidates = bounded(self.timeouts.discovery, self.provider.fetch_servers())
            .await
            .map_err(|source| RunError::Provider {
                stage: Phase::ServerSelection,
                source,
            })?;
        let total = candidates.len();

        let mut servers: Vec<ServerCandidate> = candidates.into_iter().take(limit).collect();
        for server in &mut servers {
            server.latency = match bounded(self.timeouts.latency, self.provider.ping(server)).await {
                Ok(latency) => Some(latency),
                Err(e) => {
                    debug!("Ping {} failed: {}", server.id, e);
                    None
                }
            };
        }

        Ok(ServerSurvey {
            identity,
            servers,
            total,
        })
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

fn checked_rate(rate: TransferRate, phase: &str) -> Result<TransferRate, ProviderError> {
    if rate.is_valid() {
        Ok(rate)
    } else {
        Err(ProviderError::InvalidResponse(format!(
            "{} rate {} is not a usable number",
            phase, rate.bytes_per_second
        )))
    }
}

fn now_seconds() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Latency for display: milliseconds or "timeout"
pub fn format_latency(latency_ms: Option<u32>) -> String {
    match latency_ms {
        Some(ms) => format!("{} ms", ms),
        None => "timeout".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::temp_store;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted provider that records the order of calls
    pub(crate) struct FakeProvider {
        pub servers: Vec<ServerCandidate>,
        pub fail_identity: bool,
        pub fail_ping: bool,
        pub fail_download: bool,
        pub fail_upload: bool,
        /// Calls that never return
        pub hang_ping: bool,
        pub hang_download: bool,
        pub download_bps: f64,
        pub calls: Mutex<Vec<&'static str>>,
    }

    impl Default for FakeProvider {
        fn default() -> Self {
            Self {
                servers: vec![server("2", "Graz", 150.0), server("1", "Vienna", 10.0)],
                fail_identity: false,
                fail_ping: false,
                fail_download: false,
                fail_upload: false,
                hang_ping: false,
                hang_download: false,
                download_bps: 6_250_000.0,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeProvider {
        pub(crate) fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    pub(crate) fn server(id: &str, name: &str, distance_km: f64) -> ServerCandidate {
        ServerCandidate {
            id: id.to_string(),
            name: name.to_string(),
            sponsor: "Sponsor".to_string(),
            country: "Austria".to_string(),
            host: format!("{}.example.net:8080", name.to_lowercase()),
            url: format!("http://{}.example.net:8080/speedtest/upload.php", name.to_lowercase()),
            distance_km,
            latency: None,
        }
    }

    fn failure(what: &str) -> ProviderError {
        ProviderError::Request(format!("{} unreachable", what))
    }

    #[async_trait]
    impl MeasurementProvider for FakeProvider {
        async fn network_identity(&self) -> Result<NetworkIdentity, ProviderError> {
            self.record("identity");
            if self.fail_identity {
                return Err(failure("identity"));
            }
            Ok(NetworkIdentity {
                ip: "203.0.113.7".to_string(),
                isp: "Example ISP".to_string(),
                lat: None,
                lon: None,
            })
        }

        async fn fetch_servers(&self) -> Result<Vec<ServerCandidate>, ProviderError> {
            self.record("servers");
            Ok(self.servers.clone())
        }

        async fn rank_servers(
            &self,
            mut candidates: Vec<ServerCandidate>,
        ) -> Result<Vec<ServerCandidate>, ProviderError> {
            self.record("rank");
            candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
            Ok(candidates)
        }

        async fn ping(&self, _server: &ServerCandidate) -> Result<Duration, ProviderError> {
            self.record("ping");
            if self.hang_ping {
                std::future::pending::<()>().await;
            }
            if self.fail_ping {
                return Err(failure("ping"));
            }
            Ok(Duration::from_millis(18))
        }

        async fn download(&self, _server: &ServerCandidate) -> Result<TransferRate, ProviderError> {
            self.record("download");
            if self.hang_download {
                std::future::pending::<()>().await;
            }
            if self.fail_download {
                return Err(failure("download"));
            }
            Ok(TransferRate::new(self.download_bps))
        }

        async fn upload(&self, _server: &ServerCandidate) -> Result<TransferRate, ProviderError> {
            self.record("upload");
            if self.fail_upload {
                return Err(failure("upload"));
            }
            Ok(TransferRate::new(1_250_000.0))
        }
    }

    fn runner_with(provider: FakeProvider) -> (tempfile::TempDir, Arc<FakeProvider>, MeasurementRunner) {
        let (dir, store) = temp_store();
        let provider = Arc::new(provider);
        let runner = MeasurementRunner::new(provider.clone(), store, PhaseTimeouts::default());
        (dir, provider, runner)
    }

    #[tokio::test]
    async fn test_cycle_commits_record() {
        let (_dir, provider, runner) = runner_with(FakeProvider::default());

        let record = runner.run(None).await.unwrap();

        assert_eq!(record.measurement.server_name, "Vienna");
        assert_eq!(record.measurement.isp, "Example ISP");
        assert_eq!(record.measurement.latency_ms, Some(18));
        assert_eq!(record.measurement.download_mbps, 50.0);
        assert_eq!(record.measurement.upload_mbps, 10.0);
        assert_eq!(
            provider.calls(),
            vec!["identity", "servers", "rank", "ping", "download", "upload"]
        );

        let latest = runner.store().latest().unwrap();
        assert_eq!(latest, record);
    }

    #[tokio::test]
    async fn test_explicit_server_skips_ranking() {
        let (_dir, provider, runner) = runner_with(FakeProvider::default());

        let record = runner.run(Some("2")).await.unwrap();

        assert_eq!(record.measurement.server_name, "Graz");
        assert!(!provider.calls().contains(&"rank"));
    }

    #[tokio::test]
    async fn test_unknown_server_commits_nothing() {
        let (_dir, provider, runner) = runner_with(FakeProvider::default());

        let err = runner.run(Some("999")).await.unwrap_err();

        assert!(matches!(err, RunError::ServerNotFound(ref id) if id == "999"));
        assert_eq!(runner.store().count().unwrap(), 0);
        assert!(!provider.calls().contains(&"download"));
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let (_dir, _provider, runner) = runner_with(FakeProvider {
            servers: Vec::new(),
            ..FakeProvider::default()
        });

        let err = runner.run(None).await.unwrap_err();
        assert!(matches!(err, RunError::NoServerAvailable));
        assert_eq!(err.phase(), Phase::ServerSelection);
    }

    #[tokio::test]
    async fn test_identity_failure_aborts_before_discovery() {
        let (_dir, provider, runner) = runner_with(FakeProvider {
            fail_identity: true,
            ..FakeProvider::default()
        });

        let err = runner.run(None).await.unwrap_err();

        assert_eq!(err.phase(), Phase::Identity);
        assert_eq!(provider.calls(), vec!["identity"]);
        assert_eq!(runner.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_latency_failure_still_commits() {
        let (_dir, _provider, runner) = runner_with(FakeProvider {
            fail_ping: true,
            ..FakeProvider::default()
        });

        let record = runner.run(None).await.unwrap();

        assert_eq!(record.measurement.latency_ms, None);
        assert_eq!(runner.store().count().unwrap(), 1);
        assert_eq!(runner.store().latest().unwrap().measurement.latency_ms, None);
    }

    #[tokio::test]
    async fn test_download_failure_commits_nothing() {
        let (_dir, provider, runner) = runner_with(FakeProvider {
            fail_download: true,
            ..FakeProvider::default()
        });

        let err = runner.run(None).await.unwrap_err();

        assert!(matches!(err, RunError::MeasurementFailed { phase: Phase::Download, .. }));
        assert!(!provider.calls().contains(&"upload"));
        assert_eq!(runner.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_commits_nothing() {
        let (_dir, _provider, runner) = runner_with(FakeProvider {
            fail_upload: true,
            ..FakeProvider::default()
        });

        let err = runner.run(None).await.unwrap_err();

        assert_eq!(err.phase(), Phase::Upload);
        assert_eq!(runner.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unusable_rate_fails_phase() {
        let (_dir, _provider, runner) = runner_with(FakeProvider {
            download_bps: f64::NAN,
            ..FakeProvider::default()
        });

        let err = runner.run(None).await.unwrap_err();

        assert_eq!(err.phase(), Phase::Download);
        assert_eq!(runner.store().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_committed_values_are_non_negative() {
        let (_dir, _provider, runner) = runner_with(FakeProvider::default());

        for _ in 0..3 {
            runner.run(None).await.unwrap();
        }

        for record in runner.store().list_all().unwrap() {
            let m = record.measurement;
            assert!(m.download_mbps >= 0.0);
            assert!(m.upload_mbps >= 0.0);
            assert!(m.server_distance_km >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_survey_pings_each_listed_server() {
        let (_dir, provider, runner) = runner_with(FakeProvider::default());

        let survey = runner.survey_servers(1).await.unwrap();

        assert_eq!(survey.total, 2);
        assert_eq!(survey.servers.len(), 1);
        assert_eq!(survey.servers[0].latency_ms(), Some(18));
        assert_eq!(provider.calls(), vec!["identity", "servers", "ping"]);
    }

    fn short_timeouts() -> PhaseTimeouts {
        PhaseTimeouts {
            latency: Duration::from_millis(50),
            download: Duration::from_millis(50),
            ..PhaseTimeouts::default()
        }
    }

    #[tokio::test]
    async fn test_hung_ping_records_no_latency() {
        let (_dir, store) = temp_store();
        let provider = Arc::new(FakeProvider {
            hang_ping: true,
            ..FakeProvider::default()
        });
        let runner = MeasurementRunner::new(provider.clone(), store, short_timeouts());

        let record = runner.run(None).await.unwrap();

        assert_eq!(record.measurement.latency_ms, None);
        assert_eq!(record.measurement.download_mbps, 50.0);
        assert_eq!(provider.calls().last(), Some(&"upload"));
        assert_eq!(runner.store().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hung_download_times_out_without_commit() {
        let (_dir, store) = temp_store();
        let provider = Arc::new(FakeProvider {
            hang_download: true,
            ..FakeProvider::default()
        });
        let runner = MeasurementRunner::new(provider.clone(), store, short_timeouts());

        let err = runner.run(None).await.unwrap_err();

        match err {
            RunError::MeasurementFailed {
                phase: Phase::Download,
                source: ProviderError::Timeout(limit),
            } => assert_eq!(limit, Duration::from_millis(50)),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!provider.calls().contains(&"upload"));
        assert_eq!(runner.store().count().unwrap(), 0);
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(Some(20)), "20 ms");
        assert_eq!(format_latency(None), "timeout");
    }
}
