//! speedlog dashboard
//!
//! HTTP surface over the measurement pipeline:
//! - `GET /` - chart page
//! - `GET /api/chart-data?limit=N` - ascending trend series
//! - `GET /api/results?limit=N` - stored records, newest first
//! - `POST /api/run-test` - one on-demand measurement
//! - `GET /api/ip-info` - geolocation of server and caller

pub mod error;
pub mod geo;
mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use speedlog_core::{MeasurementRunner, TrendAggregator};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use error::ApiError;
pub use geo::{GeoError, GeoLocator, IpDetail, IpInfo};

/// Record count for `/api/chart-data` when the request gives none
pub const DEFAULT_CHART_LIMIT: usize = 100;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct DashboardState {
    /// Runner used by on-demand measurements (shares the scheduler's store).
    pub runner: Arc<MeasurementRunner>,
    /// Read side for chart data.
    pub trends: TrendAggregator,
    /// Geolocation collaborator for `/api/ip-info`.
    pub geo: Arc<dyn GeoLocator>,
    /// Chart limit when the query has none.
    pub default_limit: usize,
}

impl DashboardState {
    pub fn new(runner: Arc<MeasurementRunner>, geo: Arc<dyn GeoLocator>) -> Self {
        let trends = TrendAggregator::new(runner.store().clone());
        Self {
            runner,
            trends,
            geo,
            default_limit: DEFAULT_CHART_LIMIT,
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }
}

/// Create the dashboard router.
pub fn create_router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/api/chart-data", get(handlers::chart_data_handler))
        .route("/api/results", get(handlers::results_handler))
        .route("/api/run-test", post(handlers::run_test_handler))
        .route("/api/ip-info", get(handlers::ip_info_handler))
        .with_state(Arc::new(state))
}

/// Serve the dashboard on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: DashboardState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    info!("Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
