//! speedlog core library
//!
//! Measurement scheduling and result pipeline: selecting a server, running
//! the latency/download/upload phases through a [`MeasurementProvider`],
//! committing each result to the [`ResultStore`] and reshaping stored
//! records into chronological [`TrendSeries`] for charts.

pub mod error;
pub mod model;
pub mod provider;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod trend;

pub use error::{Phase, ProviderError, RunError, StoreError};
pub use model::{Measurement, MeasurementRecord, NetworkIdentity, ServerCandidate, TransferRate};
pub use provider::MeasurementProvider;
pub use runner::{format_latency, MeasurementRunner, PhaseTimeouts, ServerSurvey};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerStats};
pub use store::ResultStore;
pub use trend::{TrendAggregator, TrendSeries, MAX_TREND_LIMIT};

/// Timestamp layout used for the `test_time` column (sortable as text)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Label layout for chart points (minute precision)
pub const LABEL_FORMAT: &str = "%m-%d %H:%M";
