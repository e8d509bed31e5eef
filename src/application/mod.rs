pub mod backfill;
pub mod chart_service;
pub mod config;
pub mod viewport_sync;

pub use backfill::{BackfillFetcher, BatchOutcome, CancellationToken, FetchSettings, Sleeper};
pub use chart_service::{BackfillCompletion, BackfillJob, ChartSession};
pub use config::EngineConfig;
pub use viewport_sync::{SyncState, ViewportBroadcast, ViewportSynchronizer};
