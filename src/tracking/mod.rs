//! Run Tracking
//!
//! Each pipeline stage opens a run, logs against it while it is RUNNING,
//! and finalizes it exactly once. The run id is the only token handed to
//! the next stage.
//!
//! ## Schema Overview
//!
//! ```text
//! experiment label (1) ──< Run (N)
//!                            │
//!                            ├──< param (write-once)
//!                            ├──< tag
//!                            ├──< MetricRecord (N) [time-series]
//!                            └──< ArtifactRecord (N) [CAS]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use lineage_db::backend::MemoryBackend;
//! use lineage_db::tracking::{RunOutcome, RunStatus, RunTracker};
//!
//! # async fn example() -> lineage_db::Result<()> {
//! let tracker = RunTracker::new(Arc::new(MemoryBackend::new()));
//!
//! let run_id = tracker.start_run("data-pipeline", BTreeMap::new()).await?;
//! tracker.log_metric(&run_id, "rows_after", 1800.0).await?;
//! tracker.finish_run(&run_id, RunOutcome::Finished).await?;
//!
//! assert_eq!(tracker.status(&run_id).await?, RunStatus::Finished);
//! # Ok(())
//! # }
//! ```

mod metric_record;
mod run_record;
mod tracker;

pub use metric_record::MetricRecord;
pub use run_record::{Run, RunOutcome, RunStatus};
pub use tracker::RunTracker;
