//! # Lineage-DB: Pipeline Run Lineage and Model Registry
//!
//! Lineage-DB records the stages of a multi-stage batch workflow
//! (data preparation → training → registration → promotion), links each
//! stage to the upstream run whose artifacts it consumed, and keeps a
//! versioned registry of trained models with mutable aliases such as
//! `champion`.
//!
//! ## Design Principles
//!
//! - **Immutability is load-bearing**: artifacts, params, model versions and
//!   lineage edges are write-once; conflicts surface as typed errors
//! - **Store-only coordination**: stages are separate processes that share
//!   nothing but the backing store, so every invariant is enforced with an
//!   atomic create or replace on the store itself
//! - **Explicit configuration**: components are built from a
//!   [`config::TrackingConfig`], never from ambient process state
//!
//! ## Example Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use lineage_db::client::LineageClient;
//! use lineage_db::config::TrackingConfig;
//! use lineage_db::tracking::RunOutcome;
//!
//! # async fn example() -> lineage_db::Result<()> {
//! let client = LineageClient::new(&TrackingConfig::in_memory());
//!
//! let prep = client.runs().start_run("data-pipeline", BTreeMap::new()).await?;
//! client.runs().log_metric(&prep, "rows_before", 1000.0).await?;
//! client.runs().log_artifact(&prep, "data.csv", b"a,b\n".to_vec()).await?;
//! client.runs().finish_run(&prep, RunOutcome::Finished).await?;
//!
//! let train = client.start_child_run("model-training", BTreeMap::new(), &prep).await?;
//! client.runs().log_artifact(&train, "model", b"weights".to_vec()).await?;
//! client.runs().finish_run(&train, RunOutcome::Finished).await?;
//!
//! let version = client.registry().register("model-x", &train, "model").await?;
//! client.aliases().set_alias("model-x", "champion", version).await?;
//!
//! let ancestors: Vec<String> = client.lineage().ancestors(&train).await?.collect();
//! assert_eq!(ancestors, vec![prep]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod backend;
pub mod ci;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod lineage;
pub mod registry;
pub mod retry;
pub mod tracking;
pub mod uri;

pub use error::{Error, Result};
