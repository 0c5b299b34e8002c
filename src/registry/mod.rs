//! Model Registry with alias promotion
//!
//! Versions are immutable and numbered 1, 2, 3, ... per model name. Aliases
//! such as `champion` are the only mutable part: each one points at exactly
//! one version at a time and can be moved atomically.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use lineage_db::backend::MemoryBackend;
//! use lineage_db::registry::{AliasResolver, ModelRegistry};
//! use lineage_db::tracking::{RunOutcome, RunTracker};
//!
//! # async fn example() -> lineage_db::Result<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! let runs = RunTracker::new(Arc::clone(&backend));
//!
//! let run_id = runs.start_run("model-training", BTreeMap::new()).await?;
//! runs.log_artifact(&run_id, "model", b"weights".to_vec()).await?;
//! runs.finish_run(&run_id, RunOutcome::Finished).await?;
//!
//! let registry = ModelRegistry::new(Arc::clone(&backend), runs);
//! let version = registry.register("pulsar-classifier-prod", &run_id, "model").await?;
//!
//! let aliases = AliasResolver::new(backend, registry);
//! aliases.set_alias("pulsar-classifier-prod", "champion", version).await?;
//! assert_eq!(aliases.resolve("pulsar-classifier-prod", "champion").await?, 1);
//! # Ok(())
//! # }
//! ```

mod alias;
mod model_version;
mod store;

pub use alias::{AliasBinding, AliasResolver};
pub use model_version::ModelVersion;
pub use store::ModelRegistry;
