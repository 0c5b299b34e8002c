//! Model version metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uri::RUNS_SCHEME;

/// Immutable binding of `(model_name, version)` to one run's artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVersion {
    model_name: String,
    version: u64,
    source_run_id: String,
    source_artifact_path: String,
    created_at: DateTime<Utc>,
}

impl ModelVersion {
    pub(crate) fn new(
        model_name: &str,
        version: u64,
        source_run_id: &str,
        source_artifact_path: &str,
    ) -> Self {
        Self {
            model_name: model_name.to_string(),
            version,
            source_run_id: source_run_id.to_string(),
            source_artifact_path: source_artifact_path.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Registered model name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Version number (1-based, gap-free per model).
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Run that produced the artifact.
    #[must_use]
    pub fn source_run_id(&self) -> &str {
        &self.source_run_id
    }

    /// Artifact path relative to the source run.
    #[must_use]
    pub fn source_artifact_path(&self) -> &str {
        &self.source_artifact_path
    }

    /// `runs:/<source_run_id>/<source_artifact_path>`
    #[must_use]
    pub fn source_uri(&self) -> String {
        format!(
            "{RUNS_SCHEME}{}/{}",
            self.source_run_id, self.source_artifact_path
        )
    }

    /// Registration timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
