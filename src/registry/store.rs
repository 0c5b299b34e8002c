//! Model registry: gap-free version allocation per model name
//!
//! ```text
//! models/<name>/versions/<version>   ModelVersion (write-once)
//! ```
//!
//! Allocation is a compare-and-swap loop: read the highest version, try to
//! create `max + 1`, and on conflict try the next slot. A slot is only ever
//! attempted once the one below it exists, so numbers stay contiguous from
//! 1 with no reuse. Each model name has its own slots, so registrations for
//! different names never contend.

use std::sync::Arc;

use super::ModelVersion;
use crate::backend::{get_json, put_json_if_absent, validate_relative_path, validate_segment, Backend};
use crate::tracking::{RunStatus, RunTracker};
use crate::{Error, Result};

const NAMESPACE: &str = "models";

fn versions_prefix(model_name: &str) -> String {
    format!("{NAMESPACE}/{model_name}/versions/")
}

fn version_key(model_name: &str, version: u64) -> String {
    format!("{NAMESPACE}/{model_name}/versions/{version:020}")
}

/// Versioned registry of trained-model artifacts.
#[derive(Debug)]
pub struct ModelRegistry<B: Backend> {
    backend: Arc<B>,
    runs: RunTracker<B>,
}

impl<B: Backend> Clone for ModelRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            runs: self.runs.clone(),
        }
    }
}

impl<B: Backend> ModelRegistry<B> {
    /// Create a registry over a shared backend; `runs` validates sources.
    #[must_use]
    pub fn new(backend: Arc<B>, runs: RunTracker<B>) -> Self {
        Self { backend, runs }
    }

    /// Register the artifact at `source_artifact_path` of a finished run as
    /// the next version of `model_name`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownRun`] if the run does not exist or is not FINISHED
    /// - [`Error::NotFound`] if the run has no artifact at that path
    /// - [`Error::InvalidArgument`] for a malformed name or path
    pub async fn register(
        &self,
        model_name: &str,
        source_run_id: &str,
        source_artifact_path: &str,
    ) -> Result<u64> {
        validate_segment("model name", model_name)?;
        validate_relative_path(source_artifact_path)?;

        match self.runs.status(source_run_id).await {
            Ok(RunStatus::Finished) => {}
            Ok(status) => {
                return Err(Error::UnknownRun(format!(
                    "{source_run_id} is {status}, only FINISHED runs can be registered"
                )))
            }
            Err(Error::NotFound { .. }) => return Err(Error::UnknownRun(source_run_id.to_string())),
            Err(e) => return Err(e),
        }
        if !self
            .runs
            .artifacts()
            .contains(source_run_id, source_artifact_path)
            .await?
        {
            return Err(Error::not_found(
                "artifact",
                format!("runs:/{source_run_id}/{source_artifact_path}"),
            ));
        }

        let mut version = self.max_version(model_name).await? + 1;
        loop {
            let record =
                ModelVersion::new(model_name, version, source_run_id, source_artifact_path);
            if put_json_if_absent(&*self.backend, &version_key(model_name, version), &record).await?
            {
                tracing::info!(
                    model_name,
                    version,
                    source = %record.source_uri(),
                    "model version registered"
                );
                return Ok(version);
            }
            tracing::debug!(model_name, version, "version slot taken, trying next");
            version += 1;
        }
    }

    /// Fetch one version.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the model has no such version.
    pub async fn get_version(&self, model_name: &str, version: u64) -> Result<ModelVersion> {
        validate_segment("model name", model_name)?;
        get_json(&*self.backend, &version_key(model_name, version))
            .await?
            .ok_or_else(|| Error::not_found("model version", format!("{model_name} v{version}")))
    }

    /// Every version of `model_name`, ascending. Empty for an unknown model.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> {
        validate_segment("model name", model_name)?;
        let mut versions = Vec::new();
        for key in self.backend.list(&versions_prefix(model_name)).await? {
            if let Some(version) = get_json::<_, ModelVersion>(&*self.backend, &key).await? {
                versions.push(version);
            }
        }
        versions.sort_by_key(ModelVersion::version);
        Ok(versions)
    }

    /// Highest version of `model_name`.
    ///
    /// A pure read over the version keys; nothing is locked or written.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the model has no versions.
    pub async fn latest_version(&self, model_name: &str) -> Result<u64> {
        validate_segment("model name", model_name)?;
        match self.max_version(model_name).await? {
            0 => Err(Error::not_found("model", model_name)),
            version => Ok(version),
        }
    }

    /// Names of every registered model, sorted.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let prefix = format!("{NAMESPACE}/");
        let mut names: Vec<String> = self
            .backend
            .list(&prefix)
            .await?
            .iter()
            .filter_map(|key| {
                let (name, rest) = key.strip_prefix(&prefix)?.split_once('/')?;
                rest.starts_with("versions/").then(|| name.to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn max_version(&self, model_name: &str) -> Result<u64> {
        let prefix = versions_prefix(model_name);
        Ok(self
            .backend
            .list(&prefix)
            .await?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix)?.parse::<u64>().ok())
            .max()
            .unwrap_or(0))
    }
}
