//! Artifact Store - immutable byte blobs scoped to a run
//!
//! Blobs are keyed by `(run_id, relative_path)` and written at most once.
//! The store has no notion of run lifecycle; [`RunTracker`] guards writes
//! against finished runs before delegating here.
//!
//! ```text
//! artifacts/<run_id>/<relative_path>   -> blob bytes
//! ```
//!
//! [`RunTracker`]: crate::tracking::RunTracker

mod artifact_record;

pub use artifact_record::{cas_hash, ArtifactRecord};

use std::sync::Arc;

use crate::backend::{validate_relative_path, validate_segment, Backend};
use crate::uri::ArtifactUri;
use crate::{Error, Result};

const NAMESPACE: &str = "artifacts";

/// Write-once blob store keyed by run and relative path.
#[derive(Debug)]
pub struct ArtifactStore<B: Backend> {
    backend: Arc<B>,
}

impl<B: Backend> Clone for ArtifactStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

fn run_prefix(run_id: &str) -> String {
    format!("{NAMESPACE}/{run_id}/")
}

fn blob_key(run_id: &str, path: &str) -> String {
    format!("{NAMESPACE}/{run_id}/{path}")
}

impl<B: Backend> ArtifactStore<B> {
    /// Create a store over a shared backend.
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Store `content` at `path` of `run_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] if the key was written before; the stored
    ///   bytes are left unchanged
    /// - [`Error::InvalidArgument`] for a malformed run id or path
    pub async fn put(&self, run_id: &str, path: &str, content: Vec<u8>) -> Result<ArtifactRecord> {
        validate_segment("run id", run_id)?;
        validate_relative_path(path)?;

        let record = ArtifactRecord::from_content(run_id, path, &content);
        if !self
            .backend
            .put_if_absent(&blob_key(run_id, path), content)
            .await?
        {
            return Err(Error::AlreadyExists(record.uri()));
        }

        tracing::debug!(
            run_id,
            path,
            size_bytes = record.size_bytes(),
            cas_hash = record.cas_hash(),
            "artifact stored"
        );
        Ok(record)
    }

    /// Store a directory of blobs under `dir`.
    ///
    /// Every entry is validated and checked for prior existence before the
    /// first write, so a rejected directory leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Same as [`ArtifactStore::put`] for any entry.
    pub async fn put_dir(
        &self,
        run_id: &str,
        dir: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<ArtifactRecord>> {
        validate_segment("run id", run_id)?;
        validate_relative_path(dir)?;

        let mut staged = Vec::with_capacity(entries.len());
        for (name, content) in entries {
            let path = format!("{dir}/{name}");
            validate_relative_path(&path)?;
            if self.backend.exists(&blob_key(run_id, &path)).await? {
                return Err(Error::AlreadyExists(format!(
                    "{}{run_id}/{path}",
                    crate::uri::RUNS_SCHEME
                )));
            }
            staged.push((path, content));
        }

        let mut records = Vec::with_capacity(staged.len());
        for (path, content) in staged {
            records.push(self.put(run_id, &path, content).await?);
        }
        Ok(records)
    }

    /// Read the blob at `path` of `run_id`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run has no artifact at that path.
    pub async fn get(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        validate_segment("run id", run_id)?;
        validate_relative_path(path)?;

        self.backend
            .get(&blob_key(run_id, path))
            .await?
            .ok_or_else(|| Error::not_found("artifact", format!("{}{run_id}/{path}", crate::uri::RUNS_SCHEME)))
    }

    /// Read the blob a `runs:/` URI points at.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if nothing is stored there.
    pub async fn get_uri(&self, uri: &ArtifactUri) -> Result<Vec<u8>> {
        self.get(uri.run_id(), uri.path()).await
    }

    /// Relative paths of every blob stored for `run_id`, sorted.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list(&self, run_id: &str) -> Result<Vec<String>> {
        validate_segment("run id", run_id)?;
        let prefix = run_prefix(run_id);
        Ok(self
            .backend
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Whether `path` names a blob, or a directory containing blobs.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn contains(&self, run_id: &str, path: &str) -> Result<bool> {
        validate_segment("run id", run_id)?;
        validate_relative_path(path)?;

        if self.backend.exists(&blob_key(run_id, path)).await? {
            return Ok(true);
        }
        let dir_prefix = format!("{}/", blob_key(run_id, path));
        Ok(!self.backend.list(&dir_prefix).await?.is_empty())
    }

    /// Every blob below directory `dir` as `(path relative to dir, bytes)`,
    /// sorted by path.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no blob is stored under `dir`.
    pub async fn get_dir(&self, run_id: &str, dir: &str) -> Result<Vec<(String, Vec<u8>)>> {
        validate_segment("run id", run_id)?;
        validate_relative_path(dir)?;

        let dir_prefix = format!("{}/", blob_key(run_id, dir));
        let keys = self.backend.list(&dir_prefix).await?;
        if keys.is_empty() {
            return Err(Error::not_found(
                "artifact directory",
                format!("{}{run_id}/{dir}", crate::uri::RUNS_SCHEME),
            ));
        }

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let content = self.backend.get(&key).await?.ok_or_else(|| {
                Error::TransientStore(format!("artifact {key} vanished while listing"))
            })?;
            if let Some(relative) = key.strip_prefix(&dir_prefix) {
                entries.push((relative.to_string(), content));
            }
        }
        Ok(entries)
    }
}
