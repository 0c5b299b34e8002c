//! Lineage client: every component wired over one backend
//!
//! Pipeline stages run as separate processes and share nothing but the
//! backing store. A [`LineageClient`] is what each stage constructs from its
//! [`TrackingConfig`]; the components it hands out all talk to the same
//! store, so invariants enforced by one (run status, artifact existence) are
//! visible to the others without any in-process coordination.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use lineage_db::client::LineageClient;
//! use lineage_db::config::TrackingConfig;
//! use lineage_db::tracking::RunOutcome;
//! use lineage_db::uri::ModelUri;
//!
//! # async fn example() -> lineage_db::Result<()> {
//! let client = LineageClient::new(&TrackingConfig::in_memory());
//!
//! let prep = client.runs().start_run("data-pipeline", BTreeMap::new()).await?;
//! client.runs().finish_run(&prep, RunOutcome::Finished).await?;
//!
//! let train = client
//!     .start_child_run("model-training", BTreeMap::new(), &prep)
//!     .await?;
//! client.runs().log_artifact(&train, "model", b"weights".to_vec()).await?;
//! client.runs().finish_run(&train, RunOutcome::Finished).await?;
//!
//! let version = client.registry().register("classifier", &train, "model").await?;
//! client.aliases().set_alias("classifier", "champion", version).await?;
//!
//! let uri = ModelUri::alias("classifier", "champion")?;
//! assert_eq!(client.load_model_artifact(&uri).await?, b"weights");
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::backend::{AnyBackend, Backend};
use crate::config::TrackingConfig;
use crate::lineage::LineageGraph;
use crate::registry::{AliasResolver, ModelRegistry, ModelVersion};
use crate::retry::RetryingBackend;
use crate::tracking::RunTracker;
use crate::uri::{ArtifactUri, ModelUri};
use crate::{Error, Result};

/// Tag written on child runs; informational only, lineage lives in the graph.
pub const PARENT_RUN_TAG: &str = "parent_run_id";

/// Backend a configured client runs on.
pub type ConfiguredBackend = RetryingBackend<AnyBackend>;

/// Facade over the tracker, lineage graph, registry and alias resolver.
#[derive(Debug)]
pub struct LineageClient<B: Backend = ConfiguredBackend> {
    runs: RunTracker<B>,
    lineage: LineageGraph<B>,
    registry: ModelRegistry<B>,
    aliases: AliasResolver<B>,
}

impl<B: Backend> Clone for LineageClient<B> {
    fn clone(&self) -> Self {
        Self {
            runs: self.runs.clone(),
            lineage: self.lineage.clone(),
            registry: self.registry.clone(),
            aliases: self.aliases.clone(),
        }
    }
}

impl LineageClient {
    /// Open the store named by `config`, applying its retry policy.
    #[must_use]
    pub fn new(config: &TrackingConfig) -> Self {
        tracing::debug!(tracking_uri = ?config.tracking_uri(), "opening lineage store");
        let backend = RetryingBackend::new(config.tracking_uri().open(), *config.retry());
        Self::from_backend(Arc::new(backend))
    }
}

impl<B: Backend> LineageClient<B> {
    /// Wire every component over an existing backend handle.
    #[must_use]
    pub fn from_backend(backend: Arc<B>) -> Self {
        let runs = RunTracker::new(Arc::clone(&backend));
        let lineage = LineageGraph::new(Arc::clone(&backend), runs.clone());
        let registry = ModelRegistry::new(Arc::clone(&backend), runs.clone());
        let aliases = AliasResolver::new(backend, registry.clone());
        Self {
            runs,
            lineage,
            registry,
            aliases,
        }
    }

    /// Run lifecycle and logging.
    #[must_use]
    pub const fn runs(&self) -> &RunTracker<B> {
        &self.runs
    }

    /// Artifact blobs.
    #[must_use]
    pub const fn artifacts(&self) -> &ArtifactStore<B> {
        self.runs.artifacts()
    }

    /// Run-to-run lineage.
    #[must_use]
    pub const fn lineage(&self) -> &LineageGraph<B> {
        &self.lineage
    }

    /// Model versions.
    #[must_use]
    pub const fn registry(&self) -> &ModelRegistry<B> {
        &self.registry
    }

    /// Model aliases.
    #[must_use]
    pub const fn aliases(&self) -> &AliasResolver<B> {
        &self.aliases
    }

    /// Start a run that consumes the output of `parent_run_id` and record the
    /// lineage edge.
    ///
    /// The parent is checked before the child is created, so an unknown parent
    /// leaves no orphan run behind.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownRun`] if the parent does not exist
    /// - anything [`RunTracker::start_run`] or [`LineageGraph::record_edge`]
    ///   returns
    pub async fn start_child_run(
        &self,
        experiment: &str,
        mut tags: BTreeMap<String, String>,
        parent_run_id: &str,
    ) -> Result<String> {
        if !self.runs.exists(parent_run_id).await? {
            return Err(Error::UnknownRun(parent_run_id.to_string()));
        }
        tags.entry(PARENT_RUN_TAG.to_string())
            .or_insert_with(|| parent_run_id.to_string());

        let run_id = self.runs.start_run(experiment, tags).await?;
        self.lineage.record_edge(&run_id, parent_run_id).await?;
        Ok(run_id)
    }

    /// Model version a `models:/` URI points at.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the alias, version or model does not exist.
    pub async fn resolve_model(&self, uri: &ModelUri) -> Result<ModelVersion> {
        let version = self
            .aliases
            .resolve_reference(uri.name(), uri.reference())
            .await?;
        let model = self.registry.get_version(uri.name(), version).await?;
        tracing::debug!(uri = %uri, version, source = %model.source_uri(), "resolved model URI");
        Ok(model)
    }

    /// Bytes of the artifact behind a `models:/` URI.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the URI does not resolve or the registered
    /// artifact is a directory rather than a single blob.
    pub async fn load_model_artifact(&self, uri: &ModelUri) -> Result<Vec<u8>> {
        let model = self.resolve_model(uri).await?;
        self.artifacts()
            .get(model.source_run_id(), model.source_artifact_path())
            .await
    }

    /// Every file of a directory-shaped model behind a `models:/` URI, as
    /// `(path relative to the model directory, bytes)`.
    ///
    /// A model registered from a single blob comes back as one entry named
    /// after its last path component.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the URI does not resolve or nothing is stored
    /// at the registered path.
    pub async fn load_model_artifacts(&self, uri: &ModelUri) -> Result<Vec<(String, Vec<u8>)>> {
        let model = self.resolve_model(uri).await?;
        let (run_id, path) = (model.source_run_id(), model.source_artifact_path());

        match self.artifacts().get(run_id, path).await {
            Ok(content) => {
                let name = path.rsplit('/').next().unwrap_or(path);
                Ok(vec![(name.to_string(), content)])
            }
            Err(Error::NotFound { .. }) => self.artifacts().get_dir(run_id, path).await,
            Err(e) => Err(e),
        }
    }

    /// Bytes behind a `runs:/` URI.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if nothing was written at that path.
    pub async fn resolve_artifact(&self, uri: &ArtifactUri) -> Result<Vec<u8>> {
        self.artifacts().get_uri(uri).await
    }
}
