//! Run Tracker - run lifecycle, params, metrics, tags and artifacts
//!
//! ## Storage Layout
//!
//! ```text
//! runs/<id>/meta                    RunMeta    (write-once, marks existence)
//! runs/<id>/outcome                 RunEnd     (write-once, first finish wins)
//! runs/<id>/params/<key>            String     (write-once)
//! runs/<id>/tags/<key>              String     (replaceable while RUNNING)
//! runs/<id>/metrics/<key>/<step>    MetricRecord
//! ```
//!
//! Splitting a run into independent keys means no call ever rewrites a
//! shared document: write-once keys map onto `put_if_absent`, and the
//! finalization record doubles as the status transition.
//!
//! ## Run Ownership
//!
//! Logging calls check that the run is RUNNING and then write, as two
//! separate store operations. A run has one owning process, so nothing else
//! finalizes it in between. If another process does call `finish_run` on a
//! run that is still being logged to, a write racing the finish can land
//! just after the outcome record. The outcome itself is never overwritten.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::run_record::{RunEnd, RunMeta};
use super::{MetricRecord, Run, RunOutcome, RunStatus};
use crate::artifact::{ArtifactRecord, ArtifactStore};
use crate::backend::{get_json, put_json, put_json_if_absent, validate_segment, Backend};
use crate::{Error, Result};

const NAMESPACE: &str = "runs";

fn meta_key(run_id: &str) -> String {
    format!("{NAMESPACE}/{run_id}/meta")
}

fn outcome_key(run_id: &str) -> String {
    format!("{NAMESPACE}/{run_id}/outcome")
}

fn section_prefix(run_id: &str, section: &str) -> String {
    format!("{NAMESPACE}/{run_id}/{section}/")
}

fn metric_key(run_id: &str, key: &str, step: u64) -> String {
    format!("{NAMESPACE}/{run_id}/metrics/{key}/{step:020}")
}

/// Records runs and everything logged against them.
#[derive(Debug)]
pub struct RunTracker<B: Backend> {
    backend: Arc<B>,
    artifacts: ArtifactStore<B>,
}

impl<B: Backend> Clone for RunTracker<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            artifacts: self.artifacts.clone(),
        }
    }
}

impl<B: Backend> RunTracker<B> {
    /// Create a tracker over a shared backend; artifacts go to the same backend.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        let artifacts = ArtifactStore::new(Arc::clone(&backend));
        Self { backend, artifacts }
    }

    /// Artifact store this tracker delegates to.
    #[must_use]
    pub const fn artifacts(&self) -> &ArtifactStore<B> {
        &self.artifacts
    }

    /// Start a new run in `experiment` with initial `tags`.
    ///
    /// Returns the freshly allocated run id (32 lowercase hex characters,
    /// time-ordered).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty experiment or malformed tag key.
    pub async fn start_run(
        &self,
        experiment: &str,
        tags: BTreeMap<String, String>,
    ) -> Result<String> {
        if experiment.trim().is_empty() {
            return Err(Error::InvalidArgument("experiment must not be empty".into()));
        }
        for key in tags.keys() {
            validate_segment("tag key", key)?;
        }

        let run_id = Uuid::now_v7().simple().to_string();

        // Tags first: a run only exists once its meta is written.
        for (key, value) in &tags {
            put_json(&*self.backend, &format!("{}{key}", section_prefix(&run_id, "tags")), value)
                .await?;
        }

        let meta = RunMeta {
            run_id: run_id.clone(),
            experiment: experiment.to_string(),
            started_at: Utc::now(),
        };
        if !put_json_if_absent(&*self.backend, &meta_key(&run_id), &meta).await? {
            return Err(Error::AlreadyExists(format!("run {run_id}")));
        }

        tracing::info!(run_id = %run_id, experiment, "run started");
        Ok(run_id)
    }

    /// Current status of a run.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub async fn status(&self, run_id: &str) -> Result<RunStatus> {
        self.load_meta(run_id).await?;
        Ok(self
            .load_end(run_id)
            .await?
            .map_or(RunStatus::Running, |end| end.outcome.into()))
    }

    /// Whether a run with this id exists.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn exists(&self, run_id: &str) -> Result<bool> {
        if validate_segment("run id", run_id).is_err() {
            return Ok(false);
        }
        self.backend.exists(&meta_key(run_id)).await
    }

    /// Record a write-once parameter.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the run does not exist
    /// - [`Error::InvalidState`] if the run is finalized
    /// - [`Error::DuplicateKey`] if `key` was already logged
    pub async fn log_param(&self, run_id: &str, key: &str, value: impl ToString) -> Result<()> {
        validate_segment("param key", key)?;
        self.ensure_running(run_id, "log param").await?;

        let value = value.to_string();
        let param_key = format!("{}{key}", section_prefix(run_id, "params"));
        if !put_json_if_absent(&*self.backend, &param_key, &value).await? {
            return Err(Error::DuplicateKey {
                run_id: run_id.to_string(),
                key: key.to_string(),
            });
        }

        tracing::debug!(run_id, key, value = %value, "param logged");
        Ok(())
    }

    /// Append a metric point.
    ///
    /// Re-logging a key appends to its history rather than overwriting; the
    /// returned step is the point's position in log order.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the run does not exist
    /// - [`Error::InvalidState`] if the run is finalized
    /// - [`Error::InvalidArgument`] for a non-finite value
    pub async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<u64> {
        validate_segment("metric key", key)?;
        if !value.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "metric '{key}' must be finite, got {value}"
            )));
        }
        self.ensure_running(run_id, "log metric").await?;

        let history_prefix = format!("{}{key}/", section_prefix(run_id, "metrics"));
        let mut step = self.backend.list(&history_prefix).await?.len() as u64;
        loop {
            let record = MetricRecord::new(run_id, key, step, value);
            if put_json_if_absent(&*self.backend, &metric_key(run_id, key, step), &record).await? {
                tracing::debug!(run_id, key, step, value, "metric logged");
                return Ok(step);
            }
            tracing::debug!(run_id, key, step, "metric step taken, advancing");
            step += 1;
        }
    }

    /// Set or replace a tag.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the run does not exist
    /// - [`Error::InvalidState`] if the run is finalized
    pub async fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        validate_segment("tag key", key)?;
        self.ensure_running(run_id, "set tag").await?;
        put_json(
            &*self.backend,
            &format!("{}{key}", section_prefix(run_id, "tags")),
            &value,
        )
        .await
    }

    /// Store an artifact for a running run.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the run does not exist
    /// - [`Error::InvalidState`] if the run is finalized
    /// - [`Error::AlreadyExists`] if the path was written before
    pub async fn log_artifact(
        &self,
        run_id: &str,
        path: &str,
        content: Vec<u8>,
    ) -> Result<ArtifactRecord> {
        self.ensure_running(run_id, "log artifact").await?;
        self.artifacts.put(run_id, path, content).await
    }

    /// Store a directory of artifacts under `dir` for a running run.
    ///
    /// # Errors
    ///
    /// Same as [`RunTracker::log_artifact`].
    pub async fn log_artifacts(
        &self,
        run_id: &str,
        dir: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<ArtifactRecord>> {
        self.ensure_running(run_id, "log artifacts").await?;
        self.artifacts.put_dir(run_id, dir, entries).await
    }

    /// Relative paths of every artifact a run produced, sorted.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub async fn list_artifacts(&self, run_id: &str) -> Result<Vec<String>> {
        self.load_meta(run_id).await?;
        self.artifacts.list(run_id).await
    }

    /// Finalize a run.
    ///
    /// Repeating the call with the same outcome is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the run does not exist
    /// - [`Error::InvalidState`] if the run was finalized with the other outcome
    pub async fn finish_run(&self, run_id: &str, outcome: RunOutcome) -> Result<()> {
        self.load_meta(run_id).await?;

        let end = RunEnd {
            outcome,
            ended_at: Utc::now(),
        };
        if put_json_if_absent(&*self.backend, &outcome_key(run_id), &end).await? {
            tracing::info!(run_id, status = %RunStatus::from(outcome), "run finished");
            return Ok(());
        }

        let existing = self
            .load_end(run_id)
            .await?
            .ok_or_else(|| Error::TransientStore(format!("outcome of run {run_id} vanished")))?;
        if existing.outcome == outcome {
            tracing::debug!(run_id, "run already finalized with same outcome");
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "run {run_id} is already {}, cannot mark it {}",
                RunStatus::from(existing.outcome),
                RunStatus::from(outcome)
            )))
        }
    }

    /// Snapshot of a run.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub async fn get_run(&self, run_id: &str) -> Result<Run> {
        let meta = self.load_meta(run_id).await?;
        let end = self.load_end(run_id).await?;
        let tags = self.load_strings(run_id, "tags").await?;
        let params = self.load_strings(run_id, "params").await?;

        let metrics_prefix = section_prefix(run_id, "metrics");
        let mut latest_keys: BTreeMap<String, String> = BTreeMap::new();
        for key in self.backend.list(&metrics_prefix).await? {
            if let Some((metric, _step)) = key
                .strip_prefix(&metrics_prefix)
                .and_then(|rest| rest.rsplit_once('/'))
            {
                // Keys arrive sorted and steps are zero-padded, so the last
                // key seen per metric is its latest point.
                latest_keys.insert(metric.to_string(), key.clone());
            }
        }
        let mut metrics = BTreeMap::new();
        for (metric, key) in latest_keys {
            if let Some(record) = get_json::<_, MetricRecord>(&*self.backend, &key).await? {
                metrics.insert(metric, record.value());
            }
        }

        Ok(Run::assemble(meta, end, tags, params, metrics))
    }

    /// Every point logged for `key`, ordered by step.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the run does not exist.
    pub async fn metric_history(&self, run_id: &str, key: &str) -> Result<Vec<MetricRecord>> {
        validate_segment("metric key", key)?;
        self.load_meta(run_id).await?;

        let prefix = format!("{}{key}/", section_prefix(run_id, "metrics"));
        let mut history = Vec::new();
        for point_key in self.backend.list(&prefix).await? {
            if let Some(record) = get_json::<_, MetricRecord>(&*self.backend, &point_key).await? {
                history.push(record);
            }
        }
        history.sort_by_key(MetricRecord::step);
        Ok(history)
    }

    /// Runs in `experiment` (or all runs), ordered by start time.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list_runs(&self, experiment: Option<&str>) -> Result<Vec<Run>> {
        let mut metas = Vec::new();
        for key in self.backend.list(&format!("{NAMESPACE}/")).await? {
            let is_meta = key
                .strip_prefix(&format!("{NAMESPACE}/"))
                .and_then(|rest| rest.strip_suffix("/meta"))
                .is_some_and(|id| !id.contains('/'));
            if !is_meta {
                continue;
            }
            if let Some(meta) = get_json::<_, RunMeta>(&*self.backend, &key).await? {
                if experiment.map_or(true, |e| e == meta.experiment) {
                    metas.push(meta);
                }
            }
        }
        metas.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });

        let mut runs = Vec::with_capacity(metas.len());
        for meta in metas {
            runs.push(self.get_run(&meta.run_id).await?);
        }
        Ok(runs)
    }

    async fn load_meta(&self, run_id: &str) -> Result<RunMeta> {
        validate_segment("run id", run_id)?;
        get_json(&*self.backend, &meta_key(run_id))
            .await?
            .ok_or_else(|| Error::not_found("run", run_id))
    }

    async fn load_end(&self, run_id: &str) -> Result<Option<RunEnd>> {
        get_json(&*self.backend, &outcome_key(run_id)).await
    }

    async fn load_strings(&self, run_id: &str, section: &str) -> Result<BTreeMap<String, String>> {
        let prefix = section_prefix(run_id, section);
        let mut values = BTreeMap::new();
        for key in self.backend.list(&prefix).await? {
            if let Some(name) = key.strip_prefix(&prefix) {
                if let Some(value) = get_json::<_, String>(&*self.backend, &key).await? {
                    values.insert(name.to_string(), value);
                }
            }
        }
        Ok(values)
    }

    async fn ensure_running(&self, run_id: &str, action: &str) -> Result<()> {
        let status = self.status(run_id).await?;
        if status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "cannot {action}: run {run_id} is {status}"
            )));
        }
        Ok(())
    }
}
