//! Run Record - one execution of one pipeline stage

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a run.
///
/// Transitions are `Running -> Finished` or `Running -> Failed`, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is executing and accepts params, metrics, tags and artifacts.
    Running,
    /// Run completed successfully.
    Finished,
    /// Run failed.
    Failed,
}

impl RunStatus {
    /// Whether the run can no longer be mutated.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        })
    }
}

/// Terminal status passed to `finish_run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// Stage succeeded.
    Finished,
    /// Stage failed.
    Failed,
}

impl From<RunOutcome> for RunStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Finished => Self::Finished,
            RunOutcome::Failed => Self::Failed,
        }
    }
}

/// Immutable part of a run, written once by `start_run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct RunMeta {
    pub(crate) run_id: String,
    pub(crate) experiment: String,
    pub(crate) started_at: DateTime<Utc>,
}

/// Finalization record, written once by the first `finish_run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct RunEnd {
    pub(crate) outcome: RunOutcome,
    pub(crate) ended_at: DateTime<Utc>,
}

/// Snapshot of a run as returned by `get_run`.
///
/// `metrics` holds the most recent value of each key; the full history is
/// available through `RunTracker::metric_history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    run_id: String,
    experiment: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    tags: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
}

impl Run {
    pub(crate) fn assemble(
        meta: RunMeta,
        end: Option<RunEnd>,
        tags: BTreeMap<String, String>,
        params: BTreeMap<String, String>,
        metrics: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            run_id: meta.run_id,
            experiment: meta.experiment,
            status: end.as_ref().map_or(RunStatus::Running, |e| e.outcome.into()),
            started_at: meta.started_at,
            ended_at: end.map(|e| e.ended_at),
            tags,
            params,
            metrics,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the experiment label.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the end timestamp, if the run was finalized.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Tags, sorted by key.
    #[must_use]
    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Params, sorted by key.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Latest value of each metric, sorted by key.
    #[must_use]
    pub const fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    /// Look up a single tag.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Look up a single metric's latest value.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> RunMeta {
        RunMeta {
            run_id: "run-1".into(),
            experiment: "exp-1".into(),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_without_end_is_running() {
        let run = Run::assemble(meta(), None, BTreeMap::new(), BTreeMap::new(), BTreeMap::new());
        assert_eq!(run.status(), RunStatus::Running);
        assert!(run.ended_at().is_none());
    }

    #[test]
    fn test_status_from_end() {
        let end = RunEnd {
            outcome: RunOutcome::Failed,
            ended_at: Utc::now(),
        };
        let run = Run::assemble(meta(), Some(end), BTreeMap::new(), BTreeMap::new(), BTreeMap::new());
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.ended_at().unwrap() >= run.started_at());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&RunStatus::Finished).unwrap(), "\"FINISHED\"");
        assert_eq!(RunStatus::Running.to_string(), "RUNNING");
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
