//! Lineage Graph - parent/child relationships between runs
//!
//! Edges are kept in an append-only log:
//!
//! ```text
//! lineage/log/<seq>   LineageEdge { child, parent }
//! ```
//!
//! A writer reads the whole log, checks the new edge against it, and claims
//! slot `len` with `put_if_absent`. Losing the slot means another edge was
//! appended in the meantime, so the writer re-reads and re-checks. No edge
//! is therefore ever inserted without a cycle check against every edge that
//! precedes it, even with writers in different processes.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::backend::{get_json, put_json_if_absent, Backend};
use crate::tracking::RunTracker;
use crate::{Error, Result};

const LOG_PREFIX: &str = "lineage/log/";

fn slot_key(seq: usize) -> String {
    format!("{LOG_PREFIX}{seq:020}")
}

/// One recorded "child consumed parent's output" relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineageEdge {
    child: String,
    parent: String,
    recorded_at: DateTime<Utc>,
}

impl LineageEdge {
    /// Run that consumed the artifacts.
    #[must_use]
    pub fn child(&self) -> &str {
        &self.child
    }

    /// Run whose artifacts were consumed.
    #[must_use]
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// When the edge was recorded.
    #[must_use]
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Adjacency lists in edge-insertion order.
#[derive(Debug, Default, Clone)]
struct Adjacency {
    parents: FxHashMap<String, Vec<String>>,
    children: FxHashMap<String, Vec<String>>,
}

impl Adjacency {
    fn from_edges(edges: &[LineageEdge]) -> Self {
        let mut adjacency = Self::default();
        for edge in edges {
            adjacency
                .parents
                .entry(edge.child.clone())
                .or_default()
                .push(edge.parent.clone());
            adjacency
                .children
                .entry(edge.parent.clone())
                .or_default()
                .push(edge.child.clone());
        }
        adjacency
    }
}

/// Breadth-first walk over one direction of the graph.
///
/// Produced from a snapshot of the edge log; each run is yielded once, in
/// breadth-first order with neighbours visited in edge-insertion order.
#[derive(Debug)]
pub struct Traversal {
    edges: FxHashMap<String, Vec<String>>,
    queue: VecDeque<String>,
    visited: FxHashSet<String>,
}

impl Traversal {
    fn new(edges: FxHashMap<String, Vec<String>>, start: &str) -> Self {
        let mut traversal = Self {
            edges,
            queue: VecDeque::new(),
            visited: FxHashSet::default(),
        };
        traversal.visited.insert(start.to_string());
        traversal.enqueue_neighbours(start);
        traversal
    }

    fn enqueue_neighbours(&mut self, run_id: &str) {
        if let Some(neighbours) = self.edges.get(run_id) {
            for next in neighbours {
                if self.visited.insert(next.clone()) {
                    self.queue.push_back(next.clone());
                }
            }
        }
    }
}

impl Iterator for Traversal {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let run_id = self.queue.pop_front()?;
        self.enqueue_neighbours(&run_id);
        Some(run_id)
    }
}

/// Append-only DAG of run lineage.
#[derive(Debug)]
pub struct LineageGraph<B: Backend> {
    backend: Arc<B>,
    runs: RunTracker<B>,
}

impl<B: Backend> Clone for LineageGraph<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            runs: self.runs.clone(),
        }
    }
}

impl<B: Backend> LineageGraph<B> {
    /// Create a graph over a shared backend; `runs` validates run ids.
    #[must_use]
    pub fn new(backend: Arc<B>, runs: RunTracker<B>) -> Self {
        Self { backend, runs }
    }

    /// Record that `child_run_id` consumed output of `parent_run_id`.
    ///
    /// Recording an edge that already exists is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownRun`] if either run does not exist
    /// - [`Error::CycleDetected`] if `parent_run_id` already descends from
    ///   `child_run_id` (or they are the same run); the graph is unchanged
    pub async fn record_edge(&self, child_run_id: &str, parent_run_id: &str) -> Result<()> {
        for run_id in [child_run_id, parent_run_id] {
            if !self.runs.exists(run_id).await? {
                return Err(Error::UnknownRun(run_id.to_string()));
            }
        }
        let cycle = || Error::CycleDetected {
            child: child_run_id.to_string(),
            parent: parent_run_id.to_string(),
        };
        if child_run_id == parent_run_id {
            return Err(cycle());
        }

        loop {
            let edges = self.edges().await?;
            if edges
                .iter()
                .any(|e| e.child == child_run_id && e.parent == parent_run_id)
            {
                tracing::debug!(child_run_id, parent_run_id, "lineage edge already recorded");
                return Ok(());
            }

            let adjacency = Adjacency::from_edges(&edges);
            if Traversal::new(adjacency.parents, parent_run_id).any(|a| a == child_run_id) {
                return Err(cycle());
            }

            let edge = LineageEdge {
                child: child_run_id.to_string(),
                parent: parent_run_id.to_string(),
                recorded_at: Utc::now(),
            };
            let seq = edges.len();
            if put_json_if_absent(&*self.backend, &slot_key(seq), &edge).await? {
                tracing::info!(child_run_id, parent_run_id, seq, "lineage edge recorded");
                return Ok(());
            }
            tracing::debug!(seq, "lineage log slot taken, re-checking");
        }
    }

    /// Every edge in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn edges(&self) -> Result<Vec<LineageEdge>> {
        let mut edges = Vec::new();
        for key in self.backend.list(LOG_PREFIX).await? {
            if let Some(edge) = get_json(&*self.backend, &key).await? {
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    /// All transitive parents of `run_id`, breadth-first by insertion order.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownRun`] if the run does not exist.
    pub async fn ancestors(&self, run_id: &str) -> Result<Traversal> {
        self.ensure_known(run_id).await?;
        let adjacency = Adjacency::from_edges(&self.edges().await?);
        Ok(Traversal::new(adjacency.parents, run_id))
    }

    /// All transitive children of `run_id`, breadth-first by insertion order.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownRun`] if the run does not exist.
    pub async fn descendants(&self, run_id: &str) -> Result<Traversal> {
        self.ensure_known(run_id).await?;
        let adjacency = Adjacency::from_edges(&self.edges().await?);
        Ok(Traversal::new(adjacency.children, run_id))
    }

    /// Direct parents of `run_id` in insertion order.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownRun`] if the run does not exist.
    pub async fn parents(&self, run_id: &str) -> Result<Vec<String>> {
        self.ensure_known(run_id).await?;
        Ok(self
            .edges()
            .await?
            .into_iter()
            .filter(|e| e.child == run_id)
            .map(|e| e.parent)
            .collect())
    }

    async fn ensure_known(&self, run_id: &str) -> Result<()> {
        if self.runs.exists(run_id).await? {
            Ok(())
        } else {
            Err(Error::UnknownRun(run_id.to_string()))
        }
    }
}
