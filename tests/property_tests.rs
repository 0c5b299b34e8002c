//! Property-based tests for lineage-db
//!
//! - Test store invariants against a simple reference model
//! - Run with ProptestConfig::with_cases(..)
//! - Must complete in <30 seconds for pre-commit hook

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use lineage_db::backend::{Backend, FsBackend, MemoryBackend};
use lineage_db::ci::CiOutput;
use lineage_db::client::LineageClient;
use lineage_db::tracking::RunOutcome;
use lineage_db::Error;
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Artifact path of 1-3 safe segments
fn arb_artifact_path() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z0-9_-][a-z0-9_.-]{0,11}", 1..=3).prop_map(|s| s.join("/"))
}

/// Arbitrary blob, including empty
fn arb_content() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..2048)
}

/// Candidate lineage edges (child index, parent index) over `runs` runs
fn arb_edges(runs: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    proptest::collection::vec((0..runs, 0..runs), 0..24)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Whether `target` is reachable from `start` by following parent links.
fn reaches(parents: &HashMap<usize, Vec<usize>>, start: usize, target: usize) -> bool {
    let mut stack = vec![start];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if seen.insert(node) {
            stack.extend(parents.get(&node).into_iter().flatten().copied());
        }
    }
    false
}

async fn roundtrip<B: Backend>(client: &LineageClient<B>, path: &str, content: &[u8]) -> Vec<u8> {
    let run_id = client.runs().start_run("prep", BTreeMap::new()).await.unwrap();
    client
        .runs()
        .log_artifact(&run_id, path, content.to_vec())
        .await
        .unwrap();
    client.artifacts().get(&run_id, path).await.unwrap()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: get returns exactly the bytes put (memory backend)
    #[test]
    fn prop_artifact_roundtrip_memory(path in arb_artifact_path(), content in arb_content()) {
        let client = LineageClient::from_backend(Arc::new(MemoryBackend::new()));
        let stored = runtime().block_on(roundtrip(&client, &path, &content));
        prop_assert_eq!(stored, content);
    }

    /// Property: second put of the same key fails and the first bytes survive
    #[test]
    fn prop_artifact_write_once(
        path in arb_artifact_path(),
        first in arb_content(),
        second in arb_content()
    ) {
        let client = LineageClient::from_backend(Arc::new(MemoryBackend::new()));
        runtime().block_on(async {
            let run_id = client.runs().start_run("prep", BTreeMap::new()).await.unwrap();
            client.artifacts().put(&run_id, &path, first.clone()).await.unwrap();
            let again = client.artifacts().put(&run_id, &path, second).await;
            prop_assert!(matches!(again, Err(Error::AlreadyExists(_))));
            prop_assert_eq!(client.artifacts().get(&run_id, &path).await.unwrap(), first);
            Ok(())
        })?;
    }

    /// Property: record_edge accepts exactly the edges that keep the graph acyclic
    #[test]
    fn prop_lineage_rejects_exactly_cycles(edges in arb_edges(6)) {
        let client = LineageClient::from_backend(Arc::new(MemoryBackend::new()));
        runtime().block_on(async {
            let mut runs = Vec::new();
            for _ in 0..6 {
                runs.push(client.runs().start_run("stage", BTreeMap::new()).await.unwrap());
            }

            let mut model: HashMap<usize, Vec<usize>> = HashMap::new();
            let mut accepted = 0usize;
            for (child, parent) in edges {
                let duplicate = model.get(&child).is_some_and(|p| p.contains(&parent));
                let cycle = child == parent || reaches(&model, parent, child);
                let result = client.lineage().record_edge(&runs[child], &runs[parent]).await;

                if duplicate {
                    prop_assert!(result.is_ok());
                } else if cycle {
                    let is_cycle = matches!(result, Err(Error::CycleDetected { .. }));
                    prop_assert!(is_cycle);
                } else {
                    prop_assert!(result.is_ok());
                    model.entry(child).or_default().push(parent);
                    accepted += 1;
                }
                prop_assert_eq!(client.lineage().edges().await.unwrap().len(), accepted);
            }

            // No run is ever its own ancestor.
            for run in &runs {
                let ancestors: Vec<String> =
                    client.lineage().ancestors(run).await.unwrap().collect();
                prop_assert!(!ancestors.contains(run));
            }
            Ok(())
        })?;
    }

    /// Property: versions per model are 1..=n in registration order
    #[test]
    fn prop_register_versions_contiguous(models in proptest::collection::vec(0usize..3, 1..20)) {
        let client = LineageClient::from_backend(Arc::new(MemoryBackend::new()));
        runtime().block_on(async {
            let run_id = client.runs().start_run("train", BTreeMap::new()).await.unwrap();
            client.runs().log_artifact(&run_id, "model", vec![0]).await.unwrap();
            client.runs().finish_run(&run_id, RunOutcome::Finished).await.unwrap();

            let mut expected: HashMap<usize, u64> = HashMap::new();
            for model in models {
                let next = expected.entry(model).or_insert(0);
                *next += 1;
                let version = client
                    .registry()
                    .register(&format!("model-{model}"), &run_id, "model")
                    .await
                    .unwrap();
                prop_assert_eq!(version, *next);
            }
            Ok(())
        })?;
    }

    /// Property: every accepted CI pair becomes exactly one `key=value` line
    #[test]
    fn prop_ci_output_line_oriented(
        pairs in proptest::collection::vec(("[a-z_][a-z0-9_]{0,15}", "[ -~]{0,32}"), 1..8)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let output = CiOutput::new(dir.path().join("out"));
        for (key, value) in &pairs {
            output.append(key, value).unwrap();
        }

        let contents = std::fs::read_to_string(output.path()).unwrap();
        prop_assert!(contents.ends_with('\n'));
        let lines: Vec<(String, String)> = contents
            .lines()
            .map(|line| {
                let (k, v) = line.split_once('=').unwrap();
                (k.to_string(), v.to_string())
            })
            .collect();
        prop_assert_eq!(lines, pairs);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: get returns exactly the bytes put (filesystem backend)
    #[test]
    fn prop_artifact_roundtrip_filesystem(path in arb_artifact_path(), content in arb_content()) {
        let dir = tempfile::tempdir().unwrap();
        let client = LineageClient::from_backend(Arc::new(FsBackend::new(dir.path())));
        let stored = runtime().block_on(roundtrip(&client, &path, &content));
        prop_assert_eq!(stored, content);
    }
}
