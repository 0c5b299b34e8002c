//! Concurrent pipeline executions sharing one store
//!
//! Every client here is opened independently, the way two CI pipelines in
//! separate processes would open the same tracking URI. Nothing is shared
//! between tasks except the store itself.

use std::collections::{BTreeMap, BTreeSet};

use lineage_db::client::LineageClient;
use lineage_db::config::TrackingConfig;
use lineage_db::tracking::RunOutcome;
use lineage_db::Error;

const WRITERS: u64 = 16;

fn open(uri: &str) -> LineageClient {
    LineageClient::new(&TrackingConfig::new(uri).unwrap())
}

async fn finished_run_with_model(client: &LineageClient) -> String {
    let run_id = client
        .runs()
        .start_run("model-training", BTreeMap::new())
        .await
        .unwrap();
    client
        .runs()
        .log_artifact(&run_id, "model", b"weights".to_vec())
        .await
        .unwrap();
    client
        .runs()
        .finish_run(&run_id, RunOutcome::Finished)
        .await
        .unwrap();
    run_id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_versions_are_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("file:{}", dir.path().display());
    let run_id = finished_run_with_model(&open(&uri)).await;

    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let uri = uri.clone();
        let run_id = run_id.clone();
        handles.push(tokio::spawn(async move {
            open(&uri)
                .registry()
                .register("pulsar-classifier-prod", &run_id, "model")
                .await
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=WRITERS).collect::<Vec<_>>());

    let listed: Vec<u64> = open(&uri)
        .registry()
        .list_versions("pulsar-classifier-prod")
        .await
        .unwrap()
        .iter()
        .map(lineage_db::registry::ModelVersion::version)
        .collect();
    assert_eq!(listed, (1..=WRITERS).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_different_models_independent() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("file:{}", dir.path().display());
    let run_id = finished_run_with_model(&open(&uri)).await;

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let uri = uri.clone();
        let run_id = run_id.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("model-{}", i % 2);
            let version = open(&uri)
                .registry()
                .register(&name, &run_id, "model")
                .await
                .unwrap();
            (name, version)
        }));
    }

    let mut per_model: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
    for handle in handles {
        let (name, version) = handle.await.unwrap();
        assert!(per_model.entry(name).or_default().insert(version));
    }
    for versions in per_model.values() {
        assert_eq!(
            versions.iter().copied().collect::<Vec<_>>(),
            (1..=WRITERS / 2).collect::<Vec<_>>()
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_set_alias_last_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("file:{}", dir.path().display());
    let client = open(&uri);
    let run_id = finished_run_with_model(&client).await;
    client.registry().register("m", &run_id, "model").await.unwrap();
    client.registry().register("m", &run_id, "model").await.unwrap();
    client.aliases().set_alias("m", "champion", 1).await.unwrap();

    let mut writers = Vec::new();
    for i in 0..WRITERS {
        let uri = uri.clone();
        writers.push(tokio::spawn(async move {
            open(&uri)
                .aliases()
                .set_alias("m", "champion", 1 + i % 2)
                .await
        }));
    }
    let reader = {
        let uri = uri.clone();
        tokio::spawn(async move {
            let reader = open(&uri);
            for _ in 0..64 {
                let version = reader.aliases().resolve("m", "champion").await.unwrap();
                assert!(version == 1 || version == 2, "torn alias read: {version}");
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap().unwrap();
    }
    reader.await.unwrap();

    let version = client.aliases().resolve("m", "champion").await.unwrap();
    assert!(version == 1 || version == 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opposite_edges_admit_one() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("file:{}", dir.path().display());
    let client = open(&uri);
    let a = client.runs().start_run("a", BTreeMap::new()).await.unwrap();
    let b = client.runs().start_run("b", BTreeMap::new()).await.unwrap();

    let forward = {
        let (uri, a, b) = (uri.clone(), a.clone(), b.clone());
        tokio::spawn(async move { open(&uri).lineage().record_edge(&a, &b).await })
    };
    let backward = {
        let (uri, a, b) = (uri.clone(), a.clone(), b.clone());
        tokio::spawn(async move { open(&uri).lineage().record_edge(&b, &a).await })
    };
    let results = [forward.await.unwrap(), backward.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(Error::CycleDetected { .. }))));
    assert_eq!(client.lineage().edges().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_metric_appends_get_distinct_steps() {
    let client = LineageClient::new(&TrackingConfig::in_memory());
    let run_id = client
        .runs()
        .start_run("model-training", BTreeMap::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let client = client.clone();
        let run_id = run_id.clone();
        handles.push(tokio::spawn(async move {
            #[allow(clippy::cast_precision_loss)]
            let value = i as f64;
            client.runs().log_metric(&run_id, "loss", value).await.unwrap()
        }));
    }

    let mut steps = BTreeSet::new();
    for handle in handles {
        assert!(steps.insert(handle.await.unwrap()));
    }
    assert_eq!(steps.into_iter().collect::<Vec<_>>(), (0..WRITERS).collect::<Vec<_>>());
    assert_eq!(
        client.runs().metric_history(&run_id, "loss").await.unwrap().len(),
        usize::try_from(WRITERS).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_finish_first_outcome_wins() {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("file:{}", dir.path().display());
    let run_id = open(&uri)
        .runs()
        .start_run("prep", BTreeMap::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let uri = uri.clone();
        let run_id = run_id.clone();
        handles.push(tokio::spawn(async move {
            let outcome = if i % 2 == 0 {
                RunOutcome::Finished
            } else {
                RunOutcome::Failed
            };
            (outcome, open(&uri).runs().finish_run(&run_id, outcome).await)
        }));
    }

    let status = {
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        let status = open(&uri).runs().status(&run_id).await.unwrap();
        for (outcome, result) in results {
            if lineage_db::tracking::RunStatus::from(outcome) == status {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(Error::InvalidState(_))));
            }
        }
        status
    };
    assert!(status.is_terminal());
}
