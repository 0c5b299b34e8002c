//! Pipeline Lineage Example
//!
//! Walks a three-stage batch pipeline (preprocessing, training, promotion)
//! through one on-disk store, the way separate CI jobs would.
//!
//! Run with: cargo run --example pipeline_lineage

use std::collections::BTreeMap;

use lineage_db::client::LineageClient;
use lineage_db::config::TrackingConfig;
use lineage_db::tracking::RunOutcome;
use lineage_db::uri::ModelUri;

#[tokio::main]
async fn main() -> lineage_db::Result<()> {
    println!("=== Lineage-DB Pipeline Lineage ===\n");

    let store = std::env::temp_dir().join(format!("lineage-demo-{}", std::process::id()));
    let config = TrackingConfig::new(&format!("file:{}", store.display()))?;
    println!("Store: {}\n", store.display());

    // -------------------------------------------------------------------------
    // 1. Data preprocessing
    // -------------------------------------------------------------------------
    println!("1. Preprocessing...");
    let prep_client = LineageClient::new(&config);
    let tags = BTreeMap::from([("step".to_string(), "preprocessing".to_string())]);
    let prep = prep_client.runs().start_run("data-pipeline", tags).await?;
    prep_client.runs().log_param(&prep, "imputation", "median").await?;
    prep_client.runs().log_metric(&prep, "rows_before", 1000.0).await?;
    prep_client.runs().log_metric(&prep, "rows_after", 1800.0).await?;
    prep_client
        .runs()
        .log_artifact(&prep, "processed_data/train.csv", b"mean_ip,label\n".to_vec())
        .await?;
    prep_client.runs().finish_run(&prep, RunOutcome::Finished).await?;
    println!("   Run ID: {prep}");

    // -------------------------------------------------------------------------
    // 2. Training, handed only the run id
    // -------------------------------------------------------------------------
    println!("\n2. Training...");
    let train_client = LineageClient::new(&config);
    let train = train_client
        .start_child_run("model-training", BTreeMap::new(), &prep)
        .await?;
    for (epoch, accuracy) in [0.81, 0.88, 0.93].into_iter().enumerate() {
        let step = train_client.runs().log_metric(&train, "accuracy", accuracy).await?;
        println!("   epoch {epoch}: accuracy={accuracy} (step {step})");
    }
    train_client
        .runs()
        .log_artifact(&train, "pulsar-classifier-model", b"weights".to_vec())
        .await?;
    train_client.runs().finish_run(&train, RunOutcome::Finished).await?;
    println!("   Run ID: {train}");

    // -------------------------------------------------------------------------
    // 3. Registration and promotion
    // -------------------------------------------------------------------------
    println!("\n3. Registering...");
    let registry_client = LineageClient::new(&config);
    let version = registry_client
        .registry()
        .register("pulsar-classifier-prod", &train, "pulsar-classifier-model")
        .await?;
    registry_client
        .aliases()
        .set_alias("pulsar-classifier-prod", "champion", version)
        .await?;
    println!("   Registered version {version} as champion");

    // -------------------------------------------------------------------------
    // 4. Resolve and trace lineage
    // -------------------------------------------------------------------------
    println!("\n4. Resolving...");
    let champion = ModelUri::alias("pulsar-classifier-prod", "champion")?;
    let model = registry_client.resolve_model(&champion).await?;
    println!("   {champion} -> v{} ({})", model.version(), model.source_uri());

    for ancestor in registry_client.lineage().ancestors(model.source_run_id()).await? {
        let run = registry_client.runs().get_run(&ancestor).await?;
        println!(
            "   ancestor {} [{}] metrics={:?}",
            run.run_id(),
            run.experiment(),
            run.metrics()
        );
    }

    std::fs::remove_dir_all(&store)?;
    println!("\n=== Done ===");
    Ok(())
}
