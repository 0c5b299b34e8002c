//! CLI command implementations

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use super::{
    Cli, Command, FinishArgs, KeyValueArgs, LogArtifactArgs, LogMetricArgs, PromoteArgs,
    RegisterArgs, ResolveArgs, RunArgs, StartArgs,
};
use crate::backend::Backend;
use crate::ci::CiOutput;
use crate::client::LineageClient;
use crate::config::{TrackingConfig, TrackingEnv};
use crate::tracking::RunOutcome;
use crate::uri::{ArtifactUri, ModelUri, MODELS_SCHEME, RUNS_SCHEME};

/// Execute a CLI command based on the parsed arguments
///
/// Results meant for the next pipeline stage go to stdout and, inside CI, to
/// the CI output file.
///
/// # Errors
///
/// Returns any configuration, store or I/O failure with context attached.
pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let env = TrackingEnv::read();
    let ci = CiOutput::from_env();
    let mut stdout = std::io::stdout();
    run_with_env(cli, env, ci.as_ref(), &mut stdout).await
}

async fn run_with_env<W: Write + Send>(
    cli: Cli,
    env: TrackingEnv,
    ci: Option<&CiOutput>,
    out: &mut W,
) -> anyhow::Result<()> {
    let env = env.with_tracking_uri(cli.tracking_uri.as_deref());
    // Registration and promotion must not silently write to the default store.
    let config = if matches!(cli.command, Command::Register(_) | Command::Promote(_)) {
        TrackingConfig::from_env_required(&env)?
    } else {
        TrackingConfig::from_env(&env)?
    };
    let client = LineageClient::new(&config);
    execute(&client, cli.command, ci, out).await
}

pub(crate) async fn execute<B, W>(
    client: &LineageClient<B>,
    command: Command,
    ci: Option<&CiOutput>,
    out: &mut W,
) -> anyhow::Result<()>
where
    B: Backend,
    W: Write + Send,
{
    match command {
        Command::Start(args) => run_start(client, args, ci, out).await,
        Command::LogParam(KeyValueArgs { run_id, key, value }) => {
            client.runs().log_param(&run_id, &key, value).await?;
            Ok(())
        }
        Command::LogMetric(LogMetricArgs { run_id, key, value }) => {
            client.runs().log_metric(&run_id, &key, value).await?;
            Ok(())
        }
        Command::LogArtifact(args) => run_log_artifact(client, args, out).await,
        Command::SetTag(KeyValueArgs { run_id, key, value }) => {
            client.runs().set_tag(&run_id, &key, &value).await?;
            Ok(())
        }
        Command::Finish(FinishArgs { run_id, failed }) => {
            let outcome = if failed {
                RunOutcome::Failed
            } else {
                RunOutcome::Finished
            };
            client.runs().finish_run(&run_id, outcome).await?;
            Ok(())
        }
        Command::Register(args) => run_register(client, args, ci, out).await,
        Command::Promote(args) => run_promote(client, args, out).await,
        Command::Resolve(args) => run_resolve(client, args, out).await,
        Command::Ancestors(RunArgs { run_id }) => {
            for ancestor in client.lineage().ancestors(&run_id).await? {
                writeln!(out, "{ancestor}")?;
            }
            Ok(())
        }
    }
}

async fn run_start<B: Backend, W: Write + Send>(
    client: &LineageClient<B>,
    args: StartArgs,
    ci: Option<&CiOutput>,
    out: &mut W,
) -> anyhow::Result<()> {
    let tags: BTreeMap<String, String> = args.tags.into_iter().collect();
    let run_id = match args.parent {
        Some(parent) => client
            .start_child_run(&args.experiment, tags, &parent)
            .await
            .with_context(|| format!("failed to start child run of {parent}"))?,
        None => client.runs().start_run(&args.experiment, tags).await?,
    };

    writeln!(out, "{run_id}")?;
    if let Some(ci) = ci {
        ci.append("run_id", &run_id)?;
    }
    Ok(())
}

async fn run_log_artifact<B: Backend, W: Write + Send>(
    client: &LineageClient<B>,
    args: LogArtifactArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let metadata = tokio::fs::metadata(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    if metadata.is_dir() {
        let entries = read_dir_entries(&args.file).await?;
        let records = client
            .runs()
            .log_artifacts(&args.run_id, &args.path, entries)
            .await?;
        for record in records {
            writeln!(out, "{}", record.uri())?;
        }
    } else {
        let content = tokio::fs::read(&args.file)
            .await
            .with_context(|| format!("failed to read {}", args.file.display()))?;
        let record = client
            .runs()
            .log_artifact(&args.run_id, &args.path, content)
            .await?;
        writeln!(out, "{}", record.uri())?;
    }
    Ok(())
}

/// Every file below `root` as `(relative/path, bytes)`.
async fn read_dir_entries(root: &Path) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
    let mut entries = Vec::new();
    let mut pending: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut listing = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to list {}", dir.display()))?;
        while let Some(entry) = listing.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), relative));
            } else {
                let content = tokio::fs::read(entry.path())
                    .await
                    .with_context(|| format!("failed to read {}", entry.path().display()))?;
                entries.push((relative, content));
            }
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

async fn run_register<B: Backend, W: Write + Send>(
    client: &LineageClient<B>,
    args: RegisterArgs,
    ci: Option<&CiOutput>,
    out: &mut W,
) -> anyhow::Result<()> {
    let version = client
        .registry()
        .register(&args.model_name, &args.run_id, &args.artifact_path)
        .await
        .with_context(|| {
            format!(
                "failed to register '{}' from {RUNS_SCHEME}{}/{}",
                args.model_name, args.run_id, args.artifact_path
            )
        })?;

    // The version is visible from here on even if aliasing fails below.
    writeln!(out, "{version}")?;
    if let Some(ci) = ci {
        ci.append("version", &version.to_string())?;
        ci.append("model_name", &args.model_name)?;
    }

    if !args.no_alias {
        client
            .aliases()
            .set_alias(&args.model_name, &args.alias, version)
            .await
            .with_context(|| {
                format!("registered version {version} but failed to set alias '{}'", args.alias)
            })?;
    }
    Ok(())
}

async fn run_promote<B: Backend, W: Write + Send>(
    client: &LineageClient<B>,
    args: PromoteArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let version = match args.version {
        Some(version) => version,
        None => client
            .aliases()
            .latest_version(&args.model_name)
            .await
            .with_context(|| format!("no versions found for model '{}'", args.model_name))?,
    };
    client
        .aliases()
        .set_alias(&args.model_name, &args.alias, version)
        .await?;

    writeln!(out, "{version}")?;
    Ok(())
}

async fn run_resolve<B: Backend, W: Write + Send>(
    client: &LineageClient<B>,
    args: ResolveArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    if args.uri.starts_with(MODELS_SCHEME) {
        let uri = ModelUri::parse(&args.uri)?;
        let model = client.resolve_model(&uri).await?;
        writeln!(out, "{} {}", model.version(), model.source_uri())?;
    } else if args.uri.starts_with(RUNS_SCHEME) {
        let uri = ArtifactUri::parse(&args.uri)?;
        let content = client.resolve_artifact(&uri).await?;
        out.write_all(&content)?;
        out.flush()?;
    } else {
        bail!("unsupported URI '{}': expected {MODELS_SCHEME} or {RUNS_SCHEME}", args.uri);
    }
    Ok(())
}
