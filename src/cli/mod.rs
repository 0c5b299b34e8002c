//! Command-line interface for pipeline stages
//!
//! Each pipeline stage is a separate process. Stages hand the run id (or the
//! registered version) to the next invocation through stdout and, inside CI,
//! through the CI output file.
//!
//! # Usage
//!
//! ```bash
//! RUN=$(lineage start data-pipeline --tag step=preprocessing)
//! lineage log-metric "$RUN" rows_before 1000
//! lineage log-artifact "$RUN" data.csv ./out/data.csv
//! lineage finish "$RUN"
//!
//! TRAIN=$(lineage start model-training --parent "$RUN")
//! lineage log-artifact "$TRAIN" pulsar-classifier-model ./out/model.bin
//! lineage finish "$TRAIN"
//!
//! lineage register "$TRAIN"
//! lineage promote pulsar-classifier-prod production
//! lineage resolve models:/pulsar-classifier-prod/champion
//! ```

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use commands::run_command;

/// Model name used by `register` when none is given.
pub const DEFAULT_MODEL_NAME: &str = "pulsar-classifier-prod";

/// Artifact path used by `register` when none is given.
pub const DEFAULT_MODEL_ARTIFACT: &str = "pulsar-classifier-model";

/// Alias assigned by `register` when none is given.
pub const DEFAULT_ALIAS: &str = "champion";

/// Lineage: pipeline run tracking and model registry
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "lineage")]
#[command(version)]
#[command(about = "Pipeline run lineage tracking and model registry")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Tracking store URI (overrides LINEAGE_TRACKING_URI)
    #[arg(long, global = true, value_name = "URI")]
    pub tracking_uri: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a run and print its id
    Start(StartArgs),

    /// Record a write-once parameter
    LogParam(KeyValueArgs),

    /// Append a metric value
    LogMetric(LogMetricArgs),

    /// Store a file as a run artifact
    LogArtifact(LogArtifactArgs),

    /// Set a tag on a running run
    SetTag(KeyValueArgs),

    /// Finalize a run
    Finish(FinishArgs),

    /// Register a finished run's artifact as a new model version
    Register(RegisterArgs),

    /// Point an alias at a model version
    Promote(PromoteArgs),

    /// Resolve a `models:/` or `runs:/` URI
    Resolve(ResolveArgs),

    /// List the transitive parents of a run
    Ancestors(RunArgs),
}

/// Arguments for the start command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StartArgs {
    /// Experiment the run belongs to
    pub experiment: String,

    /// Initial tag as KEY=VALUE (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub tags: Vec<(String, String)>,

    /// Upstream run whose output this run consumes
    #[arg(long, value_name = "RUN_ID")]
    pub parent: Option<String>,
}

/// Arguments for commands taking a run, a key and a string value
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct KeyValueArgs {
    /// Run id
    pub run_id: String,

    /// Key
    pub key: String,

    /// Value
    pub value: String,
}

/// Arguments for the log-metric command
#[derive(Args, Debug, Clone, PartialEq)]
#[command(allow_negative_numbers = true)]
pub struct LogMetricArgs {
    /// Run id
    pub run_id: String,

    /// Metric key
    pub key: String,

    /// Metric value
    pub value: f64,
}

/// Arguments for the log-artifact command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct LogArtifactArgs {
    /// Run id
    pub run_id: String,

    /// Artifact path within the run
    pub path: String,

    /// Local file to upload
    pub file: PathBuf,
}

/// Arguments for the finish command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct FinishArgs {
    /// Run id
    pub run_id: String,

    /// Mark the run FAILED instead of FINISHED
    #[arg(long)]
    pub failed: bool,
}

/// Arguments for the register command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RegisterArgs {
    /// Finished run that produced the model
    pub run_id: String,

    /// Registered model name
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// Artifact path of the model within the run
    #[arg(long, default_value = DEFAULT_MODEL_ARTIFACT)]
    pub artifact_path: String,

    /// Alias to point at the new version
    #[arg(long, default_value = DEFAULT_ALIAS, conflicts_with = "no_alias")]
    pub alias: String,

    /// Register without assigning an alias
    #[arg(long)]
    pub no_alias: bool,
}

/// Arguments for the promote command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PromoteArgs {
    /// Registered model name
    pub model_name: String,

    /// Alias to assign
    pub alias: String,

    /// Version to promote (default: latest)
    #[arg(long)]
    pub version: Option<u64>,
}

/// Arguments for the resolve command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ResolveArgs {
    /// `models:/<name>/<alias|version|latest>` or `runs:/<run_id>/<path>`
    pub uri: String,
}

/// Arguments for commands taking only a run id
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Run id
    pub run_id: String,
}

/// Parse CLI arguments from an iterator
///
/// # Errors
///
/// Returns the clap error for missing or malformed arguments.
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_parse_start_with_tags_and_parent() {
        let cli = parse_args([
            "lineage",
            "start",
            "model-training",
            "--tag",
            "step=training",
            "--tag",
            "owner=ci",
            "--parent",
            "abc",
        ])
        .unwrap();

        match cli.command {
            Command::Start(args) => {
                assert_eq!(args.experiment, "model-training");
                assert_eq!(
                    args.tags,
                    vec![
                        ("step".to_string(), "training".to_string()),
                        ("owner".to_string(), "ci".to_string())
                    ]
                );
                assert_eq!(args.parent.as_deref(), Some("abc"));
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_tag() {
        let err = parse_args(["lineage", "start", "exp", "--tag", "novalue"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_parse_register_defaults() {
        let cli = parse_args(["lineage", "register", "abc"]).unwrap();
        match cli.command {
            Command::Register(args) => {
                assert_eq!(args.run_id, "abc");
                assert_eq!(args.model_name, DEFAULT_MODEL_NAME);
                assert_eq!(args.artifact_path, DEFAULT_MODEL_ARTIFACT);
                assert_eq!(args.alias, DEFAULT_ALIAS);
                assert!(!args.no_alias);
            }
            _ => panic!("Expected Register command"),
        }
    }

    #[test]
    fn test_parse_register_missing_run_id() {
        let err = parse_args(["lineage", "register"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_promote_requires_alias() {
        let err = parse_args(["lineage", "promote", "pulsar-classifier-prod"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let cli = parse_args([
            "lineage",
            "promote",
            "pulsar-classifier-prod",
            "production",
            "--version",
            "3",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Promote(PromoteArgs {
                model_name: "pulsar-classifier-prod".into(),
                alias: "production".into(),
                version: Some(3),
            })
        );
    }

    #[test]
    fn test_parse_negative_metric() {
        let cli = parse_args(["lineage", "log-metric", "abc", "delta", "-0.5"]).unwrap();
        match cli.command {
            Command::LogMetric(args) => assert!((args.value + 0.5).abs() < f64::EPSILON),
            _ => panic!("Expected LogMetric command"),
        }
    }

    #[test]
    fn test_global_tracking_uri() {
        let cli = parse_args([
            "lineage",
            "ancestors",
            "abc",
            "--tracking-uri",
            "memory://",
        ])
        .unwrap();
        assert_eq!(cli.tracking_uri.as_deref(), Some("memory://"));
    }

    #[test]
    fn test_parse_finish_failed() {
        let cli = parse_args(["lineage", "finish", "abc", "--failed"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Finish(FinishArgs {
                run_id: "abc".into(),
                failed: true,
            })
        );
    }
}
