//! CI output propagation
//!
//! CI systems hand values between steps through a file named by an
//! environment variable ([`CI_OUTPUT_ENV`]). Each step appends `key=value`
//! lines; the runner parses them after the step exits. This is how a run id
//! or version number produced by one stage reaches the next invocation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Environment variable naming the CI output file.
pub const CI_OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// Append-only, line-oriented writer for the CI output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiOutput {
    path: PathBuf,
}

impl CiOutput {
    /// Writer for an explicit output file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer for the file named by [`CI_OUTPUT_ENV`], or `None` outside CI.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var_os(CI_OUTPUT_ENV)
            .filter(|value| !value.is_empty())
            .map(Self::new)
    }

    /// Output file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `key=value` line.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the key is empty or contains `=` or a
    ///   line break, or the value contains a line break
    /// - [`Error::Io`] if the file cannot be opened or written
    pub fn append(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() || key.contains(['=', '\n', '\r']) {
            return Err(Error::InvalidArgument(format!(
                "CI output key '{}' must be non-empty without '=' or line breaks",
                key.escape_debug()
            )));
        }
        if value.contains(['\n', '\r']) {
            return Err(Error::InvalidArgument(format!(
                "CI output value for '{key}' must be a single line"
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // One write call per line keeps concurrent appenders from interleaving.
        file.write_all(format!("{key}={value}\n").as_bytes())?;

        tracing::debug!(key, value, path = %self.path.display(), "wrote CI output");
        Ok(())
    }
}
