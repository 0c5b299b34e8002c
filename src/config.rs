//! Tracking configuration.
//!
//! A single environment variable, [`TRACKING_URI_ENV`], names the backing
//! store. [`TrackingEnv`] snapshots it. When it is absent
//! [`TrackingConfig::from_env`] falls back to [`DEFAULT_TRACKING_URI`] and
//! logs that it did so; entry points that must not guess (model registration
//! and promotion) use [`TrackingConfig::from_env_required`] instead.
//!
//! Configuration is always passed explicitly into the components built from
//! it. Nothing here is process-global.

use crate::backend::{AnyBackend, FsBackend, MemoryBackend};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use std::path::PathBuf;

/// Environment variable holding the tracking URI.
pub const TRACKING_URI_ENV: &str = "LINEAGE_TRACKING_URI";

/// Environment variable overriding the transient-error retry budget.
pub const RETRY_ATTEMPTS_ENV: &str = "LINEAGE_RETRY_ATTEMPTS";

/// Tracking URI used when [`TRACKING_URI_ENV`] is not set: a store directory
/// relative to the current working directory.
pub const DEFAULT_TRACKING_URI: &str = "file:./lineage-store";

/// Parsed location of the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingUri {
    /// `file:<path>`, `file://<path>` or a bare path
    File(PathBuf),
    /// `memory://`, process-local
    Memory,
}

impl TrackingUri {
    /// Parse a tracking URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for empty input or unsupported schemes.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::Configuration("tracking URI is empty".into()));
        }
        if uri == "memory://" || uri == "memory:" {
            return Ok(Self::Memory);
        }
        if let Some(path) = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("file:"))
        {
            if path.is_empty() {
                return Err(Error::Configuration(format!(
                    "tracking URI '{uri}' has no path"
                )));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(Error::Configuration(format!(
                "unsupported tracking URI scheme '{scheme}' in '{uri}' (expected file: or memory://)"
            )));
        }
        Ok(Self::File(PathBuf::from(uri)))
    }

    /// Open the backend this URI points at.
    #[must_use]
    pub fn open(&self) -> AnyBackend {
        match self {
            Self::File(path) => AnyBackend::Fs(FsBackend::new(path.clone())),
            Self::Memory => AnyBackend::Memory(MemoryBackend::new()),
        }
    }
}

/// Snapshot of the tracking environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingEnv {
    /// Value of [`TRACKING_URI_ENV`]
    pub tracking_uri: Option<String>,
    /// Value of [`RETRY_ATTEMPTS_ENV`]
    pub retry_attempts: Option<String>,
}

impl TrackingEnv {
    /// Read both variables from the process environment.
    #[must_use]
    pub fn read() -> Self {
        Self {
            tracking_uri: std::env::var(TRACKING_URI_ENV).ok(),
            retry_attempts: std::env::var(RETRY_ATTEMPTS_ENV).ok(),
        }
    }

    /// Replace the tracking URI when `uri` is given, e.g. by a command-line flag.
    #[must_use]
    pub fn with_tracking_uri(mut self, uri: Option<&str>) -> Self {
        if let Some(uri) = uri {
            self.tracking_uri = Some(uri.to_string());
        }
        self
    }
}

/// Configuration every component is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingConfig {
    tracking_uri: TrackingUri,
    retry: RetryPolicy,
}

impl TrackingConfig {
    /// Build a configuration from an explicit tracking URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URI cannot be parsed.
    pub fn new(tracking_uri: &str) -> Result<Self> {
        Ok(Self {
            tracking_uri: TrackingUri::parse(tracking_uri)?,
            retry: RetryPolicy::default(),
        })
    }

    /// In-memory configuration, for tests and single-process pipelines.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tracking_uri: TrackingUri::Memory,
            retry: RetryPolicy::default(),
        }
    }

    /// Resolve from an environment snapshot, using [`DEFAULT_TRACKING_URI`]
    /// when no tracking URI is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a value is present but invalid.
    pub fn from_env(env: &TrackingEnv) -> Result<Self> {
        if env.tracking_uri.is_none() {
            tracing::info!(
                default = DEFAULT_TRACKING_URI,
                "{TRACKING_URI_ENV} not set, using default tracking URI"
            );
        }
        Self::from_values(env.tracking_uri.as_deref(), env.retry_attempts.as_deref())
    }

    /// Resolve from an environment snapshot, failing if no tracking URI is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URI is missing or either value
    /// is invalid.
    pub fn from_env_required(env: &TrackingEnv) -> Result<Self> {
        let uri = env.tracking_uri.as_deref().ok_or_else(|| {
            Error::Configuration(format!("{TRACKING_URI_ENV} environment variable not set"))
        })?;
        Self::from_values(Some(uri), env.retry_attempts.as_deref())
    }

    /// Resolve from already-read values; `None` for the URI selects the default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid URI or retry count.
    pub fn from_values(tracking_uri: Option<&str>, retry_attempts: Option<&str>) -> Result<Self> {
        let mut config = Self::new(tracking_uri.unwrap_or(DEFAULT_TRACKING_URI))?;
        if let Some(raw) = retry_attempts {
            let attempts = raw.trim().parse::<u32>().map_err(|e| {
                Error::Configuration(format!("{RETRY_ATTEMPTS_ENV}='{raw}' is not a count: {e}"))
            })?;
            config.retry = config.retry.with_max_attempts(attempts);
        }
        Ok(config)
    }

    /// Location of the backing store.
    #[must_use]
    pub const fn tracking_uri(&self) -> &TrackingUri {
        &self.tracking_uri
    }

    /// Retry policy for transient store errors.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}
