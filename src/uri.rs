//! Artifact and model URIs.
//!
//! - `runs:/<run_id>/<relative_path>` addresses one artifact of one run
//! - `models:/<model_name>/<reference>` addresses a registered model, where
//!   the reference is an alias (`champion`), a version number (`3`) or
//!   `latest`

use crate::backend::{validate_relative_path, validate_segment};
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Scheme prefix of artifact URIs.
pub const RUNS_SCHEME: &str = "runs:/";

/// Scheme prefix of model URIs.
pub const MODELS_SCHEME: &str = "models:/";

/// Reserved model reference that resolves to the highest version.
pub const LATEST: &str = "latest";

/// `runs:/<run_id>/<relative_path>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactUri {
    run_id: String,
    path: String,
}

impl ArtifactUri {
    /// Build a URI from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a malformed run id or path.
    pub fn new(run_id: impl Into<String>, path: impl Into<String>) -> Result<Self> {
        let run_id = run_id.into();
        let path = path.into();
        validate_segment("run id", &run_id)?;
        validate_relative_path(&path)?;
        Ok(Self { run_id, path })
    }

    /// Parse `runs:/<run_id>/<relative_path>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the scheme or either part is wrong.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(RUNS_SCHEME)
            .ok_or_else(|| Error::InvalidArgument(format!("'{uri}' is not a runs:/ URI")))?;
        let (run_id, path) = rest.split_once('/').ok_or_else(|| {
            Error::InvalidArgument(format!("'{uri}' has no artifact path after the run id"))
        })?;
        Self::new(run_id, path)
    }

    /// Run the artifact belongs to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path relative to the run.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RUNS_SCHEME}{}/{}", self.run_id, self.path)
    }
}

impl FromStr for ArtifactUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// What a model URI points at within a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelReference {
    /// Mutable alias such as `champion`
    Alias(String),
    /// Concrete version number
    Version(u64),
    /// Highest registered version
    Latest,
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(alias) => f.write_str(alias),
            Self::Version(version) => write!(f, "{version}"),
            Self::Latest => f.write_str(LATEST),
        }
    }
}

/// `models:/<model_name>/<reference>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelUri {
    name: String,
    reference: ModelReference,
}

impl ModelUri {
    /// URI resolving `alias` of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a malformed name or alias.
    pub fn alias(name: impl Into<String>, alias: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let alias = alias.into();
        validate_segment("model name", &name)?;
        validate_alias(&alias)?;
        Ok(Self {
            name,
            reference: ModelReference::Alias(alias),
        })
    }

    /// Parse `models:/<model_name>/<reference>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the scheme or either part is wrong.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(MODELS_SCHEME)
            .ok_or_else(|| Error::InvalidArgument(format!("'{uri}' is not a models:/ URI")))?;
        let (name, reference) = rest.split_once('/').ok_or_else(|| {
            Error::InvalidArgument(format!("'{uri}' has no alias or version after the model name"))
        })?;
        validate_segment("model name", name)?;
        validate_segment("model reference", reference)?;

        let reference = if reference == LATEST {
            ModelReference::Latest
        } else if let Ok(version) = reference.parse::<u64>() {
            ModelReference::Version(version)
        } else {
            ModelReference::Alias(reference.to_string())
        };

        Ok(Self {
            name: name.to_string(),
            reference,
        })
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alias, version or `latest`.
    #[must_use]
    pub const fn reference(&self) -> &ModelReference {
        &self.reference
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MODELS_SCHEME}{}/{}", self.name, self.reference)
    }
}

impl FromStr for ModelUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Validate an alias string.
///
/// Aliases share the reference slot of model URIs with version numbers and
/// `latest`, so neither form may be used as an alias.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when the alias is rejected.
pub fn validate_alias(alias: &str) -> Result<()> {
    validate_segment("alias", alias)?;
    if alias.eq_ignore_ascii_case(LATEST) {
        return Err(Error::InvalidArgument(format!(
            "alias '{alias}' is reserved"
        )));
    }
    if alias.parse::<u64>().is_ok() {
        return Err(Error::InvalidArgument(format!(
            "alias '{alias}' would be read as a version number"
        )));
    }
    Ok(())
}
