//! Alias resolution: mutable names pointing at immutable versions
//!
//! ```text
//! models/<name>/aliases/<alias>   AliasBinding (atomically replaced)
//! ```
//!
//! Each binding is a single key written with an atomic replace, so a
//! concurrent reader observes either the previous or the new version and the
//! last writer wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ModelRegistry;
use crate::backend::{get_json, put_json, validate_segment, Backend};
use crate::uri::{validate_alias, ModelReference};
use crate::{Error, Result};

fn aliases_prefix(model_name: &str) -> String {
    format!("models/{model_name}/aliases/")
}

fn alias_key(model_name: &str, alias: &str) -> String {
    format!("models/{model_name}/aliases/{alias}")
}

/// Stored value of an alias.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasBinding {
    version: u64,
    updated_at: DateTime<Utc>,
}

impl AliasBinding {
    /// Version the alias points at.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// When the alias was last assigned.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Maps `(model_name, alias)` to a registered version.
#[derive(Debug)]
pub struct AliasResolver<B: Backend> {
    backend: Arc<B>,
    registry: ModelRegistry<B>,
}

impl<B: Backend> Clone for AliasResolver<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            registry: self.registry.clone(),
        }
    }
}

impl<B: Backend> AliasResolver<B> {
    /// Create a resolver; `registry` validates target versions.
    #[must_use]
    pub fn new(backend: Arc<B>, registry: ModelRegistry<B>) -> Self {
        Self { backend, registry }
    }

    /// Point `alias` of `model_name` at `version`, replacing any prior binding.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `version` is not a registered version
    /// - [`Error::InvalidArgument`] for a malformed or reserved alias
    pub async fn set_alias(&self, model_name: &str, alias: &str, version: u64) -> Result<()> {
        validate_segment("model name", model_name)?;
        validate_alias(alias)?;
        self.registry.get_version(model_name, version).await?;

        let binding = AliasBinding {
            version,
            updated_at: Utc::now(),
        };
        put_json(&*self.backend, &alias_key(model_name, alias), &binding).await?;

        tracing::info!(model_name, alias, version, "alias assigned");
        Ok(())
    }

    /// Version `alias` of `model_name` currently points at.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the alias is unbound.
    pub async fn resolve(&self, model_name: &str, alias: &str) -> Result<u64> {
        self.binding(model_name, alias)
            .await
            .map(|binding| binding.version())
    }

    /// Full binding of `alias`, including when it was assigned.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the alias is unbound.
    pub async fn binding(&self, model_name: &str, alias: &str) -> Result<AliasBinding> {
        validate_segment("model name", model_name)?;
        validate_segment("alias", alias)?;
        get_json(&*self.backend, &alias_key(model_name, alias))
            .await?
            .ok_or_else(|| Error::not_found("alias", format!("{model_name}@{alias}")))
    }

    /// Highest registered version; derived from the version list, not stored.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the model has no versions.
    pub async fn latest_version(&self, model_name: &str) -> Result<u64> {
        self.registry.latest_version(model_name).await
    }

    /// Resolve an alias, version number or `latest` to a concrete version.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the reference points at nothing.
    pub async fn resolve_reference(
        &self,
        model_name: &str,
        reference: &ModelReference,
    ) -> Result<u64> {
        match reference {
            ModelReference::Alias(alias) => self.resolve(model_name, alias).await,
            ModelReference::Version(version) => self
                .registry
                .get_version(model_name, *version)
                .await
                .map(|v| v.version()),
            ModelReference::Latest => self.latest_version(model_name).await,
        }
    }

    /// Every bound alias of `model_name`, sorted by alias.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn aliases(&self, model_name: &str) -> Result<BTreeMap<String, u64>> {
        validate_segment("model name", model_name)?;
        let prefix = aliases_prefix(model_name);
        let mut aliases = BTreeMap::new();
        for key in self.backend.list(&prefix).await? {
            let Some(alias) = key.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(binding) = get_json::<_, AliasBinding>(&*self.backend, &key).await? {
                aliases.insert(alias.to_string(), binding.version());
            }
        }
        Ok(aliases)
    }

    /// Unbind `alias`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the alias is unbound.
    pub async fn delete_alias(&self, model_name: &str, alias: &str) -> Result<()> {
        self.binding(model_name, alias).await?;
        self.backend.delete(&alias_key(model_name, alias)).await?;
        tracing::info!(model_name, alias, "alias removed");
        Ok(())
    }
}
