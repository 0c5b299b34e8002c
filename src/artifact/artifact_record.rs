//! Artifact Record - content-addressed description of a stored blob

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Artifact Record describes one blob stored for a run.
///
/// The blob itself lives in the [`ArtifactStore`](super::ArtifactStore);
/// the record carries its content-addressable digest so two stages can
/// verify they are looking at the same bytes.
///
/// ## CAS Hash Format
///
/// The `cas_hash` follows the format: `algorithm:hex_digest`
///
/// Example:
/// - `sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    path: String,
    cas_hash: String,
    size_bytes: u64,
}

impl ArtifactRecord {
    /// Describe `content` stored at `path` of `run_id`.
    #[must_use]
    pub fn from_content(run_id: impl Into<String>, path: impl Into<String>, content: &[u8]) -> Self {
        Self {
            run_id: run_id.into(),
            path: path.into(),
            cas_hash: cas_hash(content),
            size_bytes: content.len() as u64,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the artifact path relative to the run.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the content-addressable hash.
    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// `runs:/<run_id>/<path>` for this artifact.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{}{}/{}", crate::uri::RUNS_SCHEME, self.run_id, self.path)
    }
}

/// `sha256:<hex>` digest of `content`.
#[must_use]
pub fn cas_hash(content: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(content)))
}
