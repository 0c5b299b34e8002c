//! Backing store for run, lineage and registry metadata.
//!
//! Every component in this crate persists through the [`Backend`] trait,
//! which exposes four primitives over `/`-separated keys:
//!
//! - `get`: read a value
//! - `put_if_absent`: atomic create, the single conflict primitive
//! - `put`: atomic replace, readers see the old or the new value
//! - `list`: all keys under a prefix, sorted
//!
//! Write-once semantics (artifacts, params, model versions, run outcomes,
//! lineage log slots) are all expressed as `put_if_absent`. Nothing is ever
//! deleted except alias bindings.
//!
//! # Example
//!
//! ```rust
//! use lineage_db::backend::{Backend, MemoryBackend};
//!
//! # async fn example() -> lineage_db::Result<()> {
//! let store = MemoryBackend::new();
//!
//! assert!(store.put_if_absent("runs/abc/meta", b"{}".to_vec()).await?);
//! assert!(!store.put_if_absent("runs/abc/meta", b"[]".to_vec()).await?);
//! assert_eq!(store.get("runs/abc/meta").await?, Some(b"{}".to_vec()));
//! # Ok(())
//! # }
//! ```

mod fs;
mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

/// Key-value primitives the metadata store is built on.
///
/// Implementations must make `put_if_absent` and `put` atomic with respect
/// to concurrent callers, including callers in other processes when the
/// backend is shared between them.
pub trait Backend: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Create a key if it does not exist yet.
    ///
    /// Returns `false` (and leaves the stored value untouched) when the key
    /// is already present.
    fn put_if_absent(&self, key: &str, value: Vec<u8>)
        -> impl Future<Output = Result<bool>> + Send;

    /// Set a value for a key, atomically replacing any previous value.
    fn put(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Remove a key. No-op if the key doesn't exist.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// List every key under `prefix` (which must end with `/`), sorted.
    fn list(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }
}

/// Backend chosen at runtime from a tracking URI.
#[derive(Debug)]
pub enum AnyBackend {
    /// Process-local map
    Memory(MemoryBackend),
    /// Directory tree shared between processes
    Fs(FsBackend),
}

impl Backend for AnyBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Memory(b) => b.get(key).await,
            Self::Fs(b) => b.get(key).await,
        }
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        match self {
            Self::Memory(b) => b.put_if_absent(key, value).await,
            Self::Fs(b) => b.put_if_absent(key, value).await,
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        match self {
            Self::Memory(b) => b.put(key, value).await,
            Self::Fs(b) => b.put(key, value).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Self::Memory(b) => b.delete(key).await,
            Self::Fs(b) => b.delete(key).await,
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        match self {
            Self::Memory(b) => b.list(prefix).await,
            Self::Fs(b) => b.list(prefix).await,
        }
    }
}

/// Longest key segment accepted, measured after percent-encoding.
///
/// Filesystem stores turn each segment into one path component, and most
/// filesystems cap those at 255 bytes.
pub const MAX_SEGMENT_BYTES: usize = 200;

/// Validate a single caller-supplied key segment.
///
/// Segments must be non-empty, must not be `.` or `..`, must not contain
/// `/`, `\` or control characters, and must encode to at most
/// [`MAX_SEGMENT_BYTES`].
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] naming `kind` when the segment is rejected.
pub fn validate_segment(kind: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidArgument(format!("{kind} must not be empty")));
    }
    if segment == "." || segment == ".." {
        return Err(Error::InvalidArgument(format!(
            "{kind} must not be '{segment}'"
        )));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| *c == '/' || *c == '\\' || c.is_control())
    {
        return Err(Error::InvalidArgument(format!(
            "{kind} '{}' contains forbidden character {c:?}",
            segment.escape_debug()
        )));
    }
    let encoded_len = urlencoding::encode(segment).len();
    if encoded_len > MAX_SEGMENT_BYTES {
        return Err(Error::InvalidArgument(format!(
            "{kind} is {encoded_len} bytes once encoded, limit is {MAX_SEGMENT_BYTES}"
        )));
    }
    Ok(())
}

/// Validate a relative artifact path such as `model/weights.bin`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for absolute paths, empty components,
/// `.`/`..` components, or forbidden characters.
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "artifact path '{path}' must be relative"
        )));
    }
    path.split('/')
        .try_for_each(|segment| validate_segment("artifact path component", segment))
}

pub(crate) async fn get_json<B: Backend, T: DeserializeOwned>(
    backend: &B,
    key: &str,
) -> Result<Option<T>> {
    match backend.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) async fn put_json_if_absent<B: Backend, T: Serialize + Sync>(
    backend: &B,
    key: &str,
    value: &T,
) -> Result<bool> {
    let bytes = serde_json::to_vec(value)?;
    backend.put_if_absent(key, bytes).await
}

pub(crate) async fn put_json<B: Backend, T: Serialize + Sync>(
    backend: &B,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    backend.put(key, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_put_get() {
        let store = MemoryBackend::new();

        store.put("key1", b"value1".to_vec()).await.unwrap();
        let value = store.get("key1").await.unwrap();

        assert_eq!(value, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_backend_get_nonexistent() {
        let store = MemoryBackend::new();
        assert_eq!(store.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = MemoryBackend::new();

        store.put("key", b"value1".to_vec()).await.unwrap();
        store.put("key", b"value2".to_vec()).await.unwrap();

        assert_eq!(store.get("key").await.unwrap(), Some(b"value2".to_vec()));
    }

    #[tokio::test]
    async fn test_put_if_absent_keeps_first_value() {
        let store = MemoryBackend::new();

        assert!(store.put_if_absent("key", b"first".to_vec()).await.unwrap());
        assert!(!store.put_if_absent("key", b"second".to_vec()).await.unwrap());

        assert_eq!(store.get("key").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_exists_default_method() {
        let store = MemoryBackend::new();
        assert!(!store.exists("key").await.unwrap());
        store.put("key", vec![]).await.unwrap();
        assert!(store.exists("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_prefix_scoped_and_sorted() {
        let store = MemoryBackend::new();
        for key in ["a/2", "a/1", "a/sub/x", "ab/1", "b/1"] {
            store.put(key, vec![]).await.unwrap();
        }

        let keys = store.list("a/").await.unwrap();
        assert_eq!(keys, vec!["a/1", "a/2", "a/sub/x"]);
    }

    #[tokio::test]
    async fn test_concurrent_put_if_absent_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(MemoryBackend::new());
        let mut handles = vec![];

        for i in 0..50u8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.put_if_absent("slot", vec![i]).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_any_backend_dispatches_to_memory() {
        let store = AnyBackend::Memory(MemoryBackend::new());
        assert!(store.put_if_absent("k", b"v".to_vec()).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("model name", "pulsar-classifier").is_ok());
        assert!(validate_segment("model name", "").is_err());
        assert!(validate_segment("model name", "..").is_err());
        assert!(validate_segment("model name", "a/b").is_err());
        assert!(validate_segment("model name", "a\\b").is_err());
        assert!(validate_segment("model name", "a\nb").is_err());
    }

    #[test]
    fn test_validate_segment_length_counts_encoded_bytes() {
        assert!(validate_segment("param key", &"k".repeat(MAX_SEGMENT_BYTES)).is_ok());
        assert!(matches!(
            validate_segment("param key", &"k".repeat(MAX_SEGMENT_BYTES + 1)),
            Err(Error::InvalidArgument(_))
        ));
        // Each space encodes to three bytes.
        let spaced = " ".repeat(MAX_SEGMENT_BYTES / 3 + 1);
        assert!(validate_segment("param key", &spaced).is_err());
        assert!(validate_relative_path(&format!("model/{}", "w".repeat(300))).is_err());
    }

    #[test]
    fn test_validate_relative_path() {
        assert!(validate_relative_path("model").is_ok());
        assert!(validate_relative_path("model/weights.bin").is_ok());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("model/../escape").is_err());
        assert!(validate_relative_path("model//weights").is_err());
        assert!(validate_relative_path("model/").is_err());
    }
}
