//! Filesystem backend: one file per key under a root directory.
//!
//! Layout: every key segment is percent-encoded. Interior segments become
//! directories named `<encoded>@`, the final segment becomes a file named
//! `<encoded>`. Percent-encoding never emits a raw `@` or `+`, so a leaf can
//! never collide with a directory and in-flight temp files (`+tmp-<uuid>`)
//! can never collide with either.
//!
//! Atomicity comes from the filesystem:
//! - `put_if_absent` writes a temp file then `hard_link`s it into place,
//!   which fails with `AlreadyExists` if another writer got there first
//! - `put` writes a temp file then `rename`s it over the target
//!
//! Readers therefore never see a partially written value, and independent
//! processes sharing the directory observe the same write-once guarantees.

use super::Backend;
use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const DIR_SUFFIX: char = '@';
const TEMP_PREFIX: char = '+';

/// Directory-backed metadata and artifact store.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Create a backend rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_path<'a>(&self, segments: impl Iterator<Item = &'a str>) -> PathBuf {
        let mut path = self.root.clone();
        for segment in segments {
            path.push(format!("{}{DIR_SUFFIX}", urlencoding::encode(segment)));
        }
        path
    }

    fn leaf_path(&self, key: &str) -> PathBuf {
        let (parent, leaf) = key.rsplit_once('/').unwrap_or(("", key));
        let mut path = self.dir_path(parent.split('/').filter(|s| !s.is_empty()));
        path.push(urlencoding::encode(leaf).as_ref());
        path
    }

    async fn write_temp(&self, dir: &Path, value: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| transient("create directory", dir, &e))?;

        let tmp = dir.join(format!("{TEMP_PREFIX}tmp-{}", Uuid::now_v7().simple()));
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| transient("create", &tmp, &e))?;

        let written = match file.write_all(value).await {
            Ok(()) => file.sync_all().await.map_err(|e| transient("sync", &tmp, &e)),
            Err(e) => Err(transient("write", &tmp, &e)),
        };
        drop(file);
        keep_temp_if(written, tmp).await
    }
}

/// Hand back `tmp` after a successful write, or remove it and return the error.
async fn keep_temp_if(written: Result<()>, tmp: PathBuf) -> Result<PathBuf> {
    match written {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

fn transient(op: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::TransientStore(format!("{op} {}: {e}", path.display()))
}

fn parent_of(path: &Path) -> Result<&Path> {
    path.parent()
        .ok_or_else(|| Error::InvalidArgument(format!("key maps to root: {}", path.display())))
}

impl Backend for FsBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.leaf_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(transient("read", &path, &e)),
        }
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        let path = self.leaf_path(key);
        let tmp = self.write_temp(parent_of(&path)?, &value).await?;

        let linked = tokio::fs::hard_link(&tmp, &path).await;
        // The temp name is unique to this call; a leftover only wastes space.
        let _ = tokio::fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(transient("link", &path, &e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.leaf_path(key);
        let tmp = self.write_temp(parent_of(&path)?, &value).await?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(transient("rename", &path, &e));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.leaf_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(transient("remove", &path, &e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = self.dir_path(prefix.split('/').filter(|s| !s.is_empty()));
        let mut pending = vec![(start, prefix.to_string())];
        let mut keys = Vec::new();

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(transient("read directory", &dir, &e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| transient("read directory", &dir, &e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(TEMP_PREFIX) {
                    continue;
                }
                if let Some(encoded) = name.strip_suffix(DIR_SUFFIX) {
                    let segment = decode(encoded)?;
                    pending.push((entry.path(), format!("{key_prefix}{segment}/")));
                } else {
                    let segment = decode(&name)?;
                    keys.push(format!("{key_prefix}{segment}"));
                }
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }
}

fn decode(encoded: &str) -> Result<String> {
    urlencoding::decode(encoded)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| Error::TransientStore(format!("undecodable entry '{encoded}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, FsBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().join("store"));
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_if_absent_then_get() {
        let (_dir, store) = scratch();

        assert!(store
            .put_if_absent("artifacts/run1/model/weights.bin", b"abc".to_vec())
            .await
            .unwrap());
        assert_eq!(
            store.get("artifacts/run1/model/weights.bin").await.unwrap(),
            Some(b"abc".to_vec())
        );
    }

    #[tokio::test]
    async fn test_put_if_absent_rejects_second_writer() {
        let (_dir, store) = scratch();

        assert!(store.put_if_absent("k", b"one".to_vec()).await.unwrap());
        assert!(!store.put_if_absent("k", b"two".to_vec()).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"one".to_vec()));
    }

    #[tokio::test]
    async fn test_put_replaces_atomically() {
        let (_dir, store) = scratch();

        store.put("alias", b"1".to_vec()).await.unwrap();
        store.put("alias", b"2".to_vec()).await.unwrap();
        assert_eq!(store.get("alias").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_leaf_and_directory_with_same_name_coexist() {
        let (_dir, store) = scratch();

        store.put_if_absent("a/data", b"leaf".to_vec()).await.unwrap();
        store
            .put_if_absent("a/data/part-0", b"nested".to_vec())
            .await
            .unwrap();

        assert_eq!(store.get("a/data").await.unwrap(), Some(b"leaf".to_vec()));
        assert_eq!(
            store.list("a/").await.unwrap(),
            vec!["a/data", "a/data/part-0"]
        );
    }

    #[tokio::test]
    async fn test_list_decodes_unusual_segments() {
        let (_dir, store) = scratch();

        store.put("m/my model@v1+x/%", vec![]).await.unwrap();
        store.put("m/plain", vec![]).await.unwrap();

        assert_eq!(
            store.list("m/").await.unwrap(),
            vec!["m/my model@v1+x/%", "m/plain"]
        );
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let (_dir, store) = scratch();
        assert!(store.list("nothing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (_dir, store) = scratch();

        store.put_if_absent("x/y", b"1".to_vec()).await.unwrap();
        store.put_if_absent("x/y", b"2".to_vec()).await.unwrap();
        store.put("x/z", b"3".to_vec()).await.unwrap();

        let mut entries = std::fs::read_dir(store.root().join("x@"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["y", "z"]);
    }

    #[tokio::test]
    async fn test_failed_temp_write_is_removed() {
        let (dir, _store) = scratch();
        let tmp = dir.path().join("+tmp-failed");
        std::fs::write(&tmp, b"partial").unwrap();

        let failed = Err(Error::TransientStore("disk full".into()));
        assert!(keep_temp_if(failed, tmp.clone()).await.is_err());
        assert!(!tmp.exists());

        let kept = dir.path().join("+tmp-ok");
        std::fs::write(&kept, b"whole").unwrap();
        assert_eq!(keep_temp_if(Ok(()), kept.clone()).await.unwrap(), kept);
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn test_two_handles_share_state() {
        let (_dir, first) = scratch();
        let second = FsBackend::new(first.root().to_path_buf());

        assert!(first.put_if_absent("slot", b"a".to_vec()).await.unwrap());
        assert!(!second.put_if_absent("slot", b"b".to_vec()).await.unwrap());
        assert_eq!(second.get("slot").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = scratch();
        store.put("k", b"v".to_vec()).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
