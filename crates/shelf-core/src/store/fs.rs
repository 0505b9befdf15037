//! Directory-backed bucket.
//!
//! Keys are `/`-separated paths relative to the store root. Writes go through
//! a temporary sibling file followed by a rename so a crashed put never
//! leaves a truncated object behind under its real key.

use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{DeleteOutcome, ObjectInfo, ObjectStore, PutOutcome, StoreError};

const TMP_MARKER: &str = ".shelf-tmp";

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first put.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root, rejecting keys that would
    /// escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<ObjectInfo>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.walk(&path, prefix, out)?;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let Some(key) = self.key_for(&path) else {
                continue;
            };
            if key.contains(TMP_MARKER) || !key.starts_with(prefix) {
                continue;
            }
            let meta = entry.metadata()?;
            out.push(ObjectInfo {
                key,
                size: meta.len(),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        Ok(())
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "object path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        let tmp = parent.join(format!(".{file_name}{TMP_MARKER}"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)
    }

    /// Remove now-empty directories between `path` and the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

impl ObjectStore for FsStore {
    fn list(&self, prefix: &str) -> Vec<ObjectInfo> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return out;
        }
        if let Err(err) = self.walk(&self.root, prefix, &mut out) {
            warn!("listing {} under {} failed: {err}", prefix, self.root.display());
            return Vec::new();
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                StoreError::Io {
                    key: key.to_string(),
                    source,
                }
            }
        })
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> PutOutcome {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(err) => {
                return PutOutcome::Failed {
                    error: err.to_string(),
                };
            }
        };

        match Self::write_atomic(&path, bytes) {
            Ok(()) => {
                debug!(key, content_type, bytes = bytes.len(), "stored object");
                PutOutcome::Stored {
                    key: key.to_string(),
                    location: format!("file://{}", path.display()),
                }
            }
            Err(err) => PutOutcome::Failed {
                error: format!("write {key}: {err}"),
            },
        }
    }

    fn delete_batch(&self, keys: &[String]) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        for key in keys {
            let path = match self.path_for(key) {
                Ok(path) => path,
                Err(err) => {
                    outcome.errors.push(err.to_string());
                    continue;
                }
            };
            match fs::remove_file(&path) {
                Ok(()) => {
                    self.prune_empty_parents(&path);
                    outcome.deleted.push(key.clone());
                }
                // Deleting an absent key succeeds, as it does on a bucket.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    outcome.deleted.push(key.clone());
                }
                Err(err) => outcome.errors.push(format!("{key}: {err}")),
            }
        }
        outcome.success = outcome.errors.is_empty();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsStore) {
        let dir = TempDir::new().expect("create temp dir");
        let store = FsStore::new(dir.path().join("bucket"));
        (dir, store)
    }

    #[test]
    fn put_get_roundtrip_creates_parents() {
        let (_dir, store) = store();
        let outcome = store.put("kb/a/b.md", b"hello", Some("text/markdown"));
        assert!(outcome.is_success());
        assert_eq!(store.get("kb/a/b.md").unwrap(), b"hello");
    }

    #[test]
    fn list_is_sorted_and_prefix_scoped() {
        let (_dir, store) = store();
        store.put("kb/z.md", b"1", None);
        store.put("kb/a/x.md", b"22", None);
        store.put("compacted/y.md", b"3", None);

        let keys: Vec<_> = store.list("kb").into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["kb/a/x.md", "kb/z.md"]);
    }

    #[test]
    fn list_of_missing_root_is_empty() {
        let (_dir, store) = store();
        assert!(store.list("").is_empty());
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get("kb/none"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn keys_cannot_escape_root() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get("../secret"),
            Err(StoreError::InvalidKey { .. })
        ));
        assert!(!store.put("/etc/passwd", b"x", None).is_success());
        assert!(!store.put("", b"x", None).is_success());
    }

    #[test]
    fn delete_reports_absent_keys_as_deleted_and_prunes_dirs() {
        let (_dir, store) = store();
        store.put("kb/deep/one.md", b"1", None);

        let outcome = store.delete_batch(&["kb/deep/one.md".into(), "kb/deep/ghost.md".into()]);
        assert!(outcome.success);
        assert_eq!(outcome.deleted, vec!["kb/deep/one.md", "kb/deep/ghost.md"]);
        assert!(!store.root().join("kb").exists());
        assert!(store.root().exists());
    }

    #[test]
    fn delete_reports_invalid_keys_as_errors() {
        let (_dir, store) = store();
        let outcome = store.delete_batch(&["../x".into()]);
        assert!(!outcome.success);
        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }
}
