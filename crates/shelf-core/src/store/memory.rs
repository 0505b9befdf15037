use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::{DeleteOutcome, ObjectInfo, ObjectStore, PutOutcome, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: Option<String>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Faults {
    put_prefixes: Vec<String>,
    get_keys: BTreeSet<String>,
    pinned_keys: BTreeSet<String>,
}

/// In-memory bucket.
///
/// Besides plain storage it can inject faults (failing puts under a prefix,
/// failing gets for a key, keys that refuse deletion) and records every
/// delete batch it receives, which makes it the default double for engine
/// tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RefCell<BTreeMap<String, StoredObject>>,
    faults: RefCell<Faults>,
    delete_log: RefCell<Vec<Vec<String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing fault injection.
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.borrow_mut().insert(
            key.into(),
            StoredObject {
                bytes: bytes.into(),
                content_type: None,
                modified: Utc::now(),
            },
        );
    }

    /// All keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.objects.borrow().contains_key(key)
    }

    /// Content type recorded by the last put of `key`.
    #[must_use]
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .borrow()
            .get(key)
            .and_then(|o| o.content_type.clone())
    }

    /// Make every put whose key starts with `prefix` fail.
    pub fn fail_puts_under(&self, prefix: impl Into<String>) {
        self.faults.borrow_mut().put_prefixes.push(prefix.into());
    }

    /// Make `get(key)` fail with an I/O error even if the object exists.
    pub fn fail_get(&self, key: impl Into<String>) {
        self.faults.borrow_mut().get_keys.insert(key.into());
    }

    /// Make `key` survive deletion; it will be reported under `errors`.
    pub fn pin(&self, key: impl Into<String>) {
        self.faults.borrow_mut().pinned_keys.insert(key.into());
    }

    /// Every key list passed to `delete_batch`, in call order.
    #[must_use]
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        self.delete_log.borrow().clone()
    }
}

impl ObjectStore for MemoryStore {
    fn list(&self, prefix: &str) -> Vec<ObjectInfo> {
        self.objects
            .borrow()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.bytes.len() as u64,
                last_modified: Some(obj.modified),
            })
            .collect()
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        if self.faults.borrow().get_keys.contains(key) {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::other("injected get failure"),
            });
        }
        self.objects
            .borrow()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> PutOutcome {
        let failing = self
            .faults
            .borrow()
            .put_prefixes
            .iter()
            .any(|p| key.starts_with(p.as_str()));
        if failing {
            return PutOutcome::Failed {
                error: format!("injected put failure for {key}"),
            };
        }

        self.objects.borrow_mut().insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.map(ToOwned::to_owned),
                modified: Utc::now(),
            },
        );
        PutOutcome::Stored {
            key: key.to_string(),
            location: format!("memory://{key}"),
        }
    }

    fn delete_batch(&self, keys: &[String]) -> DeleteOutcome {
        self.delete_log.borrow_mut().push(keys.to_vec());

        let faults = self.faults.borrow();
        let mut objects = self.objects.borrow_mut();
        let mut outcome = DeleteOutcome::default();
        for key in keys {
            if faults.pinned_keys.contains(key) {
                outcome.errors.push(format!("{key}: access denied"));
                continue;
            }
            // Absent keys count as deleted, matching bucket semantics.
            objects.remove(key);
            outcome.deleted.push(key.clone());
        }
        outcome.success = outcome.errors.is_empty();
        outcome
    }
}
