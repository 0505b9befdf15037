//! Corpus loading.

use tracing::{debug, warn};

use crate::document::{self, Document, Metadata};
use crate::store::ObjectStore;

/// Load every content object under `prefix` together with its sidecar.
///
/// Sidecar objects are not documents and are skipped by key. A content key
/// whose fetch fails is logged and left out; a missing or unreadable sidecar
/// yields empty metadata. Documents come back in listing order.
pub fn load_documents(store: &dyn ObjectStore, prefix: &str) -> Vec<Document> {
    let listing = store.list(prefix);
    let mut documents = Vec::with_capacity(listing.len() / 2 + 1);

    for object in listing {
        if document::is_sidecar_key(&object.key) {
            continue;
        }

        let content = match store.get(&object.key) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("failed to load document {}: {err}", object.key);
                continue;
            }
        };

        let metadata = load_metadata(store, &object.key);
        documents.push(Document::new(object.key, content, metadata));
    }

    documents
}

fn load_metadata(store: &dyn ObjectStore, key: &str) -> Metadata {
    let sidecar = document::sidecar_key(key);
    let bytes = match store.get(&sidecar) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("no sidecar for {key}: {err}");
            return Metadata::new();
        }
    };
    document::decode_sidecar(&bytes).unwrap_or_else(|err| {
        warn!("ignoring unreadable sidecar {sidecar}: {err}");
        Metadata::new()
    })
}
