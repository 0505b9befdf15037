//! The compaction pipeline.
//!
//! A run walks `Loading → Grouping → (Merging → Writing → Deleting)* →
//! Syncing → Done` in a single sequential pass:
//!
//! 1. Load every document under the base namespace, skipping merged output
//!    when the compacted namespace sits inside it.
//! 2. Ask the [`Partitioner`] for merge groups and validate them.
//! 3. For each group with two or more resolved documents, synthesize the
//!    merged document, write it (plus sidecar) under the compacted
//!    namespace, and only then delete the originals and their sidecars.
//! 4. If anything was merged, start one index sync.
//!
//! A failed write skips its group and leaves the originals in place. Oracle
//! failures abort the run; groups already committed stay committed.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::document::{self, Document};
use crate::error::ErrorCode;
use crate::loader::load_documents;
use crate::oracle::{
    MergedDocument, OracleError, Partitioner, Synthesizer, normalize_merged, normalize_partition,
};
use crate::store::{ObjectStore, PutOutcome, object_key, put_with_metadata};
use crate::sync::{IndexSync, SyncOutcome};

/// Default namespace holding the live corpus.
pub const DEFAULT_BASE_PREFIX: &str = "knowledge-base";

/// Default namespace receiving merged output.
pub const DEFAULT_COMPACT_PREFIX: &str = "compacted-knowledge-base";

/// Where the corpus lives and where merged output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub base_prefix: String,
    pub compact_prefix: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PREFIX, DEFAULT_COMPACT_PREFIX)
    }
}

impl Layout {
    #[must_use]
    pub fn new(base_prefix: impl Into<String>, compact_prefix: impl Into<String>) -> Self {
        Self {
            base_prefix: base_prefix.into(),
            compact_prefix: compact_prefix.into(),
        }
    }

    /// Listing prefix for the corpus. A trailing slash keeps a base of
    /// `kb` from also matching `kb-archive/...`.
    #[must_use]
    pub fn corpus_prefix(&self) -> String {
        let base = self.base_prefix.trim_matches('/');
        if base.is_empty() {
            String::new()
        } else {
            format!("{base}/")
        }
    }

    /// Listing prefix for merged output, empty when it goes to the root.
    #[must_use]
    pub fn merged_prefix(&self) -> String {
        let compact = self.compact_prefix.trim_matches('/');
        if compact.is_empty() {
            String::new()
        } else {
            format!("{compact}/")
        }
    }

    /// Whether one namespace lists the other's keys.
    #[must_use]
    pub fn overlaps(&self) -> bool {
        let corpus = self.corpus_prefix();
        let merged = self.merged_prefix();
        merged.starts_with(&corpus) || corpus.starts_with(&merged)
    }

    /// Whether `key` is merged output that a corpus listing would also see.
    #[must_use]
    pub fn is_merged_output(&self, key: &str) -> bool {
        let merged = self.merged_prefix();
        !merged.is_empty() && merged.starts_with(&self.corpus_prefix()) && key.starts_with(&merged)
    }

    /// Directory under the compacted namespace for a merged document.
    #[must_use]
    pub fn merged_directory(&self, merged: &MergedDocument) -> String {
        object_key(self.compact_prefix.trim_matches('/'), &merged.directory)
    }
}

/// Knobs for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Analyse and merge in memory, but write, delete, and sync nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// A merge a dry run would have committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMerge {
    /// Key the merged document would be written to.
    pub target: String,
    /// Content keys it would replace.
    pub sources: Vec<String>,
}

/// Summary of a run, returned to the caller and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionResult {
    pub status: RunStatus,
    pub merged: usize,
    pub deleted: usize,
    pub deleted_keys: Vec<String>,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<PlannedMerge>,
}

impl CompactionResult {
    /// A completed run that touched nothing.
    #[must_use]
    pub const fn empty(dry_run: bool) -> Self {
        Self {
            status: RunStatus::Completed,
            merged: 0,
            deleted: 0,
            deleted_keys: Vec::new(),
            dry_run,
            planned: Vec::new(),
        }
    }

    /// A failed run; counts are zero regardless of partial progress.
    #[must_use]
    pub fn failed(dry_run: bool) -> Self {
        Self {
            status: RunStatus::Failed,
            ..Self::empty(dry_run)
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum CompactError {
    #[error("partitioning {documents} documents failed: {source}")]
    Partition {
        documents: usize,
        #[source]
        source: OracleError,
    },

    #[error("merging group {group:?} failed: {source}")]
    Merge {
        group: Vec<String>,
        #[source]
        source: OracleError,
    },
}

impl CompactError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Partition { source, .. } | Self::Merge { source, .. } => source.code(),
        }
    }
}

/// Runs compaction against borrowed collaborators.
pub struct CompactionEngine<'a> {
    layout: Layout,
    store: &'a dyn ObjectStore,
    partitioner: &'a dyn Partitioner,
    synthesizer: &'a dyn Synthesizer,
    index: &'a dyn IndexSync,
}

impl<'a> CompactionEngine<'a> {
    #[must_use]
    pub fn new(
        layout: Layout,
        store: &'a dyn ObjectStore,
        partitioner: &'a dyn Partitioner,
        synthesizer: &'a dyn Synthesizer,
        index: &'a dyn IndexSync,
    ) -> Self {
        Self {
            layout,
            store,
            partitioner,
            synthesizer,
            index,
        }
    }

    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Execute one compaction run.
    ///
    /// # Errors
    ///
    /// Returns [`CompactError`] when the partitioner or synthesizer fails.
    /// Store and index failures never surface here; they are logged and the
    /// affected group or step is skipped.
    pub fn run(&self, options: RunOptions) -> Result<CompactionResult, CompactError> {
        let prefix = self.layout.corpus_prefix();
        info!(prefix = %prefix, dry_run = options.dry_run, "loading corpus");
        let mut documents = load_documents(self.store, &prefix);
        if self.layout.overlaps() {
            warn!(
                base = %self.layout.base_prefix,
                compact = %self.layout.compact_prefix,
                "corpus and compacted namespaces overlap"
            );
            documents.retain(|d| !self.layout.is_merged_output(&d.key));
        }
        if documents.is_empty() {
            info!(prefix = %prefix, "no documents found");
            return Ok(CompactionResult::empty(options.dry_run));
        }
        info!(documents = documents.len(), "corpus loaded");

        let by_key: HashMap<&str, &Document> =
            documents.iter().map(|d| (d.key.as_str(), d)).collect();
        let known: HashSet<&str> = by_key.keys().copied().collect();

        let groups = self
            .partitioner
            .partition(&documents)
            .map_err(|source| CompactError::Partition {
                documents: documents.len(),
                source,
            })?;
        let groups = normalize_partition(groups, &known);
        info!(
            groups = groups.len(),
            mergeable = groups.iter().filter(|g| g.len() > 1).count(),
            "corpus partitioned"
        );

        let mut result = CompactionResult::empty(options.dry_run);
        for group in &groups {
            let members: Vec<Document> = group
                .iter()
                .filter_map(|key| by_key.get(key.as_str()).map(|d| (*d).clone()))
                .collect();
            if members.len() <= 1 {
                continue;
            }
            self.compact_group(group, &members, options, &mut result)?;
        }

        if result.merged > 0 && !options.dry_run {
            self.sync_index();
        }

        info!(
            merged = result.merged,
            deleted = result.deleted,
            dry_run = result.dry_run,
            "compaction complete"
        );
        Ok(result)
    }

    fn compact_group(
        &self,
        group: &[String],
        members: &[Document],
        options: RunOptions,
        result: &mut CompactionResult,
    ) -> Result<(), CompactError> {
        info!(size = members.len(), "merging group {group:?}");
        let merged = self
            .synthesizer
            .synthesize(members)
            .map_err(|source| CompactError::Merge {
                group: group.to_vec(),
                source,
            })?;
        let merged = normalize_merged(merged, members);
        let directory = self.layout.merged_directory(&merged);
        let target_key = object_key(&directory, &merged.filename);

        if options.dry_run {
            debug!(target_key = %target_key, "dry run: would write merged document");
            result.merged += 1;
            result.planned.push(PlannedMerge {
                target: target_key,
                sources: group.to_vec(),
            });
            return Ok(());
        }

        let MergedDocument {
            filename,
            content,
            metadata,
            ..
        } = merged;
        let outcome = put_with_metadata(
            self.store,
            &directory,
            &filename,
            &content.into_bytes(),
            &metadata,
            None,
        );
        if let PutOutcome::Failed { error } = outcome {
            error!(target_key = %target_key, error = %error, "failed to write merged document; keeping originals");
            return Ok(());
        }
        result.merged += 1;

        let target_sidecar = document::sidecar_key(&target_key);
        let keys: Vec<String> = group
            .iter()
            .flat_map(|key| [key.clone(), document::sidecar_key(key)])
            .filter(|key| *key != target_key && *key != target_sidecar)
            .collect();
        if keys.len() < group.len() * 2 {
            warn!(target_key = %target_key, "merged document replaced one of its sources in place");
        }
        let deleted = self.store.delete_batch(&keys);
        if !deleted.errors.is_empty() {
            warn!(
                target_key = %target_key,
                requested = keys.len(),
                deleted = deleted.deleted.len(),
                "some originals were not deleted: {}",
                deleted.errors.join("; ")
            );
        }
        debug!(target_key = %target_key, deleted = deleted.deleted.len(), "group committed");
        result.deleted += deleted.deleted.len();
        result.deleted_keys.extend(deleted.deleted);
        Ok(())
    }

    fn sync_index(&self) {
        info!("starting index sync");
        match self.index.start_sync() {
            SyncOutcome::Started { job_id, status } => {
                info!(job_id = %job_id, status = %status, "index sync started");
            }
            SyncOutcome::Failed { error } => {
                error!(error = %error, "index sync failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{MergedContent, MergedDocument};

    #[test]
    fn corpus_prefix_has_single_trailing_slash() {
        assert_eq!(Layout::new("kb", "out").corpus_prefix(), "kb/");
        assert_eq!(Layout::new("/kb/", "out").corpus_prefix(), "kb/");
        assert_eq!(Layout::new("", "out").corpus_prefix(), "");
    }

    #[test]
    fn nested_namespaces_overlap() {
        assert!(!Layout::default().overlaps());
        assert!(!Layout::new("kb", "kb-merged").overlaps());
        assert!(Layout::new("kb", "kb/merged").overlaps());
        assert!(Layout::new("kb/inbox", "kb").overlaps());
        assert!(Layout::new("", "merged").overlaps());
        assert!(Layout::new("kb", "/kb/").overlaps());
    }

    #[test]
    fn only_merged_output_inside_the_corpus_is_flagged() {
        let nested = Layout::new("kb", "kb/merged");
        assert!(nested.is_merged_output("kb/merged/topic/m.md"));
        assert!(!nested.is_merged_output("kb/notes/a.md"));

        // Corpus inside the compacted namespace: nothing is skipped.
        let outer = Layout::new("out/kb", "out");
        assert!(!outer.is_merged_output("out/kb/a.md"));
        assert!(!Layout::new("kb", "").is_merged_output("kb/a.md"));
    }

    #[test]
    fn merged_directory_nests_under_compact_prefix() {
        let merged = MergedDocument {
            directory: "reports".into(),
            filename: "q1.md".into(),
            content: MergedContent::Text(String::new()),
            metadata: crate::document::Metadata::new(),
        };
        assert_eq!(
            Layout::default().merged_directory(&merged),
            "compacted-knowledge-base/reports"
        );
    }

    #[test]
    fn failed_result_has_zero_counts() {
        let failed = CompactionResult::failed(true);
        assert!(failed.is_failed());
        assert_eq!(failed.merged, 0);
        assert_eq!(failed.deleted, 0);
        assert!(failed.deleted_keys.is_empty());
        assert!(failed.dry_run);
    }

    #[test]
    fn result_serializes_status_lowercase() {
        let json = serde_json::to_value(CompactionResult::empty(false)).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("planned").is_none());
    }
}
