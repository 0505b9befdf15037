//! Similarity and merge oracles.
//!
//! The compaction engine delegates two decisions it cannot make itself:
//! which documents belong together ([`Partitioner`]) and what their merged
//! form looks like ([`Synthesizer`]). Oracle output is untrusted; the engine
//! runs it through [`normalize_partition`] and [`normalize_merged`] straight
//! after each call. Ingest uses a third capability, [`Analyzer`], to label
//! a new document that arrives without metadata.
//!
//! Implementations:
//! - [`LexicalPartitioner`]: token-set Jaccard + union-find clustering.
//! - [`ConcatSynthesizer`]: deterministic concatenation with metadata union.
//! - [`ExcerptAnalyzer`]: summary taken from the leading text.
//! - [`LlmOracle`]: all three capabilities backed by a messages-style HTTP
//!   model endpoint, falling back to the deterministic behaviour on bad output.

mod concat;
mod excerpt;
mod lexical;
mod llm;

pub use concat::ConcatSynthesizer;
pub use excerpt::{ExcerptAnalyzer, SUMMARY_EXCERPT_CHARS, excerpt_metadata};
pub use lexical::{DEFAULT_THRESHOLD, LexicalPartitioner, jaccard, tokenize};
pub use llm::{HttpMessageClient, LlmConfig, LlmOracle, MessageClient, extract_json};

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::document::{Document, Metadata};
use crate::error::ErrorCode;

/// Directory used when nothing better can be derived.
pub const FALLBACK_DIRECTORY: &str = "misc-documents";

/// Directory name oracles use when they could not decide; always replaced.
const UNDECIDED_DIRECTORY: &str = "uncategorized";

/// Body of a merged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MergedContent {
    Text(String),
    Binary(Vec<u8>),
}

impl MergedContent {
    /// Bytes to store: text is UTF-8 encoded, binary passes through.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// The synthesized replacement for a merge group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDocument {
    pub directory: String,
    pub filename: String,
    pub content: MergedContent,
    pub metadata: Metadata,
}

/// Errors from oracle calls.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle response unusable: {0}")]
    InvalidResponse(String),

    #[error("cannot synthesize an empty group")]
    EmptyGroup,
}

impl OracleError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) | Self::Status { .. } => ErrorCode::OracleFailed,
            Self::InvalidResponse(_) | Self::EmptyGroup => ErrorCode::OracleResponseInvalid,
        }
    }
}

/// Splits a batch of documents into merge groups of keys.
///
/// Every input key should appear in exactly one group; singletons mean
/// "leave alone".
pub trait Partitioner {
    /// # Errors
    ///
    /// Returns [`OracleError`] when the oracle cannot be reached or refuses.
    fn partition(&self, documents: &[Document]) -> Result<Vec<Vec<String>>, OracleError>;
}

/// Produces one merged document from a group of two or more documents.
pub trait Synthesizer {
    /// # Errors
    ///
    /// Returns [`OracleError`] when the oracle cannot be reached or refuses.
    fn synthesize(&self, documents: &[Document]) -> Result<MergedDocument, OracleError>;
}

/// Describes a single document: summary, categories, and tags.
pub trait Analyzer {
    /// # Errors
    ///
    /// Returns [`OracleError`] when the oracle cannot be reached or refuses.
    fn analyze(&self, filename: &str, text: &str) -> Result<Metadata, OracleError>;
}

/// Validate a partition against the loaded key set.
///
/// Unknown keys are dropped, a key already placed in an earlier group is
/// dropped from later ones, and groups left empty disappear. Keys the oracle
/// forgot are not reinstated; they are simply left untouched by the run.
#[must_use]
pub fn normalize_partition(groups: Vec<Vec<String>>, known: &HashSet<&str>) -> Vec<Vec<String>> {
    let mut placed: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(groups.len());

    for group in groups {
        let mut kept = Vec::with_capacity(group.len());
        for key in group {
            if !known.contains(key.as_str()) {
                warn!("oracle returned unknown key {key}; dropping it");
                continue;
            }
            if !placed.insert(key.clone()) {
                warn!("oracle placed {key} in more than one group; keeping first placement");
                continue;
            }
            kept.push(key);
        }
        if !kept.is_empty() {
            out.push(kept);
        }
    }

    out
}

/// Fill in and sanitize the placement of a merged document.
///
/// - Directory: path segments trimmed of slashes with `.`/`..` removed;
///   empty or `uncategorized` is replaced by [`directory_from_metadata`].
/// - Filename: last path segment only; empty falls back to the base
///   filename of the group's first document.
#[must_use]
pub fn normalize_merged(mut merged: MergedDocument, group: &[Document]) -> MergedDocument {
    let directory = clean_segments(&merged.directory);
    merged.directory = if directory.is_empty() || directory == UNDECIDED_DIRECTORY {
        directory_from_metadata(&merged.metadata)
    } else {
        directory
    };

    let filename = clean_segments(&merged.filename)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    merged.filename = if filename.is_empty() {
        group
            .first()
            .map_or_else(|| "merged.md".to_string(), |d| d.base_filename().to_string())
    } else {
        filename
    };

    merged
}

fn clean_segments(raw: &str) -> String {
    raw.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive a kebab-case directory name from `categories` and `tags`.
///
/// Takes up to two categories, then tags until three keywords are collected,
/// keeps ASCII letters, digits, and hyphens, and collapses hyphen runs.
/// Returns [`FALLBACK_DIRECTORY`] when nothing usable remains.
#[must_use]
pub fn directory_from_metadata(metadata: &Metadata) -> String {
    let mut keywords: Vec<String> = metadata.values_of("categories").into_iter().take(2).collect();
    if keywords.len() < 3 {
        keywords.extend(metadata.values_of("tags").into_iter().take(2));
    }
    keywords.truncate(3);

    let joined = keywords.join("-").to_lowercase().replace(' ', "-");
    let mut name = String::with_capacity(joined.len());
    for c in joined.chars() {
        if !(c.is_ascii_alphanumeric() || c == '-') {
            continue;
        }
        if c == '-' && name.ends_with('-') {
            continue;
        }
        name.push(c);
    }
    let name = name.trim_matches('-');

    if name.is_empty() {
        FALLBACK_DIRECTORY.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known<'a>(keys: &[&'a str]) -> HashSet<&'a str> {
        keys.iter().copied().collect()
    }

    fn groups(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|g| g.iter().map(|k| (*k).to_string()).collect())
            .collect()
    }

    fn doc(key: &str) -> Document {
        Document::new(key, b"x".to_vec(), Metadata::new())
    }

    fn merged(directory: &str, filename: &str, metadata: Metadata) -> MergedDocument {
        MergedDocument {
            directory: directory.into(),
            filename: filename.into(),
            content: MergedContent::Text("body".into()),
            metadata,
        }
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let out = normalize_partition(groups(&[&["a", "ghost", "b"], &["phantom"]]), &known(&["a", "b"]));
        assert_eq!(out, groups(&[&["a", "b"]]));
    }

    #[test]
    fn repeated_keys_keep_first_placement() {
        let out = normalize_partition(groups(&[&["a", "b"], &["b", "c"]]), &known(&["a", "b", "c"]));
        assert_eq!(out, groups(&[&["a", "b"], &["c"]]));
    }

    #[test]
    fn missing_keys_are_not_reinstated() {
        let out = normalize_partition(groups(&[&["a"]]), &known(&["a", "b"]));
        assert_eq!(out, groups(&[&["a"]]));
    }

    #[test]
    fn directory_from_categories_and_tags() {
        let meta = Metadata::new()
            .with("categories", vec!["Data Guide".to_string(), "ETF".to_string()])
            .with("tags", "kospi, ranking");
        assert_eq!(directory_from_metadata(&meta), "data-guide-etf-kospi");
    }

    #[test]
    fn directory_strips_non_ascii_and_falls_back() {
        let meta = Metadata::new().with("categories", "기술문서");
        assert_eq!(directory_from_metadata(&meta), FALLBACK_DIRECTORY);
        assert_eq!(directory_from_metadata(&Metadata::new()), FALLBACK_DIRECTORY);

        let mixed = Metadata::new().with("tags", vec!["--a  b--".to_string()]);
        assert_eq!(directory_from_metadata(&mixed), "a-b");
    }

    #[test]
    fn merged_defaults_fill_directory_and_filename() {
        let meta = Metadata::new().with("categories", "reports");
        let out = normalize_merged(merged("", "", meta), &[doc("kb/x/first.md"), doc("kb/y/second.md")]);
        assert_eq!(out.directory, "reports");
        assert_eq!(out.filename, "first.md");
    }

    #[test]
    fn uncategorized_directory_is_replaced() {
        let out = normalize_merged(merged("uncategorized", "m.md", Metadata::new()), &[doc("kb/a.md")]);
        assert_eq!(out.directory, FALLBACK_DIRECTORY);
        assert_eq!(out.filename, "m.md");
    }

    #[test]
    fn merged_placement_cannot_escape_namespace() {
        let out = normalize_merged(merged("/../x/./y/", "../../etc/m.md", Metadata::new()), &[doc("kb/a.md")]);
        assert_eq!(out.directory, "x/y");
        assert_eq!(out.filename, "m.md");
    }

    #[test]
    fn content_encoding() {
        assert_eq!(MergedContent::Text("é".into()).into_bytes(), "é".as_bytes());
        assert_eq!(MergedContent::Binary(vec![0, 159]).into_bytes(), vec![0, 159]);
    }
}
