use super::{Analyzer, OracleError};
use crate::document::Metadata;

/// Characters of text kept as a summary when nothing better is available.
pub const SUMMARY_EXCERPT_CHARS: usize = 200;

const DEFAULT_CATEGORY: &str = "other";

/// Labels a document without any model: the summary is its leading text,
/// the category is `other`, and there are no tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcerptAnalyzer;

impl Analyzer for ExcerptAnalyzer {
    fn analyze(&self, _filename: &str, text: &str) -> Result<Metadata, OracleError> {
        Ok(excerpt_metadata(text))
    }
}

/// Metadata built from the first [`SUMMARY_EXCERPT_CHARS`] characters of
/// `text`, with whitespace runs collapsed.
#[must_use]
pub fn excerpt_metadata(text: &str) -> Metadata {
    let summary: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SUMMARY_EXCERPT_CHARS)
        .collect();

    Metadata::new()
        .with("summary", summary)
        .with("categories", vec![DEFAULT_CATEGORY.to_string()])
        .with("tags", Vec::<String>::new())
}
