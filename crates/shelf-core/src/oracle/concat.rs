use std::collections::BTreeSet;

use super::{MergedContent, MergedDocument, OracleError, Synthesizer, directory_from_metadata};
use crate::document::{Document, Metadata};

const SEPARATOR: &str = "\n\n---\n\n";
const MAX_SUMMARIES: usize = 3;
const MAX_SUMMARY_CHARS: usize = 500;
const DEFAULT_CATEGORY: &str = "other";

/// Merges a group by concatenating contents and unioning metadata.
///
/// Also the fallback for [`super::LlmOracle`] when the model's answer cannot
/// be parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatSynthesizer;

impl ConcatSynthesizer {
    /// Merge the metadata of a group: combined summary plus sorted unions of
    /// categories and tags.
    #[must_use]
    pub fn merge_metadata(documents: &[Document]) -> Metadata {
        let summaries: Vec<String> = documents
            .iter()
            .filter_map(|d| d.metadata.summary())
            .collect();
        let summary = if summaries.is_empty() {
            format!("{} documents merged", documents.len())
        } else {
            truncate_summary(&summaries[..summaries.len().min(MAX_SUMMARIES)].join(" "))
        };

        let mut categories = BTreeSet::new();
        let mut tags = BTreeSet::new();
        for doc in documents {
            categories.extend(doc.metadata.values_of("categories"));
            tags.extend(doc.metadata.values_of("tags"));
        }
        if categories.is_empty() {
            categories.insert(DEFAULT_CATEGORY.to_string());
        }

        Metadata::new()
            .with("summary", summary)
            .with("categories", categories.into_iter().collect::<Vec<_>>())
            .with("tags", tags.into_iter().collect::<Vec<_>>())
    }
}

fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() <= MAX_SUMMARY_CHARS {
        return summary.to_string();
    }
    let mut cut: String = summary.chars().take(MAX_SUMMARY_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

impl Synthesizer for ConcatSynthesizer {
    fn synthesize(&self, documents: &[Document]) -> Result<MergedDocument, OracleError> {
        let first = documents.first().ok_or(OracleError::EmptyGroup)?;

        let content = documents
            .iter()
            .map(|d| d.text().into_owned())
            .collect::<Vec<_>>()
            .join(SEPARATOR);
        let metadata = Self::merge_metadata(documents);

        Ok(MergedDocument {
            directory: directory_from_metadata(&metadata),
            filename: first.base_filename().to_string(),
            content: MergedContent::Text(content),
            metadata,
        })
    }
}
