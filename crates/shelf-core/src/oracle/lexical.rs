//! Token-overlap partitioner.
//!
//! Builds a word-token set per document, scores every pair with Jaccard
//! similarity, and unions pairs at or above the threshold. Clusters are the
//! connected components, so similarity is transitive: if `a~b` and `b~c`
//! then `{a, b, c}` is one group even when `a` and `c` score low.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::{OracleError, Partitioner};
use crate::document::Document;

/// Default Jaccard threshold for treating two documents as duplicates.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Deterministic near-duplicate detector.
#[derive(Debug, Clone, Copy)]
pub struct LexicalPartitioner {
    threshold: f64,
}

impl Default for LexicalPartitioner {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl LexicalPartitioner {
    /// Create a partitioner; the threshold is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Lower-cased alphanumeric word tokens of a text.
#[must_use]
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|`; `0.0` when both sets are empty.
#[must_use]
pub fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union_size = a.union(b).count() as f64;
    if union_size == 0.0 {
        0.0
    } else {
        intersection / union_size
    }
}

fn find(parent: &mut [usize], x: usize) -> usize {
    if parent[x] != x {
        let root = find(parent, parent[x]);
        parent[x] = root;
    }
    parent[x]
}

fn union(parent: &mut [usize], rank: &mut [u8], a: usize, b: usize) {
    let mut ra = find(parent, a);
    let mut rb = find(parent, b);
    if ra == rb {
        return;
    }
    if rank[ra] < rank[rb] {
        std::mem::swap(&mut ra, &mut rb);
    }
    parent[rb] = ra;
    if rank[ra] == rank[rb] {
        rank[ra] += 1;
    }
}

impl Partitioner for LexicalPartitioner {
    fn partition(&self, documents: &[Document]) -> Result<Vec<Vec<String>>, OracleError> {
        let tokens: Vec<HashSet<String>> = documents.iter().map(|d| tokenize(&d.text())).collect();
        let mut parent: Vec<usize> = (0..documents.len()).collect();
        let mut rank: Vec<u8> = vec![0; documents.len()];

        for i in 0..documents.len() {
            for j in (i + 1)..documents.len() {
                let score = jaccard(&tokens[i], &tokens[j]);
                if score >= self.threshold && score > 0.0 {
                    debug!(
                        a = documents[i].key.as_str(),
                        b = documents[j].key.as_str(),
                        score,
                        "near-duplicate pair"
                    );
                    union(&mut parent, &mut rank, i, j);
                }
            }
        }

        // Component order follows the first member's position in the input.
        let mut members: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut first_seen: Vec<Option<usize>> = vec![None; documents.len()];
        for (i, doc) in documents.iter().enumerate() {
            let root = find(&mut parent, i);
            let slot = *first_seen[root].get_or_insert(i);
            members.entry(slot).or_default().push(doc.key.clone());
        }

        Ok(members.into_values().collect())
    }
}
