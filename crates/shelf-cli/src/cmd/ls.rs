use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use shelf_core::document::{decode_sidecar, is_sidecar_key, sidecar_key};
use shelf_core::store::{FsStore, ObjectStore};

use crate::output::{OutputMode, pretty_rule, pretty_section, render};

/// Arguments for `shelf ls`.
#[derive(Args, Debug)]
pub struct LsArgs {
    /// List merged documents instead of the corpus.
    #[arg(long)]
    pub compacted: bool,
}

#[derive(Debug, Serialize)]
pub struct LsEntry {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub prefix: String,
    pub count: usize,
    pub documents: Vec<LsEntry>,
}

/// Execute `shelf ls`.
///
/// # Errors
///
/// Returns an error when the project is not initialized or output fails.
pub fn run_ls(args: &LsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let cfg = super::load_project(project_root, output)?;
    let layout = cfg.layout();
    let prefix = if args.compacted {
        format!("{}/", layout.compact_prefix.trim_end_matches('/'))
    } else {
        layout.corpus_prefix()
    };

    let store = FsStore::new(cfg.store_root(project_root));
    let documents: Vec<LsEntry> = store
        .list(&prefix)
        .into_iter()
        .filter(|obj| !is_sidecar_key(&obj.key))
        .map(|obj| {
            // Missing or broken sidecars list as bare keys.
            let metadata = store
                .get(&sidecar_key(&obj.key))
                .ok()
                .and_then(|bytes| decode_sidecar(&bytes).ok())
                .unwrap_or_default();
            LsEntry {
                summary: metadata.summary(),
                categories: metadata.values_of("categories"),
                tags: metadata.values_of("tags"),
                key: obj.key,
                size: obj.size,
            }
        })
        .collect();

    let report = LsOutput {
        prefix,
        count: documents.len(),
        documents,
    };

    render(output, &report, |r, mode, w| {
        if mode == OutputMode::Text {
            for doc in &r.documents {
                writeln!(
                    w,
                    "{}\t{}\t{}",
                    doc.key,
                    doc.size,
                    doc.summary.as_deref().unwrap_or("")
                )?;
            }
            return Ok(());
        }

        pretty_section(w, &format!("{} ({} documents)", r.prefix, r.count))?;
        for doc in &r.documents {
            writeln!(w, "{}  ({} bytes)", doc.key, doc.size)?;
            if let Some(summary) = &doc.summary {
                writeln!(w, "    {summary}")?;
            }
            if !doc.categories.is_empty() || !doc.tags.is_empty() {
                writeln!(
                    w,
                    "    [{}] {}",
                    doc.categories.join(", "),
                    doc.tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" ")
                )?;
            }
        }
        if r.documents.is_empty() {
            writeln!(w, "(empty)")?;
        }
        pretty_rule(w)
    })
}
