//! `shelf ingest`: place a local file into the corpus with its sidecar.
//!
//! Files land at `{base}/{stem}/{hash}/{filename}`, where `hash` is a short
//! content digest, so re-ingesting identical bytes overwrites in place while
//! a changed file gets a sibling entry.
//!
//! A file given no `--summary`, `--category`, or `--tag` is labelled by the
//! configured oracle. Every successful upload asks the index to re-ingest.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use shelf_core::document::Metadata;
use shelf_core::error::ErrorCode;
use shelf_core::oracle::{Analyzer, excerpt_metadata};
use shelf_core::store::{FsStore, PutOutcome, put_with_metadata};
use shelf_core::sync::SyncOutcome;

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render, render_error};

/// Hex characters of the content digest kept in the key.
const HASH_PREFIX_LEN: usize = 16;

/// Extensions `shelf ingest` accepts, lower-case.
const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "docx", "txt", "md", "csv"];

/// Arguments for `shelf ingest`.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// File to store.
    pub file: PathBuf,

    /// One-line summary recorded in the sidecar.
    #[arg(long)]
    pub summary: Option<String>,

    /// Category label (repeatable).
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Tag (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

/// Output payload for `shelf ingest`.
#[derive(Debug, Serialize)]
pub struct IngestOutput {
    pub key: String,
    pub location: String,
    pub size: usize,
    pub sync: SyncOutcome,
}

/// Execute `shelf ingest`.
///
/// # Errors
///
/// Returns an error when the project is not initialized, the file type is
/// not supported, the file cannot be read, or the store rejects the write.
pub fn run_ingest(args: &IngestArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let cfg = super::load_project(project_root, output)?;

    let filename = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?;
    if !is_supported(filename) {
        render_error(
            output,
            &CliError::coded(
                format!("{filename}: unsupported file type"),
                ErrorCode::UnsupportedFileType,
            ),
        )?;
        anyhow::bail!("{}: unsupported file type {filename}", ErrorCode::UnsupportedFileType);
    }

    let content = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let stem = args
        .file
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let directory = format!(
        "{}/{stem}/{}",
        cfg.store.base_prefix.trim_end_matches('/'),
        content_digest(&content)
    );
    let mut metadata = metadata_from_args(args);
    if metadata.is_empty() {
        let oracles = super::Oracles::from_config(&cfg);
        metadata = analyze(oracles.analyzer(), filename, &content);
    }

    let store = FsStore::new(cfg.store_root(project_root));
    let outcome = put_with_metadata(
        &store,
        &directory,
        filename,
        &content,
        &metadata,
        Some(content_type_for(filename)),
    );

    let (key, location) = match outcome {
        PutOutcome::Stored { key, location } => (key, location),
        PutOutcome::Failed { error } => {
            render_error(output, &CliError::coded(&error, ErrorCode::StoreUnavailable))?;
            anyhow::bail!("ingest failed: {error}");
        }
    };
    tracing::info!(%key, "ingested");

    let sync = super::index_from_config(&cfg).start_sync();
    if let SyncOutcome::Failed { error } = &sync {
        tracing::warn!(code = ErrorCode::IndexSyncFailed.code(), %error, "index sync not started");
    }

    let report = IngestOutput {
        key,
        location,
        size: content.len(),
        sync,
    };
    render(output, &report, |r, mode, w| {
        if mode == OutputMode::Text {
            return writeln!(w, "{}\t{}", r.key, r.location);
        }
        pretty_section(w, "Ingested")?;
        pretty_kv(w, "key", &r.key)?;
        pretty_kv(w, "location", &r.location)?;
        pretty_kv(w, "size", r.size.to_string())?;
        match &r.sync {
            SyncOutcome::Started { job_id, .. } => pretty_kv(w, "sync job", job_id),
            SyncOutcome::Failed { error } => pretty_kv(w, "sync error", error),
        }
    })
}

fn is_supported(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Oracle-produced labels; an oracle failure falls back to an excerpt so the
/// upload still goes through.
fn analyze(analyzer: &dyn Analyzer, filename: &str, content: &[u8]) -> Metadata {
    let text = String::from_utf8_lossy(content);
    match analyzer.analyze(filename, &text) {
        Ok(metadata) => metadata,
        Err(err) => {
            tracing::warn!(code = err.code().code(), error = %err, "analysis failed; using excerpt");
            excerpt_metadata(&text)
        }
    }
}

fn content_digest(content: &[u8]) -> String {
    let hex = blake3::hash(content).to_hex();
    hex.as_str()[..HASH_PREFIX_LEN].to_string()
}

fn metadata_from_args(args: &IngestArgs) -> Metadata {
    let mut metadata = Metadata::new();
    if let Some(summary) = args.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        metadata.insert("summary", summary);
    }
    if !args.categories.is_empty() {
        metadata.insert("categories", args.categories.clone());
    }
    if !args.tags.is_empty() {
        metadata.insert("tags", args.tags.clone());
    }
    metadata
}

fn content_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("md") => "text/markdown",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}
