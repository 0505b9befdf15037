//! Subcommand handlers and the wiring they share.

pub mod compact;
pub mod completions;
pub mod ingest;
pub mod init;
pub mod ls;
pub mod sync_status;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use shelf_core::config::{self, OracleKind, SHELF_DIR, ShelfConfig};
use shelf_core::error::ErrorCode;
use shelf_core::oracle::{
    Analyzer, ConcatSynthesizer, ExcerptAnalyzer, LexicalPartitioner, LlmOracle, Partitioner,
    Synthesizer,
};
use shelf_core::sync::{DisabledIndexSync, HttpIndexSync, IndexSync};

use crate::output::{CliError, OutputMode, render_error};

/// Load the project config, failing with `E1001` when `shelf init` has not
/// been run here.
pub fn load_project(project_root: &Path, output: OutputMode) -> Result<ShelfConfig> {
    if !project_root.join(SHELF_DIR).is_dir() {
        render_error(
            output,
            &CliError::coded("no .shelf directory found", ErrorCode::NotInitialized),
        )?;
        anyhow::bail!("{}: no .shelf directory", ErrorCode::NotInitialized.code());
    }

    match config::load_config(project_root) {
        Ok(cfg) => Ok(cfg),
        Err(err) => {
            render_error(
                output,
                &CliError::coded(format!("{err:#}"), ErrorCode::ConfigParseError),
            )?;
            Err(err)
        }
    }
}

/// Oracle capabilities selected by `[oracle] kind`.
pub enum Oracles {
    Lexical(LexicalPartitioner, ConcatSynthesizer),
    Llm(LlmOracle),
}

impl Oracles {
    pub fn from_config(config: &ShelfConfig) -> Self {
        match config.oracle.kind {
            OracleKind::Lexical => Self::Lexical(
                LexicalPartitioner::new(config.oracle.similarity_threshold),
                ConcatSynthesizer,
            ),
            OracleKind::Llm => Self::Llm(LlmOracle::new(config.llm_config())),
        }
    }

    pub fn parts(&self) -> (&dyn Partitioner, &dyn Synthesizer) {
        match self {
            Self::Lexical(partitioner, synthesizer) => (partitioner, synthesizer),
            Self::Llm(oracle) => (oracle, oracle),
        }
    }

    /// Labels ingested files that arrive without metadata.
    pub fn analyzer(&self) -> &dyn Analyzer {
        match self {
            Self::Lexical(..) => &ExcerptAnalyzer,
            Self::Llm(oracle) => oracle,
        }
    }
}

/// Index client for `[index]`; disabled while the endpoint is empty.
pub fn index_from_config(config: &ShelfConfig) -> Box<dyn IndexSync> {
    if config.index.is_enabled() {
        Box::new(HttpIndexSync::new(
            &config.index.endpoint,
            &config.index.knowledge_base_id,
            &config.index.data_source_id,
            Duration::from_secs(config.index.timeout_secs),
        ))
    } else {
        Box::new(DisabledIndexSync)
    }
}
