use std::path::Path;

use anyhow::Result;
use clap::Args;
use shelf_core::sync::SyncStatus;

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render, render_error};

/// Arguments for `shelf sync-status`.
#[derive(Args, Debug)]
pub struct SyncStatusArgs {
    /// Ingestion job id reported by a compaction run.
    pub job_id: String,
}

/// Execute `shelf sync-status`.
///
/// # Errors
///
/// Returns an error when the project is not initialized, index sync is not
/// configured, or the index cannot describe the job.
pub fn run_sync_status(args: &SyncStatusArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let cfg = super::load_project(project_root, output)?;
    let index = super::index_from_config(&cfg);

    let status = match index.sync_status(&args.job_id) {
        Ok(status) => status,
        Err(err) => {
            render_error(output, &CliError::coded(err.to_string(), err.code()))?;
            anyhow::bail!("{}: {err}", err.code().code());
        }
    };

    render(output, &status, |s: &SyncStatus, mode, w| {
        if mode == OutputMode::Text {
            return writeln!(w, "{}\t{}", s.job_id, s.status);
        }
        pretty_section(w, "Index sync")?;
        pretty_kv(w, "job", &s.job_id)?;
        pretty_kv(w, "status", &s.status)?;
        for (name, value) in &s.statistics {
            pretty_kv(w, name, value.to_string())?;
        }
        Ok(())
    })
}
