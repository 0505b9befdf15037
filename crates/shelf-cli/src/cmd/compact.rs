//! `shelf compact`: fold near-duplicate documents into merged ones.
//!
//! Builds a compaction event from flags or a JSON payload, takes the
//! per-namespace run lock, and hands the event to the core handler. The
//! exit status is non-zero whenever the reported result is `failed`.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use shelf_core::config::locks_dir;
use shelf_core::engine::{CompactionEngine, CompactionResult};
use shelf_core::error::ErrorCode;
use shelf_core::event::{CompactEvent, Trigger, handle_compact};
use shelf_core::lock::{RunLock, lock_path};
use shelf_core::store::FsStore;

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render, render_error};

/// Arguments for `shelf compact`.
#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Analyse and merge, but write, delete, and sync nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Who requested the run, e.g. scheduled, manual, api, or any other label.
    #[arg(long)]
    pub trigger: Option<Trigger>,

    /// Read the event as JSON from a file, or `-` for stdin.
    #[arg(long, value_name = "FILE")]
    pub event: Option<PathBuf>,

    /// Seconds to wait for another run to release the lock.
    #[arg(long, default_value = "5")]
    pub wait: u64,
}

/// Output payload for `shelf compact`.
#[derive(Debug, Serialize)]
pub struct CompactOutput {
    pub trigger: Trigger,
    #[serde(flatten)]
    pub result: CompactionResult,
}

/// Execute `shelf compact`.
///
/// # Errors
///
/// Returns an error when the project is not initialized, the event payload
/// is invalid, the run lock is held elsewhere, or the run fails. Every
/// failure after the config loads still prints a `failed` result.
pub fn run_compact(args: &CompactArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let cfg = super::load_project(project_root, output)?;

    let event = match build_event(args) {
        Ok(event) => event,
        Err(err) => {
            tracing::error!(code = ErrorCode::InvalidEvent.code(), "invalid compact event: {err:#}");
            let trigger = args.trigger.clone().unwrap_or(Trigger::Manual);
            render_report(output, trigger, CompactionResult::failed(args.dry_run))?;
            render_error(
                output,
                &CliError::coded(format!("{err:#}"), ErrorCode::InvalidEvent),
            )?;
            return Err(err);
        }
    };

    let layout = cfg.layout();
    let lock_file = lock_path(&locks_dir(project_root), &layout.base_prefix);
    let _lock = match RunLock::acquire(&lock_file, Duration::from_secs(args.wait)) {
        Ok(lock) => lock,
        Err(err) => {
            tracing::error!(code = err.code().code(), error = %err, "could not take run lock");
            render_report(output, event.trigger.clone(), CompactionResult::failed(event.dry_run))?;
            render_error(output, &CliError::coded(err.to_string(), err.code()))?;
            anyhow::bail!(err);
        }
    };

    let store = FsStore::new(cfg.store_root(project_root));
    let oracles = super::Oracles::from_config(&cfg);
    let (partitioner, synthesizer) = oracles.parts();
    let index = super::index_from_config(&cfg);
    let engine = CompactionEngine::new(layout, &store, partitioner, synthesizer, index.as_ref());

    let result = handle_compact(&event, &engine);
    let failed = result.is_failed();
    render_report(output, event.trigger.clone(), result)?;

    if failed {
        render_error(output, &CliError::new("compaction run failed"))?;
        anyhow::bail!("compaction failed; see logs for the cause");
    }
    Ok(())
}

/// Start from `--event` (if any), then let flags refine it. `--dry-run`
/// can only turn a dry run on.
fn build_event(args: &CompactArgs) -> Result<CompactEvent> {
    let mut event = match &args.event {
        Some(path) => parse_event(&read_event_source(path)?)?,
        None => CompactEvent::new(Trigger::Manual, false),
    };
    if args.dry_run {
        event.dry_run = true;
    }
    if let Some(trigger) = &args.trigger {
        event.trigger = trigger.clone();
    }
    Ok(event)
}

fn read_event_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))
    }
}

/// An empty payload is the default event.
fn parse_event(raw: &str) -> Result<CompactEvent> {
    if raw.trim().is_empty() {
        return Ok(CompactEvent::default());
    }
    serde_json::from_str(raw).context("Event is not a valid compact event")
}

fn render_report(output: OutputMode, trigger: Trigger, result: CompactionResult) -> Result<()> {
    let report = CompactOutput { trigger, result };
    render(output, &report, |r, mode, w| {
        let res = &r.result;
        let status = serde_json::to_value(res.status)
            .ok()
            .and_then(|v| v.as_str().map(ToOwned::to_owned))
            .unwrap_or_default();

        if mode == OutputMode::Text {
            writeln!(
                w,
                "{status}\tmerged={}\tdeleted={}\tdry_run={}",
                res.merged, res.deleted, res.dry_run
            )?;
            for plan in &res.planned {
                writeln!(w, "plan\t{}\t{}", plan.target, plan.sources.join(","))?;
            }
            return Ok(());
        }

        let heading = if res.dry_run { "Compaction (dry run)" } else { "Compaction" };
        pretty_section(w, heading)?;
        pretty_kv(w, "status", &status)?;
        pretty_kv(w, "trigger", r.trigger.as_str())?;
        pretty_kv(w, "merged", res.merged.to_string())?;
        pretty_kv(w, "deleted", res.deleted.to_string())?;
        for plan in &res.planned {
            writeln!(w)?;
            writeln!(w, "  {}", plan.target)?;
            for source in &plan.sources {
                writeln!(w, "    <- {source}")?;
            }
        }
        Ok(())
    })
}
