use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use shelf_core::config::{self, SHELF_DIR};
use std::path::Path;

use crate::output::{OutputMode, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing `.shelf/config.toml` with the defaults.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "locks/\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    config: String,
    bucket: String,
    config_written: bool,
}

/// Execute `shelf init`. Creates the project skeleton:
///
/// ```text
/// .shelf/
///   config.toml   (default project config)
///   .gitignore    (locks/)
/// bucket/         (store root from the config)
/// ```
///
/// Re-running keeps an existing config unless `--force` is given.
///
/// # Errors
///
/// Returns an error if any filesystem operation fails or the existing
/// config cannot be parsed.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let shelf_dir = project_root.join(SHELF_DIR);
    std::fs::create_dir_all(&shelf_dir)
        .with_context(|| format!("Failed to create {}", shelf_dir.display()))?;

    let config_path = config::config_path(project_root);
    let config_written = args.force || !config_path.exists();
    if config_written {
        std::fs::write(&config_path, config::default_config_toml()?)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
    }

    let gitignore_path = shelf_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    // The bucket location may come from an existing config or the env.
    let cfg = config::load_config(project_root)?;
    let bucket = cfg.store_root(project_root);
    std::fs::create_dir_all(&bucket)
        .with_context(|| format!("Failed to create bucket: {}", bucket.display()))?;

    let report = InitOutput {
        config: config_path.display().to_string(),
        bucket: bucket.display().to_string(),
        config_written,
    };

    render(output, &report, |r, mode, w| {
        let verb = if r.config_written { "Initialized" } else { "Already initialized" };
        if mode == OutputMode::Text {
            return writeln!(w, "{verb}\t{}\t{}", r.config, r.bucket);
        }
        pretty_section(w, &format!("{verb} .shelf/"))?;
        pretty_kv(w, "config", &r.config)?;
        pretty_kv(w, "bucket", &r.bucket)?;
        writeln!(w)?;
        writeln!(w, "Next: shelf ingest <FILE>, then shelf compact --dry-run")
    })
}
