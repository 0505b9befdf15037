#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "shelf",
    author,
    version,
    about = "shelf: near-duplicate document compaction for an object-store corpus",
    long_about = None
)]
struct Cli {
    /// Log at debug level (ignored when `SHELF_LOG` is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides `--json`, `SHELF_FORMAT`, and config).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags, env, and the project config.
    fn output_mode(&self, project_root: &std::path::Path) -> OutputMode {
        // A broken config is reported by the command itself.
        let config_output = shelf_core::config::load_project_config(project_root)
            .ok()
            .and_then(|cfg| cfg.output);
        output::resolve_output_mode(self.format, self.json, config_output.as_deref())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a shelf project",
        long_about = "Create .shelf/config.toml with defaults and the bucket directory. \
                      Re-running keeps an existing config unless --force is given.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    shelf init\n\n    # Reset the config to defaults\n    shelf init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Corpus",
        about = "Store a file in the corpus",
        long_about = "Store a .pdf, .docx, .txt, .md, or .csv file under \
                      {base}/{stem}/{hash}/{filename} together with its .metadata.json sidecar. \
                      Files given no labels are described by the configured oracle. The search \
                      index is asked to resync afterwards.",
        after_help = "EXAMPLES:\n    # Ingest with a summary and labels\n    shelf ingest report.md --summary \"Q1 revenue\" --category finance --tag q1\n\n    # Emit machine-readable output\n    shelf ingest notes.txt --json"
    )]
    Ingest(cmd::ingest::IngestArgs),

    #[command(
        next_help_heading = "Corpus",
        about = "List documents",
        long_about = "List corpus documents (or merged documents with --compacted) with the \
                      summary, categories, and tags from their sidecars.",
        after_help = "EXAMPLES:\n    # List the corpus\n    shelf ls\n\n    # List merged output as JSON\n    shelf ls --compacted --json"
    )]
    Ls(cmd::ls::LsArgs),

    #[command(
        next_help_heading = "Compaction",
        about = "Merge near-duplicate documents",
        long_about = "Group similar documents, write one merged document per group under the \
                      compacted prefix, delete the originals and their sidecars, then resync \
                      the search index. Exits non-zero when the run fails.",
        after_help = "EXAMPLES:\n    # Preview what would be merged\n    shelf compact --dry-run\n\n    # Run from an event payload on stdin\n    echo '{\"trigger\":\"api\"}' | shelf compact --event -\n\n    # Scheduled run with JSON output\n    shelf compact --trigger scheduled --json"
    )]
    Compact(cmd::compact::CompactArgs),

    #[command(
        name = "sync-status",
        next_help_heading = "Compaction",
        about = "Show an index sync job",
        long_about = "Query the search index for the status and statistics of an ingestion job.",
        after_help = "EXAMPLES:\n    shelf sync-status JOB123 --json"
    )]
    SyncStatus(cmd::sync_status::SyncStatusArgs),

    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    shelf completions zsh > ~/.zfunc/_shelf"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// Filter used when `SHELF_LOG` is unset.
const fn default_filter(verbose: bool, debug_env: bool) -> &'static str {
    if verbose || debug_env {
        "shelf=debug,info"
    } else {
        "shelf=info,warn"
    }
}

/// Logs go to stderr so command output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("SHELF_LOG").unwrap_or_else(|_| {
        EnvFilter::new(default_filter(verbose, env::var("DEBUG").is_ok()))
    });

    let format = env::var("SHELF_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        debug!("verbose logging enabled");
    }

    let project_root = env::current_dir()?;
    let output = cli.output_mode(&project_root);

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Ingest(ref args) => cmd::ingest::run_ingest(args, output, &project_root),
        Commands::Ls(ref args) => cmd::ls::run_ls(args, output, &project_root),
        Commands::Compact(ref args) => cmd::compact::run_compact(args, output, &project_root),
        Commands::SyncStatus(ref args) => {
            cmd::sync_status::run_sync_status(args, output, &project_root)
        }
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args, &mut command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::event::Trigger;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let before = Cli::parse_from(["shelf", "--json", "ls"]);
        assert!(before.json);
        let after = Cli::parse_from(["shelf", "ls", "--json"]);
        assert!(after.json);
    }

    #[test]
    fn format_flag_parsed() {
        let cli = Cli::parse_from(["shelf", "compact", "--format", "text"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn compact_flags_parsed() {
        let cli = Cli::parse_from([
            "shelf",
            "compact",
            "--dry-run",
            "--trigger",
            "API",
            "--event",
            "-",
        ]);
        let Commands::Compact(args) = cli.command else {
            panic!("expected compact");
        };
        assert!(args.dry_run);
        assert_eq!(args.trigger, Some(Trigger::Api));
        assert_eq!(args.event.as_deref(), Some(std::path::Path::new("-")));
        assert_eq!(args.wait, 5);
    }

    #[test]
    fn trigger_flag_accepts_any_label() {
        let cli = Cli::parse_from(["shelf", "compact", "--trigger", "cron"]);
        let Commands::Compact(args) = cli.command else {
            panic!("expected compact");
        };
        assert_eq!(args.trigger, Some(Trigger::Other("cron".into())));
    }

    #[test]
    fn verbose_raises_default_log_level() {
        assert_eq!(default_filter(false, false), "shelf=info,warn");
        assert_eq!(default_filter(true, false), "shelf=debug,info");
        assert_eq!(default_filter(false, true), "shelf=debug,info");

        let cli = Cli::parse_from(["shelf", "ls", "-v"]);
        assert!(cli.verbose);
    }

    #[test]
    fn ingest_collects_repeated_labels() {
        let cli = Cli::parse_from([
            "shelf", "ingest", "a.md", "--category", "finance", "--category", "ops", "--tag", "q1",
        ]);
        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.categories, vec!["finance", "ops"]);
        assert_eq!(args.tags, vec!["q1"]);
        assert!(args.summary.is_none());
    }

    #[test]
    fn sync_status_requires_job_id() {
        assert!(Cli::try_parse_from(["shelf", "sync-status"]).is_err());
        let cli = Cli::parse_from(["shelf", "sync-status", "JOB1"]);
        assert!(matches!(cli.command, Commands::SyncStatus(ref a) if a.job_id == "JOB1"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
