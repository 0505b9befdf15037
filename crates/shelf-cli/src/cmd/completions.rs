use std::io;

use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};

/// Arguments for `shelf completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate the script for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `shell` to stdout.
///
/// # Errors
///
/// Never fails today; the `Result` keeps the handler signature uniform.
pub fn run_completions(args: &CompletionsArgs, command: &mut clap::Command) -> Result<()> {
    let name = command.get_name().to_string();
    generate(args.shell, command, name, &mut io::stdout().lock());
    Ok(())
}
