//! `rivapi completions` command - shell completion scripts
//!
//! Writes a clap_complete script for the requested shell to stdout.
//! Bash and zsh users can source the output directly, e.g.
//! `source <(rivapi completions bash)` in ~/.bashrc; fish expects the
//! script saved as ~/.config/fish/completions/rivapi.fish, and
//! PowerShell appended to $PROFILE.

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use miette::Result;
use std::io;

use crate::cli::Cli;

#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn run(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "rivapi", &mut io::stdout());
    Ok(())
}
