mod commands;
mod compile;
mod config;
mod context;
mod diagnostics;
mod error;
mod graph;
mod locator;
mod registry;
mod types;
mod validator;
mod vars;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::types::Kind;

#[derive(Parser)]
#[command(name = "docweave", about = "Reference integrity for modular LaTeX+markdown documents")]
struct Cli {
    /// Repository root to operate on.
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile all documents with variables substituted
    Build {
        /// Leave the substituted fragments on disk instead of restoring them
        #[arg(long)]
        keep: bool,
    },
    /// Verify every cross-reference, citation, and variable resolves
    Check,
    /// List discovered files and their kinds
    Files {
        /// Only list files of this kind (e.g. "markdown", "bibliography")
        #[arg(long)]
        kind: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { keep } => commands::build(&cli.root, keep),
        Commands::Check => commands::check(&cli.root),
        Commands::Files { kind } => {
            let kind = match kind.as_deref().map(Kind::parse) {
                Some(None) => {
                    eprintln!("error: unknown file kind");
                    return ExitCode::FAILURE;
                },
                Some(some) => some,
                None => None,
            };
            commands::files(&cli.root, kind)
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::FAILURE
        },
    }
}
