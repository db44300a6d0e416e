mod commands;

use clap::{Parser, Subcommand};
use commands::{ImportArgs, SettingsArgs, TreeArgs};
use tracing_subscriber::EnvFilter;

/// Outline toolkit: markdown import, tree printing and settings.
#[derive(Parser, Debug)]
#[command(name = "outliner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a markdown file into blocks and emit export JSON
    Import(ImportArgs),

    /// Print the visible outline of an export document
    Tree(TreeArgs),

    /// Print the effective settings
    Settings(SettingsArgs),
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Command::Import(args) => commands::import(args, &mut stdout),
        Command::Tree(args) => commands::tree(args, &mut stdout),
        Command::Settings(args) => commands::settings(args, &mut stdout),
    }
}
