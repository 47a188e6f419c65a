//! kiln - build recipe executor CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiln_cli::cmd;
use kiln_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Install {
            recipe,
            test,
            verbose,
        } => cmd::install::install(&recipe, test, verbose, dry_run, quiet).await,
        Commands::Test { recipe, verbose } => cmd::test::test(&recipe, verbose, dry_run, quiet),
        Commands::Check { recipe } => cmd::check::check(&recipe, quiet),
        Commands::Info { recipe } => cmd::info::info(&recipe),
        Commands::Hash { files } => cmd::hash::hash(&files),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
