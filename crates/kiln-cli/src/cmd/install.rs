//! Install command

use std::path::Path;

use anyhow::{Context, Result};
use kiln_core::{Executor, USER_AGENT};

use crate::ui::ConsoleReporter;

/// Build and install the recipe at `recipe_path`.
pub async fn install(
    recipe_path: &Path,
    run_test: bool,
    verbose: bool,
    dry_run: bool,
    quiet: bool,
) -> Result<()> {
    let recipe = crate::load_recipe(recipe_path)?;
    let home = crate::kiln_home()?;
    let host = crate::detect_host(&home)?;

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .tcp_nodelay(true)
        .build()?;

    let executor = Executor::new(&host, ConsoleReporter::new(quiet))
        .with_client(client)
        .with_verbose(verbose)
        .with_self_test(run_test);

    if dry_run {
        super::print_plan(&executor.plan(&recipe)?);
        return Ok(());
    }

    let name = &recipe.package.name;
    let outcome = executor
        .execute(&recipe)
        .await
        .with_context(|| format!("Failed to install {name} {}", recipe.package.version))?;

    if !quiet {
        if let Some(reason) = &outcome.receipt.keg_only {
            println!("    keg-only ({reason}); use {} in build flags", outcome.prefix.display());
        }
        if let Some(log) = &outcome.log_path {
            println!("    build log: {}", log.display());
        }
    }
    Ok(())
}
