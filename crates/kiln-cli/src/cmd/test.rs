//! Test command

use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use kiln_core::Executor;

use crate::ui::ConsoleReporter;

/// Run the self-test of an installed recipe.
pub fn test(recipe_path: &Path, verbose: bool, dry_run: bool, quiet: bool) -> Result<()> {
    let recipe = crate::load_recipe(recipe_path)?;
    let home = crate::kiln_home()?;
    let host = crate::detect_host(&home)?;

    let executor = Executor::new(&host, ConsoleReporter::new(quiet))
        .with_verbose(verbose)
        .with_self_test(true);

    if dry_run {
        let plan = executor.plan(&recipe)?;
        let steps: Vec<_> = plan
            .into_iter()
            .filter(|a| a.stage() == kiln_core::Stage::SelfTest)
            .collect();
        super::print_plan(&steps);
        return Ok(());
    }

    let report = executor
        .run_self_test(&recipe)
        .with_context(|| format!("Self-test of {} failed", recipe.package.name))?;

    if !quiet {
        println!(
            "{} {} passed ({} commands, {} artifacts)",
            "✔".green().bold(),
            recipe.package.name.as_str().white().bold(),
            report.commands.len(),
            report.artifacts.len()
        );
    }
    Ok(())
}
