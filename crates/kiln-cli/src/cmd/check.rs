//! Check command

use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use kiln_core::{Executor, NullReporter};

/// Validate a recipe and verify it could run on this host.
pub fn check(recipe_path: &Path, quiet: bool) -> Result<()> {
    let recipe = crate::load_recipe(recipe_path)?;
    let home = crate::kiln_home()?;
    let host = crate::detect_host(&home)?;

    let deps = Executor::new(&host, NullReporter)
        .check(&recipe)
        .with_context(|| format!("{} cannot be installed here", recipe.package.name))?;

    if quiet {
        return Ok(());
    }

    let lw = 14;
    println!(
        "{} {} {}",
        "✔".green().bold(),
        recipe.package.name.as_str().white().bold(),
        recipe.package.version.as_str().dark_grey()
    );
    println!(
        "  {:<lw$}{}",
        "compiler",
        host.compiler().as_ref().map_or_else(|| "unknown".to_string(), ToString::to_string)
    );
    println!(
        "  {:<lw$}{}",
        "os",
        host.os_version().as_ref().map_or_else(|| "unknown".to_string(), ToString::to_string)
    );
    println!("  {:<lw$}{}", "jobs", host.jobs());
    for dep in deps {
        let version = dep
            .version
            .as_ref()
            .map_or_else(|| "version unknown".to_string(), ToString::to_string);
        println!(
            "  {:<lw$}{} ({version}) at {}",
            "dependency",
            dep.name,
            dep.prefix.display()
        );
    }
    Ok(())
}
