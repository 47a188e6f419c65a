//! Info command

use std::path::Path;

use anyhow::Result;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Table};
use crossterm::style::Stylize;
use kiln_core::Layout;
use kiln_core::receipt::InstallReceipt;
use kiln_schema::{DependencyKind, Phase};

/// Show a summary of a recipe and its install state.
pub fn info(recipe_path: &Path) -> Result<()> {
    let recipe = crate::load_recipe(recipe_path)?;
    let home = crate::kiln_home()?;
    let layout = Layout::for_recipe(&home, &recipe);
    let pkg = &recipe.package;

    println!();
    println!(
        "  {} {}",
        pkg.name.as_str().white().bold(),
        pkg.version.as_str().dark_grey()
    );
    if !pkg.description.is_empty() {
        println!("  {}", pkg.description);
    }
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);

    let mut row = |key: &str, value: String| {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    };

    if let Some(homepage) = &pkg.homepage {
        row("homepage", homepage.clone());
    }
    row("source", recipe.source.url.clone());
    row("sha256", recipe.source.sha256.to_string());
    if let Some(reason) = &pkg.keg_only {
        row("keg-only", reason.clone());
    }

    let deps: Vec<String> = recipe
        .dependencies
        .iter()
        .map(|d| {
            let req = d.version.as_ref().map(|r| format!(" {r}")).unwrap_or_default();
            let kind = if d.kind == DependencyKind::Build { " (build)" } else { "" };
            format!("{}{req}{kind}", d.name)
        })
        .collect();
    if !deps.is_empty() {
        row("requires", deps.join(", "));
    }

    let steps: Vec<String> = Phase::ALL
        .iter()
        .map(|&phase| format!("{phase} {}", recipe.steps_in(phase).count()))
        .collect();
    row("steps", steps.join(", "));
    row(
        "post-install",
        format!(
            "{} relocations, {} relinks, {} patches, {} links",
            recipe.relocations.len(),
            recipe.relink.len(),
            recipe.patches.len(),
            recipe.links.len()
        ),
    );
    row(
        "self-test",
        if recipe.test.is_some() { "yes" } else { "no" }.to_string(),
    );
    row("prefix", layout.prefix.display().to_string());

    match InstallReceipt::read(&layout.prefix) {
        Ok(receipt) => row("installed", receipt.installed_at),
        Err(_) => row("installed", "no".to_string()),
    }

    println!("{table}");
    Ok(())
}
