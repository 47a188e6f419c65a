//! Subcommand implementations.

pub mod check;
pub mod completions;
pub mod hash;
pub mod info;
pub mod install;
pub mod test;

use crossterm::style::Stylize;
use kiln_core::{PlannedAction, Stage};

/// Print a dry-run plan grouped by stage.
pub fn print_plan(plan: &[PlannedAction]) {
    let mut current: Option<Stage> = None;
    for action in plan {
        let stage = action.stage();
        if current != Some(stage) {
            println!("{} {}", "==>".blue().bold(), stage.as_str().bold());
            current = Some(stage);
        }
        println!("    {action}");
    }
    println!();
    println!("{}", "(dry run, nothing was changed)".dark_grey());
}
