//! `steward diff` - what would change between two documents

use anyhow::Result;
use colored::Colorize;
use declarative::{Change, GraphDiff};

use crate::Context;
use crate::cli::DiffArgs;
use crate::config::Document;
use crate::{paths, resource, ui};

pub fn run(ctx: &Context, args: &DiffArgs) -> Result<()> {
    let registry = resource::registry();
    let old = Document::load(&paths::expand(&args.old.to_string_lossy()), registry)?;
    let new = Document::load(&paths::expand(&args.new.to_string_lossy()), registry)?;

    let diff = GraphDiff::compute(&old.plan, &new.plan);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("Diff");
    }

    for (id, change) in &diff.changes {
        match change {
            Change::Unchanged => {
                if ctx.verbose > 0 {
                    ui::dim(&format!("  {id}"));
                }
            }
            Change::Added => println!("{} {}", "+".green(), id),
            Change::Removed => println!("{} {}", "-".red(), id),
            Change::Replaced { reason } => {
                println!("{} {} {}", "~".yellow(), id, format!("({reason})").dimmed());
            }
        }
    }

    if ctx.quiet {
        return Ok(());
    }

    println!();
    if diff.has_changes() {
        ui::kv("added", &diff.added().to_string());
        ui::kv("replaced", &diff.replaced().to_string());
        ui::kv("removed", &diff.removed().to_string());
        ui::kv("unchanged", &diff.unchanged().to_string());
    } else {
        ui::success("No changes");
    }
    Ok(())
}
