//! `steward check` and `steward apply` - one pass over every resource

use anyhow::{Result, bail};
use declarative::{CheckOutcome, CheckSummary, check_all};

use crate::Context;
use crate::ui;

/// Check every matching resource once, writing desired values if `apply`
pub fn run(
    ctx: &Context,
    target: Option<&str>,
    apply: bool,
    jobs: Option<usize>,
    json: bool,
) -> Result<()> {
    let (mut opts, plan) = super::load_plan(ctx, target)?;
    if let Some(jobs) = jobs {
        opts.jobs = jobs;
    }

    if plan.is_empty() {
        if !json && !ctx.quiet {
            ui::warn("No resources defined");
        }
        return Ok(());
    }

    let summary = check_all(&plan, apply, &opts)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(ctx, &summary, apply);
    }

    if !summary.is_success() {
        bail!("{} failed", ui::count(summary.failed, "resource"));
    }
    Ok(())
}

fn print_summary(ctx: &Context, summary: &CheckSummary, apply: bool) {
    if !ctx.quiet {
        ui::header(if apply { "Apply" } else { "Check" });
    }

    for (id, outcome) in &summary.results {
        match outcome {
            CheckOutcome::Failed { error } => {
                ui::error(&format!("{id}: {error}"));
            }
            CheckOutcome::Converged if ctx.quiet || ctx.verbose == 0 => {}
            _ if ctx.quiet => {}
            _ => println!(
                "{} {} {}",
                ui::outcome_icon(outcome),
                id,
                ui::outcome_label(outcome)
            ),
        }
    }

    if ctx.quiet {
        return;
    }

    println!();
    ui::kv("converged", &summary.converged.to_string());
    if apply {
        ui::kv("applied", &summary.applied.to_string());
    } else {
        ui::kv("diverged", &summary.diverged.to_string());
    }
    if summary.failed > 0 {
        ui::kv("failed", &summary.failed.to_string());
    }

    println!();
    if summary.is_converged() {
        ui::success("Everything is at its desired value");
    } else if !apply && summary.diverged > 0 {
        ui::info("Run 'steward apply' to write the desired values");
    }
}
