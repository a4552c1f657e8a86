//! `steward run` - converge, then keep every resource converged

use anyhow::{Result, bail};
use declarative::{Engine, RunSummary};

use crate::Context;
use crate::cli::RunArgs;
use crate::ui;

pub async fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let (mut opts, plan) = super::load_plan(ctx, args.target.as_deref())?;
    opts.noop |= args.noop;
    opts.debug |= args.debug;

    if plan.is_empty() {
        ui::warn("No resources defined");
        return Ok(());
    }

    let engine = Engine::new(opts);

    let stop = engine.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupt received, shutting down");
            stop.cancel();
        }
    });

    if !ctx.quiet {
        let mode = if engine.options().noop { " (noop)" } else { "" };
        ui::info(&format!(
            "Watching {}{mode}, Ctrl-C to stop",
            ui::count(plan.total_resources(), "resource")
        ));
    }

    let summary = engine.run(plan).await?;

    if !ctx.quiet {
        print_report(&summary);
    }

    if !summary.is_success() {
        let failed = summary.resources.iter().filter(|r| !r.is_success()).count();
        bail!("{} ended with errors", ui::count(failed, "resource"));
    }
    Ok(())
}

fn print_report(summary: &RunSummary) {
    ui::header("Run");

    for report in &summary.resources {
        println!(
            "  {} {} ({} checks, {} writes)",
            ui::state_label(report.state),
            report.id,
            report.checks,
            report.applied
        );
        for err in &report.errors {
            ui::error(err);
        }
        if let Some(err) = &report.watch_error {
            ui::error(&format!("watch: {err}"));
        }
    }

    println!();
    ui::kv(
        "converged",
        &format!("{}/{}", summary.converged(), summary.resources.len()),
    );
}
