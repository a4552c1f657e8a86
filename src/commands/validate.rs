//! `steward validate`

use anyhow::{Result, bail};
use declarative::validate_all;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let doc = super::load_document(ctx)?;

    if !ctx.quiet {
        ui::header("Validate");
        ui::kv("config", &doc.path.display().to_string());
        println!();
    }

    let failures = validate_all(&doc.plan);

    for resource in doc.plan.resources() {
        let id = resource.id();
        match failures.iter().find(|(failed, _)| *failed == id) {
            Some((_, err)) => ui::error(&format!("{id}: {err}")),
            None if !ctx.quiet => {
                ui::success(&id.to_string());
                if ctx.verbose > 0 {
                    ui::dim(&resource.description());
                }
            }
            None => {}
        }
    }

    if !failures.is_empty() {
        bail!(
            "{} of {} invalid",
            failures.len(),
            ui::count(doc.plan.total_resources(), "resource")
        );
    }

    if !ctx.quiet {
        println!();
        ui::success(&format!(
            "{} valid",
            ui::count(doc.plan.total_resources(), "resource")
        ));
    }
    Ok(())
}
