//! Command implementations
//!
//! - `validate` - decode and validate every definition
//! - `check` - one-shot check, dry run or apply
//! - `run` - long-lived converge and watch
//! - `diff` - compare two documents

pub mod check;
pub mod diff;
pub mod run;
pub mod validate;

use anyhow::{Result, bail};
use declarative::{EngineOptions, ExecutionPlan};

use crate::Context;
use crate::config::Document;
use crate::{paths, resource};

/// Load the resources document selected by `--config` or the environment
fn load_document(ctx: &Context) -> Result<Document> {
    let path = paths::config_file(ctx.config.as_deref())?;
    Document::load(&path, resource::registry())
}

/// Load the document and keep the resources matching `target`
fn load_plan(ctx: &Context, target: Option<&str>) -> Result<(EngineOptions, ExecutionPlan)> {
    let doc = load_document(ctx)?;
    let plan = doc.plan.filter_by_target(target);

    if plan.is_empty()
        && let Some(t) = target
    {
        bail!("No resources match '{t}'");
    }

    Ok((doc.engine, plan))
}
