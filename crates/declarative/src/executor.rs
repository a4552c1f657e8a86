//! Execution engine - drives resources through their lifecycle
//!
//! Two modes:
//! - [`check_all`]: one-shot `init -> check_apply -> close` for every
//!   resource, in parallel on a rayon pool.
//! - [`Engine::run`]: long-lived. Every resource gets its own tokio task
//!   that starts its watch, checks once the watch is armed, re-checks on
//!   every event and closes the resource on shutdown.

use crate::context::{ContextHandle, ExecutionContext};
use crate::error::{Error, Result};
use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::{CheckOutcome, CheckSummary, ConvergenceState, EngineOptions, ResourceId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Validate every resource in the plan, returning the failures.
pub fn validate_all(plan: &ExecutionPlan) -> Vec<(ResourceId, Error)> {
    plan.resources()
        .par_iter()
        .filter_map(|r| r.validate().err().map(|e| (r.id(), e)))
        .collect()
}

/// Check (and with `apply`, converge) every resource once.
///
/// Resources are validated first; invalid ones are reported as failed and
/// never reach `check_apply`.
pub fn check_all(plan: &ExecutionPlan, apply: bool, opts: &EngineOptions) -> Result<CheckSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::Task(format!("failed to create thread pool: {e}")))?;

    let outcomes: Vec<(ResourceId, CheckOutcome)> = pool.install(|| {
        plan.resources()
            .par_iter()
            .map(|resource| (resource.id(), check_once(resource.as_ref(), apply, opts)))
            .collect()
    });

    let mut summary = CheckSummary::default();
    for (id, outcome) in outcomes {
        summary.add_result(id, outcome);
    }
    Ok(summary)
}

/// Run one resource through a single check
fn check_once(resource: &dyn Resource, apply: bool, opts: &EngineOptions) -> CheckOutcome {
    if let Err(e) = resource.validate() {
        return CheckOutcome::Failed {
            error: e.to_string(),
        };
    }

    let done = CancellationToken::new();
    let (ctx, _handle) =
        ExecutionContext::new(resource.id(), opts.debug, opts.event_buffer, done.clone());

    let result = resource
        .init(ctx)
        .and_then(|()| resource.check_apply(apply));
    done.cancel();

    if let Err(e) = resource.close() {
        log::warn!("{}: close failed: {}", resource.id(), e);
    }

    let outcome = CheckOutcome::from_result(apply, &result);
    log::debug!("{}: {:?}", resource.id(), outcome);
    outcome
}

// ============================================================================
// Long-lived runs
// ============================================================================

/// What happened to one resource during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    pub id: ResourceId,
    /// Last known convergence state
    pub state: ConvergenceState,
    /// Number of `check_apply` calls
    pub checks: usize,
    /// Number of writes performed
    pub applied: usize,
    /// Errors from `init`, `check_apply` and `close`
    pub errors: Vec<String>,
    /// Set when the watch ended with an error
    pub watch_error: Option<String>,
}

impl ResourceReport {
    fn new(id: ResourceId) -> Self {
        Self {
            id,
            state: ConvergenceState::Unknown,
            checks: 0,
            applied: 0,
            errors: Vec::new(),
            watch_error: None,
        }
    }

    fn fail(&mut self, stage: &str, err: &Error) {
        log::error!("{}: {} failed: {}", self.id, stage, err);
        self.errors.push(format!("{stage}: {err}"));
    }

    fn watch_ended(&mut self, joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
        let err = match joined {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(e) => Error::Task(e.to_string()),
        };
        log::error!("{}: no longer watched: {}", self.id, err);
        self.watch_error = Some(err.to_string());
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.watch_error.is_none()
    }
}

/// Result of a long-lived run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub resources: Vec<ResourceReport>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.resources.iter().all(ResourceReport::is_success)
    }

    /// Number of resources whose last known state is converged
    pub fn converged(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.state.is_converged())
            .count()
    }
}

/// Long-lived orchestrator for a set of resources
pub struct Engine {
    opts: EngineOptions,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(opts: EngineOptions) -> Self {
        Self {
            opts,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    /// Token that stops the run when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every resource of the current run
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run every resource until shutdown.
    ///
    /// Fails before starting anything if a resource does not validate.
    /// A resource whose watch fails stops on its own; the others keep
    /// running.
    pub async fn run(&self, plan: ExecutionPlan) -> Result<RunSummary> {
        // Validation reads the filesystem on the rayon pool
        let (plan, invalid) = tokio::task::spawn_blocking(move || {
            let invalid = validate_all(&plan);
            (plan, invalid)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?;

        for (id, err) in &invalid {
            log::error!("{id}: {err}");
        }
        if let Some((_, err)) = invalid.into_iter().next() {
            return Err(err);
        }

        log::info!("starting {} resource(s)", plan.total_resources());

        let tasks: Vec<Supervised> = plan
            .into_resources()
            .into_iter()
            .map(|resource| {
                let resource: Arc<dyn Resource> = Arc::from(resource);
                let done = self.shutdown.child_token();
                let task = tokio::spawn(supervise(
                    Arc::clone(&resource),
                    self.opts.clone(),
                    done.clone(),
                ));
                Supervised {
                    resource,
                    done,
                    task,
                }
            })
            .collect();

        let mut summary = RunSummary::default();
        for supervised in tasks {
            summary.resources.push(supervised.join().await);
        }
        summary.resources.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summary)
    }
}

/// A resource task together with what is needed to clean up after it
struct Supervised {
    resource: Arc<dyn Resource>,
    done: CancellationToken,
    task: JoinHandle<ResourceReport>,
}

impl Supervised {
    /// Wait for the task. A task that died is still reported, and its
    /// resource is stopped and closed.
    async fn join(self) -> ResourceReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                self.done.cancel();
                let mut report = ResourceReport::new(self.resource.id());
                report.fail("task", &Error::Task(e.to_string()));
                if let Err(e) = self.resource.close() {
                    report.fail("close", &e);
                }
                report
            }
        }
    }
}

/// Drive one resource for the whole run
async fn supervise(
    resource: Arc<dyn Resource>,
    opts: EngineOptions,
    done: CancellationToken,
) -> ResourceReport {
    let id = resource.id();
    let mut report = ResourceReport::new(id.clone());
    let apply = !opts.noop;

    let (ctx, mut handle) = ExecutionContext::new(id, opts.debug, opts.event_buffer, done.clone());
    if let Err(e) = resource.init(ctx) {
        report.fail("init", &e);
        return report;
    }

    let mut watcher: JoinHandle<Result<()>> = {
        let resource = Arc::clone(&resource);
        tokio::spawn(async move { resource.watch().await })
    };
    let mut watch_done = false;

    let armed = tokio::select! {
        running = handle.wait_running() => running,
        joined = &mut watcher => {
            watch_done = true;
            report.watch_ended(joined);
            false
        }
    };

    if armed {
        reconcile(&resource, apply, &mut report).await;

        loop {
            tokio::select! {
                biased;

                () = done.cancelled() => break,

                joined = &mut watcher => {
                    watch_done = true;
                    report.watch_ended(joined);
                    break;
                }

                event = handle.next_event() => {
                    if event.is_none() {
                        break;
                    }
                    let extra = handle.drain_events();
                    if opts.debug && extra > 0 {
                        log::debug!("{}: folded {} queued event(s)", report.id, extra);
                    }
                    reconcile(&resource, apply, &mut report).await;
                }
            }
        }
    }

    done.cancel();
    if !watch_done {
        report.watch_ended(watcher.await);
    }
    finish(&resource, &mut handle, &mut report);
    report
}

/// One orchestrated check, tracking the convergence state
async fn reconcile(resource: &Arc<dyn Resource>, apply: bool, report: &mut ResourceReport) {
    if apply {
        report.state = ConvergenceState::Applying;
    }

    match check(resource, apply, report).await {
        Ok(true) => {
            report.state = ConvergenceState::Converged;
            log::debug!("{}: converged", report.id);
        }
        Ok(false) if apply => {
            report.applied += 1;
            log::info!("{}: applied", report.id);
            // A write reports "changed"; settle the state with a dry run
            match check(resource, false, report).await {
                Ok(converged) => report.state = ConvergenceState::from_check(converged),
                Err(e) => {
                    report.state = ConvergenceState::Unknown;
                    report.fail("check", &e);
                }
            }
        }
        Ok(false) => {
            report.state = ConvergenceState::Diverged;
            log::warn!("{}: diverged (noop)", report.id);
        }
        Err(e) => {
            report.state = ConvergenceState::Unknown;
            report.fail("check_apply", &e);
        }
    }
}

/// Run `check_apply` off the async workers; it does blocking I/O
async fn check(resource: &Arc<dyn Resource>, apply: bool, report: &mut ResourceReport) -> Result<bool> {
    report.checks += 1;
    let resource = Arc::clone(resource);
    tokio::task::spawn_blocking(move || resource.check_apply(apply))
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}

fn finish(resource: &Arc<dyn Resource>, handle: &mut ContextHandle, report: &mut ResourceReport) {
    handle.drain_events();
    if let Err(e) = resource.close() {
        report.fail("close", &e);
    }
    log::debug!("{}: closed ({})", report.id, report.state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{Journal, Scripted};
    use crate::source::{MemorySource, Op};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Observed {
        live: Arc<Mutex<String>>,
        source: MemorySource,
        journal: Arc<Journal>,
        path: PathBuf,
    }

    fn scripted(name: &str, value: &str, live: &str) -> (Scripted, Observed) {
        let res = Scripted::new(name, value, live);
        let seen = Observed {
            live: Arc::clone(&res.live),
            source: res.source.clone(),
            journal: Arc::clone(&res.journal),
            path: res.path(),
        };
        (res, seen)
    }

    fn single(res: Scripted) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(res)).unwrap();
        plan
    }

    async fn eventually(what: &str, f: impl Fn() -> bool) {
        for _ in 0..200 {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn test_check_all_dry_run() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(Scripted::new("a", "1", "1")))
            .unwrap();
        plan.add_resource(Box::new(Scripted::new("b", "1", "0")))
            .unwrap();

        let summary = check_all(&plan, false, &EngineOptions::default()).unwrap();
        assert_eq!(summary.converged, 1);
        assert_eq!(summary.diverged, 1);
        assert_eq!(summary.results[0].0.name, "a");
        assert!(summary.is_success());
    }

    #[test]
    fn test_check_all_apply_closes_resources() {
        let (res, seen) = scripted("a", "1", "0");
        let plan = single(res);

        let summary = check_all(&plan, true, &EngineOptions::default()).unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(*seen.live.lock().unwrap(), "1");
        assert!(seen.journal.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_check_all_invalid_never_checked() {
        let (mut res, seen) = scripted("a", "1", "0");
        res.fail_validate = true;
        let plan = single(res);

        let summary = check_all(&plan, true, &EngineOptions::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(seen.journal.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_plan() {
        let (mut res, seen) = scripted("a", "1", "0");
        res.fail_validate = true;

        let engine = Engine::new(EngineOptions::default());
        let err = engine.run(single(res)).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidDefinition);
        assert_eq!(seen.journal.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_converges_and_reconverges_on_event() {
        let (res, seen) = scripted("a", "1", "0");
        let engine = Arc::new(Engine::new(EngineOptions::default()));

        let run = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(single(res)).await })
        };

        eventually("initial apply", || {
            seen.journal.applies.load(Ordering::SeqCst) == 1
        })
        .await;
        assert_eq!(*seen.live.lock().unwrap(), "1");

        // Someone changes the value behind our back
        *seen.live.lock().unwrap() = "0".to_string();
        eventually("watch armed", || seen.source.active() == 1).await;
        seen.source.notify(&seen.path, Op::Write);

        eventually("second apply", || {
            seen.journal.applies.load(Ordering::SeqCst) == 2
        })
        .await;

        engine.shutdown();
        let summary = run.await.unwrap().unwrap();
        let report = &summary.resources[0];
        assert_eq!(report.state, ConvergenceState::Converged);
        assert_eq!(report.applied, 2);
        assert!(report.is_success());
        assert!(seen.journal.closed.load(Ordering::SeqCst));
        assert_eq!(seen.source.active(), 0);
    }

    #[tokio::test]
    async fn test_run_noop_reports_divergence() {
        let (res, seen) = scripted("a", "1", "0");
        let engine = Arc::new(Engine::new(EngineOptions {
            noop: true,
            ..EngineOptions::default()
        }));

        let run = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(single(res)).await })
        };

        eventually("initial check", || {
            seen.journal.checks.load(Ordering::SeqCst) == 1
        })
        .await;
        engine.shutdown();

        let summary = run.await.unwrap().unwrap();
        assert_eq!(summary.resources[0].state, ConvergenceState::Diverged);
        assert_eq!(summary.converged(), 0);
        assert_eq!(*seen.live.lock().unwrap(), "0");
        assert_eq!(seen.journal.applies.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_watch_failure_stops_resource() {
        let (res, seen) = scripted("a", "1", "1");
        let engine = Engine::new(EngineOptions::default());

        let source = seen.source.clone();
        let path = seen.path.clone();
        let journal = Arc::clone(&seen.journal);
        tokio::spawn(async move {
            while journal.checks.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            source.fail(&path, "queue overflow");
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), engine.run(single(res)))
            .await
            .expect("run did not end after watch failure")
            .unwrap();

        let report = &summary.resources[0];
        assert!(report.watch_error.as_deref().unwrap().contains("queue overflow"));
        assert!(!summary.is_success());
        assert!(seen.journal.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_resource_is_reported_and_closed() {
        let (mut res, seen) = scripted("a", "1", "1");
        res.panic_on_init = true;

        let mut plan = single(res);
        plan.add_resource(Box::new(Scripted::new("b", "1", "1")))
            .unwrap();

        let engine = Arc::new(Engine::new(EngineOptions::default()));
        let run = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(plan).await })
        };

        eventually("panicked resource closed", || {
            seen.journal.closed.load(Ordering::SeqCst)
        })
        .await;
        engine.shutdown();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run did not end")
            .unwrap()
            .unwrap();

        assert_eq!(summary.resources.len(), 2);
        assert!(!summary.is_success());

        let failed = &summary.resources[0];
        assert_eq!(failed.id.name, "a");
        assert_eq!(failed.state, ConvergenceState::Unknown);
        assert!(failed.errors[0].starts_with("task:"));
        assert!(seen.journal.closed.load(Ordering::SeqCst));

        assert!(summary.resources[1].is_success());
    }
}
