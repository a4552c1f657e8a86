//! The watch/reconcile loop shared by every resource
//!
//! A resource's `watch` opens a subscription on its target and hands it to
//! [`watch_loop`], which turns bursts of notifications into single
//! re-check requests until shutdown.

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::source::{Notification, Pending, Subscription};

/// Run the watch loop on an already open subscription.
///
/// Signals running before the first wait. Returns `Ok(())` when the
/// context is cancelled, and an error when the subscription fails or its
/// stream closes. The subscription is released on every exit path.
pub async fn watch_loop(ctx: &ExecutionContext, mut sub: Subscription) -> Result<()> {
    ctx.running();

    let result = run(ctx, &mut sub).await;
    sub.close();
    result
}

async fn run(ctx: &ExecutionContext, sub: &mut Subscription) -> Result<()> {
    loop {
        if ctx.debug() {
            ctx.logf(format_args!("watching: {}", sub.path().display()));
        }

        tokio::select! {
            biased;

            () = ctx.done().cancelled() => return Ok(()),

            next = sub.recv() => match next {
                Some(item) => note(ctx, item?),
                None => return Err(Error::watch(sub.path(), "unexpected close")),
            },
        }

        // Collapse whatever else is already queued into the same event
        loop {
            match sub.try_recv() {
                Pending::Item(item) => note(ctx, item?),
                Pending::Empty => break,
                Pending::Closed => return Err(Error::watch(sub.path(), "unexpected close")),
            }
        }

        ctx.event();
    }
}

fn note(ctx: &ExecutionContext, notification: Notification) {
    if ctx.debug() {
        ctx.logf(format_args!(
            "event({}): {}",
            notification.path.display(),
            notification.op
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextHandle;
    use crate::source::{ChangeSource, MemorySource, Op};
    use crate::types::ResourceId;
    use crate::ErrorKind;
    use std::path::Path;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const TARGET: &str = "/proc/sys/net/ipv4/ip_forward";

    fn context() -> (ExecutionContext, ContextHandle) {
        ExecutionContext::new(
            ResourceId::new("test", "watch"),
            true,
            8,
            CancellationToken::new(),
        )
    }

    fn spawn_loop(
        ctx: ExecutionContext,
        source: &MemorySource,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let sub = source.subscribe(Path::new(TARGET), false).unwrap();
        tokio::spawn(async move { watch_loop(&ctx, sub).await })
    }

    #[tokio::test]
    async fn test_burst_is_coalesced_into_one_event() {
        let (ctx, mut handle) = context();
        let source = MemorySource::new();
        let sub = source.subscribe(Path::new(TARGET), false).unwrap();

        for _ in 0..3 {
            assert_eq!(source.notify(Path::new(TARGET), Op::Write), 1);
        }

        let task = tokio::spawn(async move { watch_loop(&ctx, sub).await });

        let event = tokio::time::timeout(Duration::from_secs(1), handle.next_event())
            .await
            .unwrap();
        assert!(event.is_some());

        handle.shutdown();
        task.await.unwrap().unwrap();
        assert_eq!(handle.drain_events(), 0);
    }

    #[tokio::test]
    async fn test_separate_batches_emit_separate_events() {
        let (ctx, mut handle) = context();
        let source = MemorySource::new();
        let task = spawn_loop(ctx, &source);
        assert!(handle.wait_running().await);

        source.notify(Path::new(TARGET), Op::Write);
        assert!(handle.next_event().await.is_some());

        source.notify(Path::new(TARGET), Op::Chmod);
        assert!(handle.next_event().await.is_some());

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_idle_watch_emits_nothing() {
        let (ctx, mut handle) = context();
        let source = MemorySource::new();
        let task = spawn_loop(ctx, &source);
        assert!(handle.wait_running().await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.try_event().is_none());

        source.notify(Path::new(TARGET), Op::Write);
        assert!(handle.next_event().await.is_some());
        assert!(handle.try_event().is_none());

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_returns_ok_and_releases() {
        let (ctx, mut handle) = context();
        let source = MemorySource::new();
        let task = spawn_loop(ctx, &source);

        assert!(handle.wait_running().await);
        assert_eq!(source.active(), 1);

        handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("watch did not stop after cancellation")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(source.active(), 0);
        assert!(handle.try_event().is_none());
    }

    #[tokio::test]
    async fn test_source_error_is_fatal() {
        let (ctx, mut handle) = context();
        let source = MemorySource::new();
        let task = spawn_loop(ctx, &source);
        assert!(handle.wait_running().await);

        source.fail(Path::new(TARGET), "inotify queue overflow");

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WatchFailure);
        assert_eq!(source.active(), 0);
    }

    #[tokio::test]
    async fn test_unexpected_close_is_fatal() {
        let (ctx, mut handle) = context();
        let source = MemorySource::new();
        let task = spawn_loop(ctx, &source);
        assert!(handle.wait_running().await);

        source.disconnect(Path::new(TARGET));

        let err = task.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("unexpected close"));
        assert_eq!(source.active(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_context_returns_immediately() {
        let (ctx, mut handle) = context();
        handle.shutdown();

        let source = MemorySource::new();
        let task = spawn_loop(ctx, &source);

        task.await.unwrap().unwrap();
        assert_eq!(source.active(), 0);
        assert!(handle.wait_running().await);
    }
}
