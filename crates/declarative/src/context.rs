//! Execution context handed to a resource at `init`
//!
//! The orchestrator builds one context per resource instance per run and
//! keeps the matching [`ContextHandle`]. The resource uses the context to
//! log, to say it is running, to learn about shutdown, and to ask for a
//! re-check. The orchestrator uses the handle to observe those signals.

use crate::types::ResourceId;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// A request from a resource to be re-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub resource: ResourceId,
}

/// Resource side of the execution context.
///
/// Cloning is cheap; every clone talks to the same orchestrator handle.
#[derive(Clone)]
pub struct ExecutionContext {
    id: ResourceId,
    debug: bool,
    done: CancellationToken,
    events: mpsc::Sender<Event>,
    running: Arc<watch::Sender<bool>>,
}

/// Orchestrator side of the execution context.
pub struct ContextHandle {
    id: ResourceId,
    events: mpsc::Receiver<Event>,
    running: watch::Receiver<bool>,
    done: CancellationToken,
}

impl ExecutionContext {
    /// Create a context and its orchestrator handle.
    ///
    /// `event_buffer` is the number of re-check requests that can queue up
    /// before further ones are dropped (a queued request already guarantees
    /// a re-check). `done` is the shutdown signal for this resource.
    pub fn new(
        id: ResourceId,
        debug: bool,
        event_buffer: usize,
        done: CancellationToken,
    ) -> (Self, ContextHandle) {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let (running_tx, running_rx) = watch::channel(false);

        let ctx = Self {
            id: id.clone(),
            debug,
            done: done.clone(),
            events: events_tx,
            running: Arc::new(running_tx),
        };
        let handle = ContextHandle {
            id,
            events: events_rx,
            running: running_rx,
            done,
        };
        (ctx, handle)
    }

    /// Identity of the resource owning this context
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Whether verbose diagnostics were requested
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Shutdown signal, cancelled once by the orchestrator
    pub fn done(&self) -> &CancellationToken {
        &self.done
    }

    /// Tell the orchestrator the resource is now watching.
    ///
    /// Idempotent: only the first call changes anything.
    pub fn running(&self) {
        let changed = self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        if changed && self.debug {
            log::debug!("{}: running", self.id);
        }
    }

    /// Ask the orchestrator to re-check this resource.
    ///
    /// Never blocks. If the event channel is full the request is dropped,
    /// since a queued request is still waiting to be served.
    pub fn event(&self) {
        let event = Event {
            resource: self.id.clone(),
        };
        match self.events.try_send(event) {
            Ok(()) => {
                if self.debug {
                    log::debug!("{}: event sent", self.id);
                }
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::debug!("{}: event dropped, a re-check is already queued", self.id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("{}: event dropped, orchestrator is gone", self.id);
            }
        }
    }

    /// Log a diagnostic line prefixed with the resource identity.
    pub fn logf(&self, args: fmt::Arguments<'_>) {
        log::info!("{}: {}", self.id, args);
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("debug", &self.debug)
            .field("done", &self.done.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ContextHandle {
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Whether the resource has signalled running
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Wait until the resource signals running.
    ///
    /// Returns `false` if every context clone was dropped first.
    pub async fn wait_running(&mut self) -> bool {
        self.running.wait_for(|running| *running).await.is_ok()
    }

    /// Wait for the next re-check request.
    ///
    /// Returns `None` once every context clone has been dropped.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Take a queued re-check request without waiting
    pub fn try_event(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Drop every queued re-check request, returning how many there were.
    pub fn drain_events(&mut self) -> usize {
        let mut count = 0;
        while self.events.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Request shutdown of the resource
    pub fn shutdown(&self) {
        self.done.cancel();
    }
}
