//! Change sources - where watch loops get their notifications from
//!
//! A [`ChangeSource`] hands out [`Subscription`]s scoped to one path. A
//! subscription yields [`Notification`]s or a terminal error, and releases
//! whatever backs it when closed or dropped.

use crate::error::{Error, Result};
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Kind of change seen on a watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
    Other,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Create => "create",
            Op::Write => "write",
            Op::Remove => "remove",
            Op::Rename => "rename",
            Op::Chmod => "chmod",
            Op::Other => "other",
        };
        f.write_str(s)
    }
}

/// A single change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub path: PathBuf,
    pub op: Op,
}

/// Result of polling a subscription without waiting
#[derive(Debug)]
pub enum Pending {
    /// A notification (or error) was queued
    Item(Result<Notification>),
    /// Nothing is queued right now
    Empty,
    /// The source side is gone
    Closed,
}

/// An open subscription on one path.
///
/// Dropping the subscription releases it.
pub struct Subscription {
    path: PathBuf,
    rx: mpsc::UnboundedReceiver<Result<Notification>>,
    guard: Option<Box<dyn Any + Send>>,
}

impl Subscription {
    /// Wrap a receiver; `guard` is kept alive until the subscription is released.
    pub fn new(
        path: &Path,
        rx: mpsc::UnboundedReceiver<Result<Notification>>,
        guard: impl Any + Send,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            rx,
            guard: Some(Box::new(guard)),
        }
    }

    /// Path this subscription watches
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next notification.
    ///
    /// `None` means the source closed the stream.
    pub async fn recv(&mut self) -> Option<Result<Notification>> {
        self.rx.recv().await
    }

    /// Take a queued notification without waiting
    pub fn try_recv(&mut self) -> Pending {
        match self.rx.try_recv() {
            Ok(item) => Pending::Item(item),
            Err(mpsc::error::TryRecvError::Empty) => Pending::Empty,
            Err(mpsc::error::TryRecvError::Disconnected) => Pending::Closed,
        }
    }

    /// Release the subscription. Safe to call more than once.
    pub fn close(&mut self) {
        if self.guard.take().is_some() {
            log::trace!("released subscription on {}", self.path.display());
        }
        self.rx.close();
    }

    pub fn is_released(&self) -> bool {
        self.guard.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Something that can open subscriptions on paths
pub trait ChangeSource: Send + Sync + fmt::Debug {
    /// Open a subscription on `path`
    fn subscribe(&self, path: &Path, recursive: bool) -> Result<Subscription>;
}

// ============================================================================
// Filesystem notifications
// ============================================================================

/// Change source backed by the platform file watcher (inotify on Linux).
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySource;

impl ChangeSource for NotifySource {
    fn subscribe(&self, path: &Path, recursive: bool) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watched = path.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let item = match res {
                    Ok(event) => match op_for(&event.kind) {
                        Some(op) => Ok(Notification {
                            path: event.paths.first().cloned().unwrap_or_else(|| watched.clone()),
                            op,
                        }),
                        None => return,
                    },
                    Err(e) => Err(Error::watch(&watched, e.to_string())),
                };
                // The receiver is gone once the subscription is released
                let _ = tx.send(item);
            },
            notify::Config::default(),
        )
        .map_err(|e| Error::watch(path, format!("cannot create watcher: {e}")))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(path, mode)
            .map_err(|e| Error::watch(path, format!("cannot watch: {e}")))?;

        Ok(Subscription::new(path, rx, watcher))
    }
}

/// Map a platform event to an operation; reads are not changes.
fn op_for(kind: &EventKind) -> Option<Op> {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(Op::Write),
        EventKind::Access(_) => None,
        EventKind::Create(_) => Some(Op::Create),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(Op::Chmod),
        EventKind::Modify(ModifyKind::Name(_)) => Some(Op::Rename),
        EventKind::Modify(_) => Some(Op::Write),
        EventKind::Remove(_) => Some(Op::Remove),
        EventKind::Any | EventKind::Other => Some(Op::Other),
    }
}

// ============================================================================
// In-memory notifications
// ============================================================================

/// Change source driven by hand.
///
/// Notifications are pushed with [`MemorySource::notify`]. Clones share the
/// same subscribers, so a test can keep one clone and give another to a
/// resource.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    subscribers: Vec<MemorySubscriber>,
    opened: usize,
}

#[derive(Debug)]
struct MemorySubscriber {
    path: PathBuf,
    tx: Option<mpsc::UnboundedSender<Result<Notification>>>,
    released: Arc<AtomicBool>,
}

/// Flags its subscriber as released when dropped
struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state, forgetting subscriptions that were released
    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .subscribers
            .retain(|s| !s.released.load(Ordering::SeqCst));
        f(&mut state)
    }

    fn send(&self, path: &Path, item: impl Fn() -> Result<Notification>) -> usize {
        self.with_state(|state| {
            state
                .subscribers
                .iter()
                .filter(|s| s.path == path)
                .filter_map(|s| s.tx.as_ref())
                .filter(|tx| tx.send(item()).is_ok())
                .count()
        })
    }

    /// Deliver a notification to every open subscription on `path`.
    ///
    /// Returns how many subscriptions received it.
    pub fn notify(&self, path: &Path, op: Op) -> usize {
        self.send(path, || {
            Ok(Notification {
                path: path.to_path_buf(),
                op,
            })
        })
    }

    /// Deliver a terminal error to every open subscription on `path`
    pub fn fail(&self, path: &Path, message: &str) -> usize {
        self.send(path, || Err(Error::watch(path, message)))
    }

    /// Close the stream of every subscription on `path` from the source side
    pub fn disconnect(&self, path: &Path) {
        self.with_state(|state| {
            for sub in state.subscribers.iter_mut().filter(|s| s.path == path) {
                sub.tx = None;
            }
        });
    }

    /// Number of subscriptions ever opened
    pub fn opened(&self) -> usize {
        self.with_state(|state| state.opened)
    }

    /// Number of subscriptions not yet released
    pub fn active(&self) -> usize {
        self.with_state(|state| state.subscribers.len())
    }
}

impl ChangeSource for MemorySource {
    fn subscribe(&self, path: &Path, _recursive: bool) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let released = Arc::new(AtomicBool::new(false));

        self.with_state(|state| {
            state.opened += 1;
            state.subscribers.push(MemorySubscriber {
                path: path.to_path_buf(),
                tx: Some(tx),
                released: Arc::clone(&released),
            });
        });

        Ok(Subscription::new(path, rx, ReleaseFlag(released)))
    }
}
