//! # Declarative
//!
//! Convergence core for declarative, event-driven resource management.
//!
//! Each resource states a desired value for one piece of system state.
//! The engine checks it, writes it when it differs, then watches the
//! target and re-checks whenever something outside changes it.
//!
//! ## Core Concepts
//!
//! - **Resource**: one managed entity with a lifecycle of
//!   `validate -> init -> watch -> check_apply -> close`
//! - **ExecutionContext**: what the engine hands a resource at `init`
//!   (logging, running signal, re-check requests, shutdown)
//! - **ChangeSource**: file change subscriptions feeding [`watch_loop`]
//! - **Registry**: maps a kind to a decoder for its definitions
//! - **ExecutionPlan**: the resources of one run, unique by identity
//! - **Engine**: runs every resource in its own task until shutdown
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Engine, EngineOptions, ExecutionPlan};
//!
//! let mut plan = ExecutionPlan::new();
//! plan.add_resource(Box::new(my_resource))?;
//!
//! let engine = Engine::new(EngineOptions::default());
//! let stop = engine.shutdown_token();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     stop.cancel();
//! });
//!
//! let summary = engine.run(plan).await?;
//! println!("{} converged", summary.converged());
//! ```
//!
//! One-shot checks without watching go through [`check_all`].

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod registry;
pub mod resource;
pub mod source;
pub mod types;
pub mod watch;

// Re-export main types at crate root
pub use context::{ContextHandle, Event, ExecutionContext};
pub use diff::{Change, GraphDiff};
pub use error::{Error, ErrorKind, Result};
pub use executor::{Engine, ResourceReport, RunSummary, check_all, validate_all};
pub use planner::ExecutionPlan;
pub use registry::{Decoder, Registry, RegistryBuilder};
pub use resource::{BoxedResource, Resource, ResourceExt};
pub use source::{ChangeSource, MemorySource, Notification, NotifySource, Op, Pending, Subscription};
pub use types::{CheckOutcome, CheckSummary, ConvergenceState, EngineOptions, ResourceId};
pub use watch::watch_loop;
