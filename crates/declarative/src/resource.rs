//! Resource trait for declarative state management
//!
//! A Resource represents one managed entity with a desired state. The
//! orchestrator drives it through a fixed lifecycle:
//!
//! ```text
//! validate -> init(ctx) -> watch (own task) -> check_apply (per event) -> close
//! ```

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::types::ResourceId;
use async_trait::async_trait;
use std::fmt;

/// Core trait for declarative resources
///
/// # Example
///
/// ```ignore
/// use declarative::{ExecutionContext, Resource, Result};
///
/// #[derive(Debug)]
/// struct Motd {
///     name: String,
///     text: String,
///     ctx: std::sync::Mutex<Option<ExecutionContext>>,
/// }
///
/// #[async_trait::async_trait]
/// impl Resource for Motd {
///     fn kind(&self) -> &'static str { "motd" }
///     fn name(&self) -> &str { &self.name }
///     fn validate(&self) -> Result<()> { Ok(()) }
///     fn init(&self, ctx: ExecutionContext) -> Result<()> { /* store */ Ok(()) }
///     fn check_apply(&self, apply: bool) -> Result<bool> { /* read, compare, write */ Ok(true) }
///     async fn watch(&self) -> Result<()> { /* subscribe, watch_loop */ Ok(()) }
///     fn cmp_fields(&self) -> Vec<(&'static str, String)> {
///         vec![("text", self.text.clone())]
///     }
///     fn close(&self) -> Result<()> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait Resource: Send + Sync + fmt::Debug {
    /// Variant name, e.g. "sysctl"
    fn kind(&self) -> &'static str;

    /// Name of this resource, unique per kind within a graph
    fn name(&self) -> &str;

    /// Identity used for logging, planning and diffing
    fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.name())
    }

    /// Human-readable description of what this resource does
    fn description(&self) -> String {
        self.id().to_string()
    }

    /// Check the definition before anything is mutated.
    ///
    /// May inspect the environment (existence of the target). Problems are
    /// reported as [`Error::InvalidDefinition`].
    fn validate(&self) -> Result<()>;

    /// Store the execution context. Called exactly once, must not block.
    fn init(&self, ctx: ExecutionContext) -> Result<()>;

    /// Compare live state with desired state and converge if `apply`.
    ///
    /// Returns `true` when the live state already matched. With `apply`
    /// false nothing is mutated. The orchestrator never runs two of these
    /// at once for the same resource.
    fn check_apply(&self, apply: bool) -> Result<bool>;

    /// Watch the target and request re-checks until shutdown.
    ///
    /// Signals running once the watch is armed. Returns `Ok(())` on
    /// cancellation and an error when the change source fails.
    async fn watch(&self) -> Result<()>;

    /// Fields that take part in equivalence, in a stable order
    fn cmp_fields(&self) -> Vec<(&'static str, String)>;

    /// Check whether `other` is equivalent to this resource.
    ///
    /// A different variant is a [`Error::KindMismatch`], a differing field
    /// is a [`Error::Mismatch`]. Pure: nothing is read from the system.
    fn cmp(&self, other: &dyn Resource) -> Result<()> {
        if self.kind() != other.kind() {
            return Err(Error::KindMismatch {
                expected: self.kind(),
                found: other.kind(),
            });
        }

        let theirs = other.cmp_fields();
        for (field, ours) in self.cmp_fields() {
            let same = theirs
                .iter()
                .any(|(name, value)| *name == field && *value == ours);
            if !same {
                return Err(Error::Mismatch { field });
            }
        }
        Ok(())
    }

    /// Release anything held since `init`. A no-op if `init` never ran.
    fn close(&self) -> Result<()>;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// Extension trait for working with resources
pub trait ResourceExt {
    /// Whether `other` is equivalent to this resource
    fn equivalent(&self, other: &dyn Resource) -> bool;
}

impl<R: Resource + ?Sized> ResourceExt for R {
    fn equivalent(&self, other: &dyn Resource) -> bool {
        Resource::cmp(self, other).is_ok()
    }
}
