//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a resource within a graph: its kind plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

/// Convergence state of a resource, as tracked by the orchestrator
///
/// ```text
/// Unknown -> Diverged -> Applying -> Converged | Diverged
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceState {
    /// Not checked yet
    #[default]
    Unknown,
    /// Live value differs from the desired value
    Diverged,
    /// A write is in progress
    Applying,
    /// Live value matches the desired value
    Converged,
}

impl ConvergenceState {
    /// State after a check that reported `converged`.
    pub fn from_check(converged: bool) -> Self {
        if converged {
            Self::Converged
        } else {
            Self::Diverged
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Diverged => write!(f, "diverged"),
            Self::Applying => write!(f, "applying"),
            Self::Converged => write!(f, "converged"),
        }
    }
}

/// Outcome of a single one-shot check of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Already at the desired value
    Converged,
    /// Differs and nothing was written (dry run)
    Diverged,
    /// Differed and the desired value was written
    Applied,
    /// The check or the write failed
    Failed { error: String },
}

impl CheckOutcome {
    /// Map a `check_apply` result to an outcome.
    pub fn from_result(apply: bool, result: &crate::Result<bool>) -> Self {
        match result {
            Ok(true) => Self::Converged,
            Ok(false) if apply => Self::Applied,
            Ok(false) => Self::Diverged,
            Err(e) => Self::Failed {
                error: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Summary of one-shot check results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckSummary {
    pub converged: usize,
    pub diverged: usize,
    pub applied: usize,
    pub failed: usize,
    /// Per-resource outcomes, in plan order
    pub results: Vec<(ResourceId, CheckOutcome)>,
}

impl CheckSummary {
    /// Check if every resource was checked without error
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Check if every resource is already at its desired value
    pub fn is_converged(&self) -> bool {
        self.failed == 0 && self.diverged == 0 && self.applied == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.converged + self.diverged + self.applied + self.failed
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, id: ResourceId, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::Converged => self.converged += 1,
            CheckOutcome::Diverged => self.diverged += 1,
            CheckOutcome::Applied => self.applied += 1,
            CheckOutcome::Failed { .. } => self.failed += 1,
        }
        self.results.push((id, outcome));
    }
}

/// Options for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Report divergence without writing anything
    pub noop: bool,
    /// Pass the debug flag to every execution context
    pub debug: bool,
    /// Slots in each resource's event channel
    pub event_buffer: usize,
    /// Number of parallel jobs for one-shot checks
    pub jobs: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            noop: false,
            debug: false,
            event_buffer: 16,
            jobs: 4,
        }
    }
}
