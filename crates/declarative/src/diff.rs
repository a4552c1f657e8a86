//! Graph re-diff - decide which resources survive a new definition set
//!
//! Resources are matched by identity. A matched pair that is equivalent
//! under `cmp` keeps running; anything else is replaced.

use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};

/// What happens to one resource when moving from the old set to the new one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    /// Equivalent in both sets, keeps running
    Unchanged,
    /// Present in both sets but not equivalent
    Replaced { reason: String },
    /// Only in the new set
    Added,
    /// Only in the old set
    Removed,
}

/// Per-resource changes between two definition sets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDiff {
    pub changes: Vec<(ResourceId, Change)>,
}

impl GraphDiff {
    /// Compare an old plan with a new one.
    ///
    /// Entries follow the new plan's order, then removed resources in the
    /// old plan's order.
    pub fn compute(old: &ExecutionPlan, new: &ExecutionPlan) -> Self {
        let mut changes = Vec::with_capacity(new.total_resources());

        for res in new.resources() {
            let id = res.id();
            let change = match old.get(&id) {
                None => Change::Added,
                Some(previous) => match Resource::cmp(previous, res.as_ref()) {
                    Ok(()) => Change::Unchanged,
                    Err(e) => Change::Replaced {
                        reason: e.to_string(),
                    },
                },
            };
            changes.push((id, change));
        }

        for res in old.resources() {
            let id = res.id();
            if new.get(&id).is_none() {
                changes.push((id, Change::Removed));
            }
        }

        Self { changes }
    }

    fn count(&self, pred: impl Fn(&Change) -> bool) -> usize {
        self.changes.iter().filter(|(_, c)| pred(c)).count()
    }

    pub fn unchanged(&self) -> usize {
        self.count(|c| matches!(c, Change::Unchanged))
    }

    pub fn replaced(&self) -> usize {
        self.count(|c| matches!(c, Change::Replaced { .. }))
    }

    pub fn added(&self) -> usize {
        self.count(|c| matches!(c, Change::Added))
    }

    pub fn removed(&self) -> usize {
        self.count(|c| matches!(c, Change::Removed))
    }

    /// Check if anything needs to be restarted
    pub fn has_changes(&self) -> bool {
        self.unchanged() != self.changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::Scripted;

    fn plan(defs: &[(&str, &str)]) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        for (name, value) in defs {
            plan.add_resource(Box::new(Scripted::new(name, value, "")))
                .unwrap();
        }
        plan
    }

    #[test]
    fn test_identical_sets_are_unchanged() {
        let old = plan(&[("a", "1"), ("b", "2")]);
        let new = plan(&[("a", "1"), ("b", "2")]);
        let diff = GraphDiff::compute(&old, &new);
        assert_eq!(diff.unchanged(), 2);
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_classifies_every_change() {
        let old = plan(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let new = plan(&[("a", "1"), ("b", "20"), ("d", "4")]);
        let diff = GraphDiff::compute(&old, &new);

        assert_eq!(diff.unchanged(), 1);
        assert_eq!(diff.replaced(), 1);
        assert_eq!(diff.added(), 1);
        assert_eq!(diff.removed(), 1);
        assert!(diff.has_changes());

        let (id, change) = &diff.changes[1];
        assert_eq!(id.name, "b");
        assert_eq!(
            *change,
            Change::Replaced {
                reason: "the value differs".into()
            }
        );
        assert_eq!(diff.changes[3].0.name, "c");
    }
}
