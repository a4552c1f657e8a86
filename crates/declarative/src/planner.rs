//! Execution planner - the set of resources one run manages

use crate::error::{Error, Result};
use crate::resource::{BoxedResource, Resource};
use crate::types::ResourceId;
use std::collections::BTreeSet;

/// Resources for one run, in definition order, unique by identity
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    resources: Vec<BoxedResource>,
    ids: BTreeSet<ResourceId>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource. Two resources with the same kind and name are rejected.
    pub fn add_resource(&mut self, resource: BoxedResource) -> Result<()> {
        let id = resource.id();
        if !self.ids.insert(id.clone()) {
            return Err(Error::DuplicateResource(id.to_string()));
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        let resources: Vec<BoxedResource> = self
            .resources
            .into_iter()
            .filter(|r| predicate(r.as_ref()))
            .collect();
        let ids = resources.iter().map(|r| r.id()).collect();
        Self { resources, ids }
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "kind" or "kind:name", where name matches by substring
    /// (names of sysctls contain dots, so the separator is a colon).
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|r| matches_filter(r, kind, name))
            }
        }
    }

    /// Look up a resource by identity
    pub fn get(&self, id: &ResourceId) -> Option<&dyn Resource> {
        self.resources
            .iter()
            .find(|r| r.id() == *id)
            .map(|r| r.as_ref())
    }

    pub fn resources(&self) -> &[BoxedResource] {
        &self.resources
    }

    pub fn into_resources(self) -> Vec<BoxedResource> {
        self.resources
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Parse a target string like "kind:name" into (kind, name)
fn parse_target(target: &str) -> (Option<&str>, Option<&str>) {
    match target.split_once(':') {
        Some(("", name)) => (None, Some(name)),
        Some((kind, "")) => (Some(kind), None),
        Some((kind, name)) => (Some(kind), Some(name)),
        None => (Some(target), None),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &dyn Resource, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind
        && resource.kind() != k
    {
        return false;
    }

    if let Some(n) = name
        && !resource.name().contains(n)
    {
        return false;
    }

    true
}
