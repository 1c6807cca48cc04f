// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::dag::job::{JobName, JobSpec};
use crate::errors::{HarnessError, Result};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct prerequisites: jobs that must pass before this one can run.
    deps: Vec<JobName>,
    /// Direct dependents: jobs that list this one as a prerequisite.
    dependents: Vec<JobName>,
}

/// In-memory job graph keyed by job name.
///
/// Edges point from a dependent to its prerequisite. Acyclicity is enforced
/// on every [`DependencyGraph::add_edge`], so a graph that was built without
/// error is always a valid schedule.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<JobName, DagNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from job specs: every job first, then every
    /// prerequisite edge in name order.
    pub fn from_specs<'a>(specs: impl IntoIterator<Item = &'a JobSpec> + Clone) -> Result<Self> {
        let mut graph = Self::new();
        for spec in specs.clone() {
            graph.add_job(&spec.name)?;
        }
        for spec in specs {
            for prereq in &spec.prereqs {
                graph.add_edge(&spec.name, prereq)?;
            }
        }
        Ok(graph)
    }

    pub fn add_job(&mut self, name: &str) -> Result<()> {
        if self.nodes.contains_key(name) {
            return Err(HarnessError::DuplicateJob(name.to_string()));
        }
        self.nodes.insert(name.to_string(), DagNode::default());
        Ok(())
    }

    /// Record that `dependent` needs `prereq` to pass first.
    ///
    /// Fails with `UnknownJob` if either end is missing and with `Cycle` if
    /// the edge would close a cycle. Adding an existing edge is a no-op.
    pub fn add_edge(&mut self, dependent: &str, prereq: &str) -> Result<()> {
        for (missing, other) in [(dependent, prereq), (prereq, dependent)] {
            if !self.nodes.contains_key(missing) {
                return Err(HarnessError::UnknownJob {
                    missing: missing.to_string(),
                    referenced_by: other.to_string(),
                });
            }
        }

        if dependent == prereq || self.upstream_of(prereq).contains(dependent) {
            return Err(HarnessError::Cycle(format!(
                "adding prerequisite '{prereq}' to '{dependent}' closes a cycle"
            )));
        }

        if self.dependencies_of(dependent).iter().any(|d| d == prereq) {
            return Ok(());
        }

        if let Some(node) = self.nodes.get_mut(dependent) {
            node.deps.push(prereq.to_string());
        }
        if let Some(node) = self.nodes.get_mut(prereq) {
            node.dependents.push(dependent.to_string());
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All job names, sorted.
    pub fn jobs(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate prerequisites of a job.
    pub fn dependencies_of(&self, name: &str) -> &[JobName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a job.
    pub fn dependents_of(&self, name: &str) -> &[JobName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every job `name` transitively depends on.
    pub fn upstream_of(&self, name: &str) -> BTreeSet<JobName> {
        self.closure(name, |n| self.dependencies_of(n))
    }

    /// Every job that transitively depends on `name`.
    pub fn downstream_of(&self, name: &str) -> BTreeSet<JobName> {
        self.closure(name, |n| self.dependents_of(n))
    }

    /// Whether the graph orders `a` and `b` (one is upstream of the other).
    pub fn are_ordered(&self, a: &str, b: &str) -> bool {
        self.upstream_of(a).contains(b) || self.upstream_of(b).contains(a)
    }

    fn closure<'a, F>(&'a self, start: &str, next: F) -> BTreeSet<JobName>
    where
        F: Fn(&str) -> &'a [JobName],
    {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = next(start).iter().map(String::as_str).collect();

        while let Some(name) = stack.pop() {
            if seen.insert(name.to_string()) {
                stack.extend(next(name).iter().map(String::as_str));
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(jobs: &[&str]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for j in jobs {
            g.add_job(j).unwrap();
        }
        g
    }

    #[test]
    fn closures_follow_edges_transitively() {
        let mut g = graph(&["a", "b", "c", "d"]);
        g.add_edge("b", "a").unwrap();
        g.add_edge("c", "b").unwrap();

        assert_eq!(
            g.upstream_of("c").into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(g.downstream_of("a").len(), 2);
        assert!(g.are_ordered("a", "c"));
        assert!(!g.are_ordered("a", "d"));
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let mut g = graph(&["a", "b"]);
        g.add_edge("b", "a").unwrap();
        g.add_edge("b", "a").unwrap();
        assert_eq!(g.dependencies_of("b").len(), 1);
        assert_eq!(g.dependents_of("a").len(), 1);
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let mut g = graph(&["a"]);
        assert!(matches!(g.add_edge("a", "a"), Err(HarnessError::Cycle(_))));
    }
}
