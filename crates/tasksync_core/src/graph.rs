//! Blocked-by dependency graph.
//!
//! An edge `task -> blocker` means `task` is blocked by `blocker`. The
//! graph must stay acyclic; every check here runs before a write is
//! persisted.

use crate::error::ValidationError;
use crate::id::RecordId;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Snapshot of blocked-by edges between live tasks.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<RecordId, BTreeSet<RecordId>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from `(task, blocked_by)` pairs.
    pub fn from_edges<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (RecordId, &'a BTreeSet<RecordId>)>,
    {
        let mut graph = Self::new();
        for (task, blockers) in tasks {
            graph.set_blockers(task, blockers.clone());
        }
        graph
    }

    /// Replaces the blockers of `task` without validation.
    pub fn set_blockers(&mut self, task: RecordId, blockers: BTreeSet<RecordId>) {
        self.edges.insert(task, blockers);
    }

    /// Returns true if the graph knows about `task`.
    #[must_use]
    pub fn contains(&self, task: RecordId) -> bool {
        self.edges.contains_key(&task)
    }

    /// Returns the direct blockers of `task`.
    pub fn blockers(&self, task: RecordId) -> impl Iterator<Item = RecordId> + '_ {
        self.edges.get(&task).into_iter().flatten().copied()
    }

    /// Returns true if `from` is blocked, directly or transitively, by
    /// `target`.
    #[must_use]
    pub fn depends_on(&self, from: RecordId, target: RecordId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            for next in self.blockers(current) {
                if next == target {
                    return true;
                }
                stack.push(next);
            }
        }
        false
    }

    /// Validates adding the edge `task -> blocker`.
    ///
    /// Rejected when `blocker` is `task` or already depends on `task`.
    pub fn check_edge(&self, task: RecordId, blocker: RecordId) -> Result<(), ValidationError> {
        if task == blocker {
            return Err(ValidationError::SelfDependency(task));
        }
        if self.depends_on(blocker, task) {
            return Err(ValidationError::DependencyCycle { task, blocker });
        }
        Ok(())
    }

    /// Validates replacing the blockers of `task` with `blockers`.
    ///
    /// A path from a blocker back to `task` never passes through `task`'s
    /// own outgoing edges, so the existing edges of `task` need not be
    /// removed first.
    pub fn check_blockers(
        &self,
        task: RecordId,
        blockers: &BTreeSet<RecordId>,
    ) -> Result<(), ValidationError> {
        blockers
            .iter()
            .try_for_each(|&blocker| self.check_edge(task, blocker))
    }

    /// Finds any cycle, returned as the list of tasks on it.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<RecordId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            node: RecordId,
            marks: &mut HashMap<RecordId, Mark>,
            path: &mut Vec<RecordId>,
        ) -> Option<Vec<RecordId>> {
            match marks.get(&node) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|&n| n == node).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            path.push(node);
            for next in graph.blockers(node) {
                if let Some(cycle) = visit(graph, next, marks, path) {
                    return Some(cycle);
                }
            }
            path.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut nodes: Vec<_> = self.edges.keys().copied().collect();
        nodes.sort();
        for node in nodes {
            let mut path = Vec::new();
            if let Some(cycle) = visit(self, node, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}
