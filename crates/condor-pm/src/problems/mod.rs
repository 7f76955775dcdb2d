//! Explanations for requests without a solution.
//!
//! The graph is only built on demand from an [`Unsolvable`](crate::solver::Unsolvable)
//! and holds the jobs that failed, the packages they reach and what rules
//! those packages out.

mod explain;
mod graph;
mod union_find;

pub use explain::{explain_lines, render, ExplainFormat, Line};
pub use graph::{ConstraintKind, NodeId, ProblemEdge, ProblemNode, ProblemsGraph};
pub use union_find::UnionFind;

use std::collections::{HashMap, HashSet};

/// Group root jobs that reach a common problem node.
///
/// Conflicts are edges of the graph, so two jobs that get in each other's
/// way share a node. Each group is an independent conflicting subset;
/// groups are ordered by their first root.
pub fn group_roots(graph: &ProblemsGraph) -> Vec<Vec<NodeId>> {
    let roots = graph.roots();
    let mut sets = UnionFind::new(roots.len());
    let mut owners: HashMap<NodeId, usize> = HashMap::new();

    for (i, &root) in roots.iter().enumerate() {
        let mut reachable: Vec<NodeId> = graph.reachable(root).into_iter().collect();
        reachable.sort_unstable();

        for node in reachable.into_iter().filter(|&n| n != root) {
            match owners.get(&node) {
                Some(&j) => {
                    sets.union(i, j);
                }
                None => {
                    owners.insert(node, i);
                }
            }
        }
    }

    sets.groups()
        .into_iter()
        .map(|group| group.into_iter().map(|i| roots[i]).collect())
        .collect()
}

/// One explanation per independent group, duplicates removed
pub fn describe_groups(graph: &ProblemsGraph, format: ExplainFormat) -> Vec<String> {
    let mut seen = HashSet::new();
    group_roots(graph)
        .into_iter()
        .filter_map(|group| {
            let lines = explain_lines(graph, &group);
            if lines.iter().all(|line| line.children.is_empty()) {
                return None;
            }
            Some(render(&lines, format))
        })
        .filter(|text| seen.insert(text.clone()))
        .collect()
}
