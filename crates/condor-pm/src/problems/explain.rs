use condor_spec::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::graph::{NodeId, ProblemEdge, ProblemNode, ProblemsGraph};

/// Layout of an explanation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainFormat {
    /// Two spaces per nesting level
    #[default]
    Indented,
    /// Box-drawing branches
    Tree,
}

/// One line of an explanation and the lines nested under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub children: Vec<Line>,
}

impl Line {
    fn leaf(text: String) -> Self {
        Self {
            text,
            children: Vec::new(),
        }
    }
}

/// Causal chains for `roots`.
///
/// Each package is expanded under the node that reaches it first in a
/// breadth-first walk from the roots, so it appears at its shallowest depth.
/// Other references to it are marked instead of repeated.
pub fn explain_lines(graph: &ProblemsGraph, roots: &[NodeId]) -> Vec<Line> {
    let mut expander = Expander {
        graph,
        owners: claim_owners(graph, roots),
        shown: HashSet::new(),
    };
    roots
        .iter()
        .filter_map(|&root| {
            let node = graph.node(root)?;
            Some(Line {
                text: node.to_string(),
                children: expander.node_children(root),
            })
        })
        .collect()
}

/// The node under which each reachable package gets expanded
fn claim_owners(graph: &ProblemsGraph, roots: &[NodeId]) -> HashMap<NodeId, NodeId> {
    let mut owners = HashMap::new();
    let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        for (_, targets) in requirement_groups(graph, id) {
            for target in targets {
                let is_package = graph.node(target).is_some_and(|n| n.package().is_some());
                if is_package && !owners.contains_key(&target) {
                    owners.insert(target, id);
                    queue.push_back(target);
                }
            }
        }
    }
    owners
}

pub fn render(lines: &[Line], format: ExplainFormat) -> String {
    let mut out = Vec::new();
    for line in lines {
        out.push(line.text.clone());
        match format {
            ExplainFormat::Indented => render_indented(&line.children, 1, &mut out),
            ExplainFormat::Tree => render_tree(&line.children, "", &mut out),
        }
    }
    out.join("\n")
}

fn render_indented(lines: &[Line], depth: usize, out: &mut Vec<String>) {
    for line in lines {
        out.push(format!("{}{}", "  ".repeat(depth), line.text));
        render_indented(&line.children, depth + 1, out);
    }
}

fn render_tree(lines: &[Line], prefix: &str, out: &mut Vec<String>) {
    let count = lines.len();
    for (idx, line) in lines.iter().enumerate() {
        let is_last = idx + 1 == count;
        let branch = if is_last { "└── " } else { "├── " };
        out.push(format!("{}{}{}", prefix, branch, line.text));

        let new_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
        render_tree(&line.children, &new_prefix, out);
    }
}

type PackageKey = (String, Option<Reverse<Version>>, NodeId);

/// Sort key: package name, then version descending
fn package_key(graph: &ProblemsGraph, id: NodeId) -> PackageKey {
    match graph.node(id).and_then(ProblemNode::package) {
        Some(p) => (p.name.to_lowercase(), Some(Reverse(p.version.clone())), id),
        None => (String::new(), None, id),
    }
}

/// Outgoing requirements of `id` grouped by spec, in display order
fn requirement_groups(graph: &ProblemsGraph, id: NodeId) -> Vec<(String, Vec<NodeId>)> {
    let mut requires: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for (to, edge) in graph.successors(id) {
        if let ProblemEdge::Requires(spec) = edge {
            requires.entry(spec.clone()).or_default().push(to);
        }
    }

    let mut groups: Vec<(String, Vec<NodeId>)> = requires.into_iter().collect();
    for (_, targets) in groups.iter_mut() {
        targets.sort_by_key(|&t| package_key(graph, t));
    }
    groups.sort_by_key(|(spec, targets)| (targets.first().map(|&t| package_key(graph, t)), spec.clone()));
    groups
}

/// Constraints ruling `id` out, one line each
fn exclusion_lines(graph: &ProblemsGraph, id: NodeId) -> Vec<Line> {
    graph
        .successors(id)
        .filter(|(_, edge)| matches!(edge, ProblemEdge::Excludes))
        .filter_map(|(to, _)| graph.node(to))
        .map(|constraint| Line::leaf(constraint.to_string()))
        .collect()
}

struct Expander<'a> {
    graph: &'a ProblemsGraph,
    owners: HashMap<NodeId, NodeId>,
    /// Packages whose expansion was already emitted
    shown: HashSet<NodeId>,
}

impl Expander<'_> {
    fn node_children(&mut self, id: NodeId) -> Vec<Line> {
        let graph = self.graph;
        let mut other = Vec::new();

        for (to, edge) in graph.successors(id) {
            match edge {
                ProblemEdge::Requires(_) => {}
                ProblemEdge::Conflicts(reason) => {
                    let target = graph.node(to).map(ToString::to_string).unwrap_or_default();
                    let line = Line {
                        text: format!("conflicts with {} ({})", target, reason),
                        children: exclusion_lines(graph, to),
                    };
                    other.push((package_key(graph, to), line));
                }
                ProblemEdge::Excludes => {
                    let constraint = graph.node(to).map(ToString::to_string).unwrap_or_default();
                    other.push((package_key(graph, to), Line::leaf(constraint)));
                }
            }
        }

        let mut lines = Vec::new();
        for (spec, targets) in requirement_groups(graph, id) {
            lines.push(self.requirement_line(id, &spec, &targets));
        }
        other.sort_by(|a, b| a.0.cmp(&b.0));
        lines.extend(other.into_iter().map(|(_, line)| line));
        lines
    }

    fn requirement_line(&mut self, parent: NodeId, spec: &str, targets: &[NodeId]) -> Line {
        let graph = self.graph;
        let packages: Vec<NodeId> = targets
            .iter()
            .copied()
            .filter(|&t| graph.node(t).is_some_and(|n| n.package().is_some()))
            .collect();

        if packages.is_empty() {
            return Line::leaf(format!("nothing provides {}", spec));
        }

        let text = format!("requires {}, provided by {}", spec, choice_text(graph, &packages));

        let owned: Vec<NodeId> = packages
            .iter()
            .copied()
            .filter(|p| self.owners.get(p) == Some(&parent) && !self.shown.contains(p))
            .collect();
        if owned.is_empty() {
            let marker = if packages.iter().any(|p| self.shown.contains(p)) {
                "see above"
            } else {
                "see below"
            };
            return Line::leaf(format!("{} ({})", text, marker));
        }
        self.shown.extend(owned.iter().copied());

        let mut children = Vec::new();
        if packages.len() == 1 {
            children = self.node_children(packages[0]);
        } else {
            for member in owned {
                let member_children = self.node_children(member);
                if member_children.is_empty() {
                    continue;
                }
                children.push(Line {
                    text: graph.node(member).map(ToString::to_string).unwrap_or_default(),
                    children: member_children,
                });
            }
        }

        Line { text, children }
    }
}

/// Same-name candidates shown as one choice: `c 2.0 | 1.0`
fn choice_text(graph: &ProblemsGraph, packages: &[NodeId]) -> String {
    let records: Vec<_> = packages
        .iter()
        .filter_map(|&p| graph.node(p).and_then(ProblemNode::package))
        .collect();

    match records.as_slice() {
        [single] => single.to_string(),
        [first, ..] if records.iter().all(|r| r.name.eq_ignore_ascii_case(&first.name)) => {
            let mut versions: Vec<String> = Vec::new();
            for record in &records {
                let version = record.version.to_string();
                if !versions.contains(&version) {
                    versions.push(version);
                }
            }
            format!("{} {}", first.name, versions.join(" | "))
        }
        _ => records.iter().map(ToString::to_string).collect::<Vec<_>>().join(" | "),
    }
}
