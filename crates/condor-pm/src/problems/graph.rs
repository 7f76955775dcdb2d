use condor_spec::{MatchSpec, PackageInfo};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::database::Database;
use crate::request::{JobAction, Request};
use crate::solver::policy::Policy;
use crate::solver::SolverFlags;

/// Upper bound on discovered packages before the graph is truncated
const MAX_PACKAGE_NODES: usize = 5_000;

pub type NodeId = usize;

/// Why a package cannot be part of a solution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Excluded by a pin
    Pin(String),
    /// Matched by a remove job
    Removed(String),
    /// Hidden by the candidate policy (channel priority, downgrade)
    Policy(String),
    /// Installed and kept because uninstalling is not allowed
    Installed(String),
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Pin(spec) => write!(f, "is excluded by pin {}", spec),
            ConstraintKind::Removed(spec) => write!(f, "is requested to be removed ({})", spec),
            ConstraintKind::Policy(reason) => write!(f, "is excluded: {}", reason),
            ConstraintKind::Installed(_) => f.write_str("is already installed"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProblemNode {
    /// A failing job of the request
    Root { job: usize, label: String },
    /// A candidate record
    Package { index: usize, package: Arc<PackageInfo> },
    /// A requirement nothing provides
    Unresolved { spec: String },
    /// Something that rules packages out
    Constraint(ConstraintKind),
}

impl ProblemNode {
    pub fn is_root(&self) -> bool {
        matches!(self, ProblemNode::Root { .. })
    }

    pub fn package(&self) -> Option<&Arc<PackageInfo>> {
        match self {
            ProblemNode::Package { package, .. } => Some(package),
            _ => None,
        }
    }
}

impl fmt::Display for ProblemNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemNode::Root { label, .. } => f.write_str(label),
            ProblemNode::Package { package, .. } => write!(f, "{}", package),
            ProblemNode::Unresolved { spec } => write!(f, "nothing provides {}", spec),
            ProblemNode::Constraint(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemEdge {
    /// The source needs one of the targets reached through this spec
    Requires(String),
    /// Source and target cannot be installed together
    Conflicts(String),
    /// The target rules the source out
    Excludes,
}

/// Why a request has no solution, as a directed acyclic graph.
///
/// Nodes are numbered in discovery order and every edge points from a lower
/// to a higher id. Only nodes leading to an unresolved requirement, a
/// conflict or an exclusion are kept.
#[derive(Debug, Clone, Default)]
pub struct ProblemsGraph {
    nodes: Vec<ProblemNode>,
    edges: Vec<(NodeId, NodeId, ProblemEdge)>,
    roots: Vec<NodeId>,
}

impl ProblemsGraph {
    pub fn nodes(&self) -> &[ProblemNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&ProblemNode> {
        self.nodes.get(id)
    }

    pub fn edges(&self) -> &[(NodeId, NodeId, ProblemEdge)] {
        &self.edges
    }

    /// Root job nodes, in job order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &ProblemEdge)> {
        self.edges
            .iter()
            .filter(move |(from, _, _)| *from == id)
            .map(|(_, to, edge)| (*to, edge))
    }

    /// Nodes reachable from `id`, including itself
    pub fn reachable(&self, id: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(node) = queue.pop_front() {
            for (next, _) in self.successors(node) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Whether every edge points forward in discovery order
    pub fn is_acyclic(&self) -> bool {
        self.edges.iter().all(|(from, to, _)| from < to)
    }

    /// Build the graph for the failing jobs of `request`
    pub fn build(db: &Database, request: &Request, failing_jobs: &[usize], flags: &SolverFlags) -> Self {
        let start = Instant::now();
        let policy = Policy::new(db, request, flags);
        let mut builder = GraphBuilder {
            db,
            request,
            policy,
            graph: ProblemsGraph::default(),
            packages: HashMap::new(),
            unresolved: HashMap::new(),
            constraints: HashMap::new(),
            queue: VecDeque::new(),
            requirements: Vec::new(),
            constrains: Vec::new(),
            keep_installed: !flags.allow_uninstall,
            truncated: false,
        };

        let mut jobs = failing_jobs.to_vec();
        jobs.sort_unstable();
        jobs.dedup();
        for job_index in jobs {
            if let Some(job) = request.job(job_index) {
                builder.add_root(job_index, job.action, &job.spec);
            }
        }

        builder.walk();
        builder.add_constrains_conflicts();
        builder.add_same_name_conflicts();

        if builder.truncated {
            log::warn!(
                "Problems graph truncated at {} packages; the explanation may be incomplete",
                MAX_PACKAGE_NODES
            );
        }

        let graph = builder.graph.pruned();
        log::debug!(
            "Built problems graph with {} nodes and {} edges in {:?}",
            graph.nodes.len(),
            graph.edges.len(),
            start.elapsed()
        );
        graph
    }

    /// Keep the roots and every node with a path to a problem node
    fn pruned(self) -> Self {
        let mut keep = vec![false; self.nodes.len()];
        for (from, to, edge) in &self.edges {
            if matches!(edge, ProblemEdge::Conflicts(_) | ProblemEdge::Excludes) {
                keep[*from] = true;
                keep[*to] = true;
            }
        }
        for (id, node) in self.nodes.iter().enumerate() {
            if matches!(node, ProblemNode::Unresolved { .. } | ProblemNode::Constraint(_)) {
                keep[id] = true;
            }
        }

        // Edges point forward, so one backwards sweep settles reachability
        for id in (0..self.nodes.len()).rev() {
            if keep[id] {
                continue;
            }
            let leads_to_problem = self
                .edges
                .iter()
                .any(|(from, to, edge)| *from == id && keep[*to] && matches!(edge, ProblemEdge::Requires(_)));
            keep[id] = leads_to_problem;
        }
        for &root in &self.roots {
            keep[root] = true;
        }

        let mut remap = vec![None; self.nodes.len()];
        let mut nodes = Vec::new();
        for (id, node) in self.nodes.into_iter().enumerate() {
            if keep[id] {
                remap[id] = Some(nodes.len());
                nodes.push(node);
            }
        }

        let edges = self
            .edges
            .into_iter()
            .filter_map(|(from, to, edge)| Some((remap[from]?, remap[to]?, edge)))
            .collect();
        let roots = self.roots.iter().filter_map(|&r| remap[r]).collect();

        Self { nodes, edges, roots }
    }
}

/// A requirement as seen while walking: who asked, for which name, and which
/// candidates survive every exclusion
struct Requirement {
    from: NodeId,
    name: String,
    spec: String,
    allowed: Vec<usize>,
}

struct GraphBuilder<'a> {
    db: &'a Database,
    request: &'a Request,
    policy: Policy<'a>,
    graph: ProblemsGraph,
    packages: HashMap<usize, NodeId>,
    unresolved: HashMap<String, NodeId>,
    constraints: HashMap<ConstraintKind, NodeId>,
    queue: VecDeque<NodeId>,
    requirements: Vec<Requirement>,
    constrains: Vec<(NodeId, MatchSpec)>,
    /// Installed records must stay, so they conflict with whatever rules
    /// their name out
    keep_installed: bool,
    truncated: bool,
}

impl GraphBuilder<'_> {
    fn push(&mut self, node: ProblemNode) -> NodeId {
        self.graph.nodes.push(node);
        self.graph.nodes.len() - 1
    }

    fn edge(&mut self, from: NodeId, to: NodeId, edge: ProblemEdge) {
        if from < to && !self.graph.edges.iter().any(|(f, t, e)| *f == from && *t == to && *e == edge) {
            self.graph.edges.push((from, to, edge));
        }
    }

    fn add_root(&mut self, job: usize, action: JobAction, spec: &MatchSpec) {
        let root = self.push(ProblemNode::Root {
            job,
            label: format!("{} {}", action, spec),
        });
        self.graph.roots.push(root);

        match action {
            JobAction::Install | JobAction::Update => self.require(root, spec),
            JobAction::Remove => {
                for index in self.db.candidate_indices(spec) {
                    if let Some(node) = self.package(index) {
                        let constraint = self.constraint(ConstraintKind::Removed(spec.to_string()));
                        self.edge(node, constraint, ProblemEdge::Excludes);
                    }
                }
            }
        }
    }

    fn package(&mut self, index: usize) -> Option<NodeId> {
        if let Some(&id) = self.packages.get(&index) {
            return Some(id);
        }
        if self.packages.len() >= MAX_PACKAGE_NODES {
            self.truncated = true;
            return None;
        }

        let stored = self.db.record(index)?;
        let id = self.push(ProblemNode::Package {
            index,
            package: Arc::clone(&stored.record),
        });
        self.packages.insert(index, id);
        self.queue.push_back(id);
        Some(id)
    }

    fn constraint(&mut self, kind: ConstraintKind) -> NodeId {
        if let Some(&id) = self.constraints.get(&kind) {
            return id;
        }
        let id = self.push(ProblemNode::Constraint(kind.clone()));
        self.constraints.insert(kind, id);
        id
    }

    fn require(&mut self, from: NodeId, spec: &MatchSpec) {
        let spec_text = spec.to_string();
        let mut candidates = self.db.candidate_indices(spec);

        if candidates.is_empty() {
            let id = match self.unresolved.get(&spec_text) {
                Some(&id) => id,
                None => {
                    let id = self.push(ProblemNode::Unresolved {
                        spec: spec_text.clone(),
                    });
                    self.unresolved.insert(spec_text.clone(), id);
                    id
                }
            };
            self.edge(from, id, ProblemEdge::Requires(spec_text));
            return;
        }

        self.policy.sort(&mut candidates);

        let mut allowed = Vec::new();
        for index in candidates {
            let Some(node) = self.package(index) else {
                continue;
            };
            self.edge(from, node, ProblemEdge::Requires(spec_text.clone()));

            let mut excluded = false;
            if let Some(exclusion) = self.policy.exclusion(index) {
                let constraint = self.constraint(ConstraintKind::Policy(exclusion.to_string()));
                self.edge(node, constraint, ProblemEdge::Excludes);
                excluded = true;
            }
            for pin in self.violated_pins(index) {
                let constraint = self.constraint(ConstraintKind::Pin(pin));
                self.edge(node, constraint, ProblemEdge::Excludes);
                excluded = true;
            }
            if self.is_removed(index) {
                excluded = true;
            }
            if !excluded {
                allowed.push(index);
            }
        }

        self.requirements.push(Requirement {
            from,
            name: spec.name().unwrap_or("*").to_lowercase(),
            spec: spec_text,
            allowed,
        });
    }

    fn violated_pins(&self, index: usize) -> Vec<String> {
        let Some(stored) = self.db.record(index) else {
            return Vec::new();
        };
        self.request
            .pins()
            .iter()
            .filter(|pin| pin.name().is_some_and(|n| n.eq_ignore_ascii_case(stored.name())))
            .filter(|pin| !pin.matches(&stored.record))
            .map(ToString::to_string)
            .collect()
    }

    fn is_removed(&self, index: usize) -> bool {
        let Some(stored) = self.db.record(index) else {
            return false;
        };
        self.request
            .jobs()
            .iter()
            .any(|job| job.action == JobAction::Remove && job.spec.matches(&stored.record))
    }

    fn walk(&mut self) {
        let db = self.db;
        while let Some(node) = self.queue.pop_front() {
            let index = match self.graph.nodes.get(node) {
                Some(ProblemNode::Package { index, .. }) => *index,
                _ => continue,
            };
            let Some(stored) = db.record(index) else {
                continue;
            };

            for dep in &stored.depends {
                self.require(node, dep);
            }
            for constraint in &stored.constrains {
                self.constrains.push((node, constraint.clone()));
            }
        }
    }

    /// Package nodes for the installed records `constraint` rules out, each
    /// marked as kept
    fn attach_installed(&mut self, name: &str, constraint: &MatchSpec) {
        let db = self.db;
        for index in db.records_named(name) {
            let Some(stored) = db.record(index).filter(|r| r.installed && !constraint.matches(&r.record)) else {
                continue;
            };
            if self.is_removed(index) {
                continue;
            }
            let Some(node) = self.package(index) else {
                continue;
            };
            let constraint = self.constraint(ConstraintKind::Installed(stored.record.dist_str()));
            self.edge(node, constraint, ProblemEdge::Excludes);
        }
    }

    fn add_constrains_conflicts(&mut self) {
        let constrains = std::mem::take(&mut self.constrains);
        for (node, constraint) in constrains {
            let Some(name) = constraint.name() else {
                continue;
            };
            if self.keep_installed {
                self.attach_installed(name, &constraint);
            }
            let mut others: Vec<(usize, NodeId)> = self
                .packages
                .iter()
                .map(|(&index, &id)| (index, id))
                .filter(|&(_, id)| id != node)
                .collect();
            others.sort_unstable_by_key(|&(_, id)| id);

            for (index, other) in others {
                let violates = self.db.record(index).is_some_and(|r| {
                    r.record.name.eq_ignore_ascii_case(name) && !constraint.matches(&r.record)
                });
                if violates {
                    let (from, to) = (node.min(other), node.max(other));
                    self.edge(from, to, ProblemEdge::Conflicts(constraint.to_string()));
                }
            }
        }
    }

    /// Packages that cannot be installed whatever else is chosen: some
    /// requirement of theirs has no target that could be
    fn broken_packages(&self) -> HashSet<NodeId> {
        let mut broken = HashSet::new();
        // Edges point forward, so targets are settled before their sources
        for id in (0..self.graph.nodes.len()).rev() {
            if !matches!(self.graph.nodes[id], ProblemNode::Package { .. }) {
                continue;
            }
            let mut groups: HashMap<&str, bool> = HashMap::new();
            let mut excluded = false;
            for (from, to, edge) in &self.graph.edges {
                if *from != id {
                    continue;
                }
                match edge {
                    ProblemEdge::Requires(spec) => {
                        let viable = self.graph.nodes[*to].package().is_some() && !broken.contains(to);
                        *groups.entry(spec.as_str()).or_insert(false) |= viable;
                    }
                    ProblemEdge::Excludes => {
                        let kept = matches!(self.graph.nodes[*to], ProblemNode::Constraint(ConstraintKind::Installed(_)));
                        excluded |= !kept;
                    }
                    ProblemEdge::Conflicts(_) => {}
                }
            }
            if excluded || groups.values().any(|viable| !viable) {
                broken.insert(id);
            }
        }
        broken
    }

    /// Requirements on one name, from different packages, that each force a
    /// different candidate cannot both hold.
    ///
    /// Candidates that fail on their own are left out, their failures are
    /// unrelated.
    fn add_same_name_conflicts(&mut self) {
        let broken = self.broken_packages();
        let mut by_name: BTreeMap<&str, Vec<&Requirement>> = BTreeMap::new();
        for requirement in &self.requirements {
            by_name.entry(requirement.name.as_str()).or_default().push(requirement);
        }

        let mut conflicts = Vec::new();
        for (name, requirements) in by_name {
            for (i, a) in requirements.iter().enumerate() {
                for b in &requirements[i + 1..] {
                    let (&[x], &[y]) = (a.allowed.as_slice(), b.allowed.as_slice()) else {
                        continue;
                    };
                    if a.from == b.from || x == y {
                        continue;
                    }
                    let (Some(&x), Some(&y)) = (self.packages.get(&x), self.packages.get(&y)) else {
                        continue;
                    };
                    if broken.contains(&x) || broken.contains(&y) {
                        continue;
                    }
                    conflicts.push((x.min(y), x.max(y), format!("only one {} can be installed", name)));
                }
            }
        }

        for (from, to, reason) in conflicts {
            self.edge(from, to, ProblemEdge::Conflicts(reason));
        }
    }
}
