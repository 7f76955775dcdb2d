use std::fmt;
use std::sync::OnceLock;

use super::SolverFlags;
use crate::database::Database;
use crate::problems::{self, ExplainFormat, ProblemsGraph};
use crate::request::Request;

/// A request with no consistent solution.
///
/// Holds what the backend reported; the problems graph is only built the
/// first time an explanation is asked for, then kept.
pub struct Unsolvable {
    reason: String,
    request: Request,
    failing_jobs: Vec<usize>,
    flags: SolverFlags,
    graph: OnceLock<ProblemsGraph>,
}

impl Unsolvable {
    pub fn new(reason: String, request: Request, failing_jobs: Vec<usize>, flags: SolverFlags) -> Self {
        Self {
            reason,
            request,
            failing_jobs,
            flags,
            graph: OnceLock::new(),
        }
    }

    /// The backend's own description of the failure
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Indices of the jobs at the root of the failure; never empty for a
    /// request with jobs
    pub fn failing_jobs(&self) -> &[usize] {
        &self.failing_jobs
    }

    pub fn has_graph(&self) -> bool {
        self.graph.get().is_some()
    }

    /// The problems graph, built against `db` on first use
    pub fn problems_graph(&self, db: &Database) -> &ProblemsGraph {
        self.graph
            .get_or_init(|| ProblemsGraph::build(db, &self.request, &self.failing_jobs, &self.flags))
    }

    /// One explanation per independent conflicting subset
    pub fn problems(&self, db: &Database) -> Vec<String> {
        let problems = problems::describe_groups(self.problems_graph(db), ExplainFormat::Indented);
        if !problems.is_empty() {
            return problems;
        }
        if self.reason.is_empty() {
            vec!["no solution found for the request".to_string()]
        } else {
            vec![self.reason.clone()]
        }
    }

    /// The whole graph as nested causal chains
    pub fn explain_problems(&self, db: &Database, format: ExplainFormat) -> String {
        let graph = self.problems_graph(db);
        let text = problems::render(&problems::explain_lines(graph, graph.roots()), format);
        if text.is_empty() {
            self.reason.clone()
        } else {
            text
        }
    }
}

impl fmt::Display for Unsolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not solve request: {}", self.reason)
    }
}

impl fmt::Debug for Unsolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsolvable")
            .field("reason", &self.reason)
            .field("failing_jobs", &self.failing_jobs)
            .field("graph_built", &self.has_graph())
            .finish()
    }
}

impl std::error::Error for Unsolvable {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::record;
    use crate::request::JobAction;
    use crate::solver::SolverKind;

    #[test]
    fn test_graph_is_built_lazily() {
        let mut db = Database::new(SolverKind::Sat);
        db.add_repository("c", vec![record("pkgA", "1.5", &[])], 0).unwrap();
        db.create_whatprovides();

        let request = Request::parse([(JobAction::Install, "pkgA>=2.0"), (JobAction::Install, "pkgA<1.0")]).unwrap();
        let unsolvable = Unsolvable::new("conflict".to_string(), request, vec![0, 1], SolverFlags::default());
        assert!(!unsolvable.has_graph());

        let problems = unsolvable.problems(&db);
        assert!(unsolvable.has_graph());
        assert!(!problems.is_empty());
        assert!(problems.iter().all(|p| p.contains("pkga")));
    }

    #[test]
    fn test_falls_back_to_reason() {
        let db = Database::new(SolverKind::Sat);
        let unsolvable = Unsolvable::new("a is already installed".to_string(), Request::new(), vec![], SolverFlags::default());

        assert_eq!(unsolvable.problems(&db), vec!["a is already installed".to_string()]);
        assert_eq!(unsolvable.to_string(), "Could not solve request: a is already installed");
    }
}
