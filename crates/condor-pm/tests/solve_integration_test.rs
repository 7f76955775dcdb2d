/// Integration tests for solving
///
/// Every scenario runs against both backends so that they stay
/// interchangeable.

use condor_pm::{ActionKind, CondorError, Database, JobAction, Request, Solver, SolverFlags, SolverKind};
use condor_spec::{MatchSpec, PackageInfo, Version};

const BACKENDS: [SolverKind; 2] = [SolverKind::Sat, SolverKind::Lazy];

fn record(name: &str, version: &str, depends: &[&str]) -> PackageInfo {
    PackageInfo::new(name, Version::parse(version).unwrap(), "h0_0")
        .with_depends(depends.iter().copied())
        .with_channel("conda-forge")
        .with_subdir("linux-64")
}

fn install(specs: &[&str]) -> Request {
    Request::parse(specs.iter().map(|s| (JobAction::Install, *s))).unwrap()
}

fn solved_names(kind: SolverKind, db: &mut Database, request: &Request) -> Vec<String> {
    Solver::new(kind)
        .solve(db, request)
        .unwrap()
        .installs()
        .map(|p| p.dist_str())
        .collect()
}

#[test]
fn test_repeated_solves_are_identical() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository(
            "conda-forge",
            vec![
                record("numpy", "1.25.0", &["python >=3.9", "libblas"]),
                record("numpy", "1.26.0", &["python >=3.10", "libblas"]),
                record("python", "3.10.4", &[]),
                record("python", "3.11.0", &[]),
                record("libblas", "3.9.0", &[]),
                record("libblas", "3.9.0", &[]).with_build_number(1),
            ],
            0,
        )
        .unwrap();

        let request = install(&["numpy", "python"]);
        let first = Solver::new(kind).solve(&mut db, &request).unwrap();
        for _ in 0..5 {
            assert_eq!(Solver::new(kind).solve(&mut db, &request).unwrap(), first);
        }
    }
}

#[test]
fn test_higher_priority_repository_wins() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository("low", vec![record("foo", "1.0", &[]).with_channel("low")], 5)
            .unwrap();
        db.add_repository("high", vec![record("foo", "1.0", &[]).with_channel("high")], 10)
            .unwrap();

        let solution = Solver::new(kind).solve(&mut db, &install(&["foo"])).unwrap();
        let chosen: Vec<_> = solution.installs().map(|p| p.channel.clone()).collect();
        assert_eq!(chosen, vec!["high"], "{} backend", kind);
    }
}

#[test]
fn test_strict_priority_hides_newer_versions() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository("low", vec![record("foo", "2.0", &[])], 5).unwrap();
        db.add_repository("high", vec![record("foo", "1.0", &[])], 10).unwrap();

        assert_eq!(solved_names(kind, &mut db, &install(&["foo"])), vec!["foo-1.0-h0_0"]);

        let result = Solver::new(kind).solve(&mut db, &install(&["foo >=2"]));
        assert!(matches!(result, Err(CondorError::Unsolvable(_))), "{} backend", kind);

        let flags = SolverFlags {
            strict_repo_priority: false,
            ..SolverFlags::default()
        };
        let solution = Solver::new(kind).with_flags(flags).solve(&mut db, &install(&["foo >=2"])).unwrap();
        assert_eq!(solution.installs().map(|p| p.dist_str()).collect::<Vec<_>>(), vec!["foo-2.0-h0_0"]);
    }
}

#[test]
fn test_conflicting_requests_explain_themselves() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository("conda-forge", vec![record("pkgA", "1.5", &[])], 0)
            .unwrap();

        let request = install(&["pkgA>=2.0", "pkgA<1.0"]);
        let err = Solver::new(kind).solve(&mut db, &request).unwrap_err();
        let unsolvable = err.as_unsolvable().expect("unsolvable verdict");
        assert!(!unsolvable.has_graph());

        let problems = unsolvable.problems(&db);
        assert!(!problems.is_empty());
        assert!(problems.iter().all(|p| !p.is_empty()));
        assert!(
            problems.iter().any(|p| p.to_lowercase().contains("pkga")),
            "{} backend: {:?}",
            kind,
            problems
        );
        assert!(unsolvable.has_graph());
    }
}

#[test]
fn test_missing_dependency_is_unsolvable() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository("conda-forge", vec![record("app", "1.0", &["libmissing >=1"])], 0)
            .unwrap();

        let err = Solver::new(kind).solve(&mut db, &install(&["app"])).unwrap_err();
        let unsolvable = err.as_unsolvable().unwrap();
        assert_eq!(unsolvable.failing_jobs(), &[0]);

        let explanation = unsolvable.explain_problems(&db, condor_pm::ExplainFormat::Indented);
        assert!(explanation.contains("libmissing"), "{}: {}", kind, explanation);
    }
}

#[test]
fn test_kept_installed_package_blocks_constraint() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository(
            "conda-forge",
            vec![record("a", "1.0", &[]).with_constrains(["c >=2"]), record("c", "1.0", &[])],
            0,
        )
        .unwrap();
        db.set_installed(vec![record("c", "1.0", &[])]).unwrap();

        let solution = Solver::new(kind).solve(&mut db, &install(&["a"])).unwrap();
        let removed: Vec<_> = solution.removals().map(|p| p.dist_str()).collect();
        assert_eq!(removed, vec!["c-1.0-h0_0"], "{} backend", kind);

        let keep = SolverFlags {
            allow_uninstall: false,
            ..SolverFlags::default()
        };
        let err = Solver::new(kind).with_flags(keep).solve(&mut db, &install(&["a"])).unwrap_err();
        let unsolvable = err.as_unsolvable().expect("unsolvable verdict");

        let explanation = unsolvable.explain_problems(&db, condor_pm::ExplainFormat::Indented);
        assert_eq!(
            explanation,
            [
                "install a",
                "  requires a, provided by a 1.0 h0_0",
                "    conflicts with c 1.0 h0_0 (c >=2)",
                "      is already installed",
            ]
            .join("\n"),
            "{} backend",
            kind
        );
        assert!(unsolvable.problems(&db)[0].ends_with("is already installed"));
    }
}

#[test]
fn test_whatprovides_is_idempotent() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository(
            "conda-forge",
            vec![record("foo", "1.0", &[]), record("foo", "2.0", &[]), record("bar", "1.0", &[])],
            0,
        )
        .unwrap();

        let query = MatchSpec::parse("foo >=1").unwrap();
        db.create_whatprovides();
        let once = db.candidate_indices(&query);
        db.create_whatprovides();
        assert_eq!(db.candidate_indices(&query), once);
        assert_eq!(once.len(), 2);
    }
}

#[test]
fn test_untouched_installed_records_are_omitted() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository(
            "conda-forge",
            vec![record("python", "3.11.0", &[]), record("python", "3.12.0", &[]), record("six", "1.16", &["python"])],
            0,
        )
        .unwrap();
        db.set_installed(vec![record("python", "3.11.0", &[])]).unwrap();

        let solution = Solver::new(kind).solve(&mut db, &install(&["six"])).unwrap();
        let omitted: Vec<_> = solution.omitted().map(|p| p.dist_str()).collect();
        let installed: Vec<_> = solution.installs().map(|p| p.dist_str()).collect();

        assert_eq!(omitted, vec!["python-3.11.0-h0_0"], "{} backend", kind);
        assert_eq!(installed, vec!["six-1.16-h0_0"], "{} backend", kind);
        assert!(solution.is_consistent());
    }
}

#[test]
fn test_update_replaces_installed_record() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository(
            "conda-forge",
            vec![record("python", "3.11.0", &[]), record("python", "3.12.0", &[])],
            0,
        )
        .unwrap();
        db.set_installed(vec![record("python", "3.11.0", &[])]).unwrap();

        let request = Request::parse([(JobAction::Update, "python")]).unwrap();
        let solution = Solver::new(kind).solve(&mut db, &request).unwrap();

        let kinds: Vec<_> = solution.iter().map(|a| (a.kind, a.package.dist_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ActionKind::Remove, "python-3.11.0-h0_0".to_string()),
                (ActionKind::Install, "python-3.12.0-h0_0".to_string()),
            ],
            "{} backend",
            kind
        );
    }
}

#[test]
fn test_remove_takes_dependents_along() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository(
            "conda-forge",
            vec![record("python", "3.11.0", &[]), record("six", "1.16", &["python"]), record("zlib", "1.3", &[])],
            0,
        )
        .unwrap();
        db.set_installed(vec![
            record("python", "3.11.0", &[]),
            record("six", "1.16", &["python"]),
            record("zlib", "1.3", &[]),
        ])
        .unwrap();

        let request = Request::parse([(JobAction::Remove, "python")]).unwrap();
        let solution = Solver::new(kind).solve(&mut db, &request).unwrap();

        let mut removed: Vec<_> = solution.removals().map(|p| p.name.clone()).collect();
        removed.sort();
        assert_eq!(removed, vec!["python", "six"], "{} backend", kind);
        assert_eq!(solution.omitted().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["zlib"]);
    }
}

#[test]
fn test_backend_mismatch_is_fatal() {
    let mut db = Database::new(SolverKind::Sat);
    db.add_repository("conda-forge", vec![record("foo", "1.0", &[])], 0).unwrap();

    let err = Solver::new(SolverKind::Lazy).solve(&mut db, &install(&["foo"])).unwrap_err();
    assert!(matches!(
        err,
        CondorError::BackendMismatch {
            expected: SolverKind::Lazy,
            found: SolverKind::Sat
        }
    ));
    assert!(!err.is_retryable());
}

#[test]
fn test_pins_constrain_installed_names() {
    for kind in BACKENDS {
        let mut db = Database::new(kind);
        db.add_repository(
            "conda-forge",
            vec![
                record("python", "3.10.4", &[]),
                record("python", "3.11.0", &[]),
                record("six", "1.16", &["python"]),
            ],
            0,
        )
        .unwrap();

        let request = install(&["six"]).with_pins([MatchSpec::parse("python 3.10.*").unwrap()]);
        let names = solved_names(kind, &mut db, &request);
        assert_eq!(names, vec!["python-3.10.4-h0_0", "six-1.16-h0_0"], "{} backend", kind);
    }
}
