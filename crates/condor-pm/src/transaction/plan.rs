//! Ordering of link and unlink steps, and file ownership checks.

use condor_spec::PackageInfo;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{CondorError, Result};

/// Sort `packages` so that every package comes after the packages it
/// depends on.
///
/// Only dependencies within `packages` count. Members of a cycle keep
/// their input order after everything that could be ordered.
pub fn dependencies_first(packages: Vec<Arc<PackageInfo>>) -> Vec<Arc<PackageInfo>> {
    if packages.len() < 2 {
        return packages;
    }

    let index_of: HashMap<String, usize> = packages
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.to_lowercase(), i))
        .collect();

    // dependency -> dependents
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); packages.len()];
    let mut in_degree = vec![0usize; packages.len()];

    for (i, package) in packages.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in package.dependencies().unwrap_or_default() {
            let Some(name) = dep.name() else {
                continue;
            };
            if let Some(&j) = index_of.get(name) {
                if j != i && seen.insert(j) {
                    dependents[j].push(i);
                    in_degree[i] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..packages.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(packages.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != packages.len() {
        log::debug!("Dependency cycle among {} packages", packages.len() - order.len());
        let placed: HashSet<usize> = order.iter().copied().collect();
        order.extend((0..packages.len()).filter(|i| !placed.contains(i)));
    }

    order.into_iter().map(|i| Arc::clone(&packages[i])).collect()
}

/// Sort `packages` so that dependents come before their dependencies
pub fn dependents_first(packages: Vec<Arc<PackageInfo>>) -> Vec<Arc<PackageInfo>> {
    let mut order = dependencies_first(packages);
    order.reverse();
    order
}

/// Fail when a path would be written by two packages being linked, or by a
/// package being linked while another record that stays installed owns it
pub fn check_paths(links: &[Arc<PackageInfo>], kept: &[Arc<PackageInfo>]) -> Result<()> {
    let mut owners: HashMap<&str, &PackageInfo> = HashMap::new();

    for package in kept {
        for path in &package.files {
            owners.insert(path.as_str(), package.as_ref());
        }
    }

    for package in links {
        for path in &package.files {
            if let Some(owner) = owners.insert(path.as_str(), package.as_ref()) {
                return Err(CondorError::ConflictingPath {
                    path: path.clone(),
                    first: owner.dist_str(),
                    second: package.dist_str(),
                });
            }
        }
    }

    Ok(())
}
