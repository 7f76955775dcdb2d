//! The solver verdict: what happens to each package.

use condor_spec::{PackageInfo, PackageKey};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Remove,
    Omit,
    Reinstall,
    Install,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Install => "install",
            ActionKind::Remove => "remove",
            ActionKind::Reinstall => "reinstall",
            ActionKind::Omit => "omit",
        }
    }
}

/// One package and what the solver decided about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub package: Arc<PackageInfo>,
}

impl Action {
    pub fn new(kind: ActionKind, package: Arc<PackageInfo>) -> Self {
        Self { kind, package }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.package)
    }
}

/// Ordered actions produced by a successful solve.
///
/// Actions are sorted by package name; a name that changes record gets a
/// `Remove` of the old record followed by an `Install` of the new one.
/// Installed records that stay untouched appear as `Omit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    actions: Vec<Action>,
}

impl Solution {
    pub fn new(mut actions: Vec<Action>) -> Self {
        sort_actions(&mut actions);
        Self { actions }
    }

    /// Diff the installed records against the records a solver selected.
    ///
    /// Selected records whose name is in `reinstall` and that are already
    /// installed become `Reinstall` instead of `Omit`.
    pub fn from_selection(
        installed: &[Arc<PackageInfo>],
        selected: &[Arc<PackageInfo>],
        reinstall: &HashSet<String>,
    ) -> Self {
        let installed_by_key: HashMap<PackageKey, &Arc<PackageInfo>> =
            installed.iter().map(|p| (p.key(), p)).collect();
        let selected_keys: HashSet<PackageKey> = selected.iter().map(|p| p.key()).collect();

        let mut actions = Vec::with_capacity(installed.len() + selected.len());

        for package in selected {
            match installed_by_key.get(&package.key()) {
                Some(current) if reinstall.contains(&package.name.to_lowercase()) => {
                    actions.push(Action::new(ActionKind::Reinstall, Arc::clone(current)));
                }
                Some(current) => actions.push(Action::new(ActionKind::Omit, Arc::clone(current))),
                None => actions.push(Action::new(ActionKind::Install, Arc::clone(package))),
            }
        }

        for package in installed {
            if !selected_keys.contains(&package.key()) {
                actions.push(Action::new(ActionKind::Remove, Arc::clone(package)));
            }
        }

        Self::new(actions)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    fn packages_of(&self, kinds: &'static [ActionKind]) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.actions
            .iter()
            .filter(move |a| kinds.contains(&a.kind))
            .map(|a| &a.package)
    }

    /// Records that get linked: installs and reinstalls
    pub fn installs(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.packages_of(&[ActionKind::Install, ActionKind::Reinstall])
    }

    pub fn removals(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.packages_of(&[ActionKind::Remove])
    }

    pub fn reinstalls(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.packages_of(&[ActionKind::Reinstall])
    }

    pub fn omitted(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.packages_of(&[ActionKind::Omit])
    }

    /// Records present once the solution is applied
    pub fn resulting_environment(&self) -> impl Iterator<Item = &Arc<PackageInfo>> {
        self.packages_of(&[ActionKind::Install, ActionKind::Reinstall, ActionKind::Omit])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True when applying the solution would change nothing
    pub fn is_empty(&self) -> bool {
        self.actions.iter().all(|a| a.kind == ActionKind::Omit)
    }

    /// At most one install or reinstall per package name
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        self.installs().all(|p| seen.insert(p.name.to_lowercase()))
    }
}

fn sort_actions(actions: &mut [Action]) {
    actions.sort_by(|a, b| {
        a.package
            .name
            .to_lowercase()
            .cmp(&b.package.name.to_lowercase())
            .then(a.kind.cmp(&b.kind))
    });
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for action in &self.actions {
            writeln!(f, "{}", action)?;
        }
        Ok(())
    }
}
