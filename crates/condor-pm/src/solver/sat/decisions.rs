use super::pool::PackageId;
use super::rule::Literal;

/// Decisions made during SAT solving.
///
/// `decision_map` is indexed by package id and stores 0 for undecided,
/// `level + 1` for installed and `-(level + 1)` for not installed.
#[derive(Debug)]
pub struct Decisions {
    decision_map: Vec<i32>,
    /// Rule that forced each decision; `None` for branch decisions
    reasons: Vec<Option<u32>>,
    /// Decisions in the order they were made
    queue: Vec<Literal>,
    level: u32,
}

impl Decisions {
    pub fn with_capacity(max_package_id: usize) -> Self {
        Self {
            decision_map: vec![0; max_package_id + 1],
            reasons: vec![None; max_package_id + 1],
            queue: Vec::with_capacity(max_package_id),
            level: 0,
        }
    }

    #[inline]
    fn slot(literal: Literal) -> usize {
        literal.unsigned_abs() as usize
    }

    fn ensure_capacity(&mut self, id: usize) {
        if id >= self.decision_map.len() {
            self.decision_map.resize(id + 1, 0);
            self.reasons.resize(id + 1, None);
        }
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn increment_level(&mut self) {
        self.level += 1;
    }

    /// Record a decision at the current level.
    ///
    /// Returns false if the opposite literal was already decided.
    pub fn decide(&mut self, literal: Literal, rule_id: Option<u32>) -> bool {
        let id = Self::slot(literal);
        self.ensure_capacity(id);

        let existing = self.decision_map[id];
        if existing != 0 {
            return (existing > 0) == (literal > 0);
        }

        let level_value = (self.level + 1) as i32;
        self.decision_map[id] = if literal > 0 { level_value } else { -level_value };
        self.reasons[id] = rule_id;
        self.queue.push(literal);
        true
    }

    #[inline]
    pub fn satisfied(&self, literal: Literal) -> bool {
        match self.decision_map.get(Self::slot(literal)) {
            Some(&d) if d != 0 => (d > 0) == (literal > 0),
            _ => false,
        }
    }

    #[inline]
    pub fn conflict(&self, literal: Literal) -> bool {
        match self.decision_map.get(Self::slot(literal)) {
            Some(&d) if d != 0 => (d > 0) != (literal > 0),
            _ => false,
        }
    }

    #[inline]
    pub fn undecided(&self, literal: Literal) -> bool {
        !matches!(self.decision_map.get(Self::slot(literal)), Some(&d) if d != 0)
    }

    /// Level at which the literal's package was decided
    pub fn decision_level(&self, literal: Literal) -> Option<u32> {
        match self.decision_map.get(Self::slot(literal)) {
            Some(&d) if d != 0 => Some(d.unsigned_abs() - 1),
            _ => None,
        }
    }

    /// Rule that forced the literal's package
    pub fn reason(&self, literal: Literal) -> Option<u32> {
        self.reasons.get(Self::slot(literal)).copied().flatten()
    }

    /// Decided literals, oldest first
    pub fn queue(&self) -> &[Literal] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Undo all decisions made above `level` and return to it
    pub fn revert_to_level(&mut self, level: u32) {
        while let Some(&literal) = self.queue.last() {
            match self.decision_level(literal) {
                Some(l) if l > level => {
                    let id = Self::slot(literal);
                    self.decision_map[id] = 0;
                    self.reasons[id] = None;
                    self.queue.pop();
                }
                _ => break,
            }
        }
        self.level = level;
    }

    /// Package ids decided as installed, in id order
    pub fn installed(&self) -> Vec<PackageId> {
        self.decision_map
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(id, _)| id as PackageId)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_and_query() {
        let mut decisions = Decisions::with_capacity(4);
        decisions.increment_level();

        assert!(decisions.decide(2, None));
        assert!(decisions.decide(-3, Some(7)));

        assert!(decisions.satisfied(2));
        assert!(decisions.conflict(-2));
        assert!(decisions.satisfied(-3));
        assert!(decisions.undecided(1));
        assert_eq!(decisions.decision_level(-2), Some(1));
        assert_eq!(decisions.reason(3), Some(7));
    }

    #[test]
    fn test_opposite_decision_fails() {
        let mut decisions = Decisions::with_capacity(2);
        assert!(decisions.decide(1, None));
        assert!(decisions.decide(1, None));
        assert!(!decisions.decide(-1, None));
    }

    #[test]
    fn test_revert_to_level() {
        let mut decisions = Decisions::with_capacity(4);
        decisions.increment_level();
        decisions.decide(1, None);
        decisions.increment_level();
        decisions.decide(2, None);
        decisions.decide(-3, Some(0));

        decisions.revert_to_level(1);
        assert_eq!(decisions.level(), 1);
        assert_eq!(decisions.queue(), &[1]);
        assert!(decisions.undecided(2));
        assert_eq!(decisions.reason(3), None);
        assert_eq!(decisions.installed(), vec![1]);
    }
}
