use super::decisions::Decisions;
use super::rule::{Literal, Rule};
use super::rule_set::RuleSet;

/// Two-watched-literal index used for unit propagation.
///
/// Every rule with two or more literals watches two of them. A rule only
/// needs attention once a watched literal becomes false: either another
/// non-false literal takes over the watch, the rule is already satisfied by
/// the other watch, the other watch is forced true, or the rule is in
/// conflict. Multi-conflict rules watch all their literals since any
/// installed package forces every other one out.
#[derive(Debug, Default)]
pub struct WatchGraph {
    /// Rule ids watching each literal, indexed by `literal_index`
    watches: Vec<Vec<u32>>,
    /// The two literals each rule watches, indexed by rule id
    watched: Vec<Option<[Literal; 2]>>,
}

impl WatchGraph {
    pub fn from_rules(rules: &RuleSet) -> Self {
        let mut graph = Self::default();
        for rule in rules.iter() {
            graph.add_rule(rule);
        }
        graph
    }

    fn literal_index(literal: Literal) -> usize {
        let abs = literal.unsigned_abs() as usize;
        if literal > 0 {
            abs * 2
        } else {
            abs * 2 + 1
        }
    }

    fn watches_mut(&mut self, literal: Literal) -> &mut Vec<u32> {
        let index = Self::literal_index(literal);
        if index >= self.watches.len() {
            self.watches.resize(index + 1, Vec::new());
        }
        &mut self.watches[index]
    }

    fn set_watched(&mut self, rule_id: u32, pair: [Literal; 2]) {
        let index = rule_id as usize;
        if index >= self.watched.len() {
            self.watched.resize(index + 1, None);
        }
        self.watched[index] = Some(pair);
    }

    fn is_watched(&self, rule_id: u32) -> bool {
        self.watched.get(rule_id as usize).is_some_and(Option::is_some)
    }

    /// Watch the first two literals of a rule. Assertions are not watched.
    pub fn add_rule(&mut self, rule: &Rule) {
        let literals = rule.literals();
        if literals.len() < 2 {
            return;
        }

        if rule.is_multi_conflict() {
            for &literal in literals {
                self.watches_mut(literal).push(rule.id());
            }
            return;
        }

        self.watch(rule.id(), literals[0], literals[1]);
    }

    /// Watch two chosen literals of a rule; used for learned rules
    pub fn watch(&mut self, rule_id: u32, first: Literal, second: Literal) {
        if self.is_watched(rule_id) {
            return;
        }
        self.set_watched(rule_id, [first, second]);
        self.watches_mut(first).push(rule_id);
        if second != first {
            self.watches_mut(second).push(rule_id);
        }
    }

    /// Propagate `literal`, which was just decided true.
    ///
    /// Forced literals are decided with the forcing rule as reason and are
    /// left on the decision queue for the caller to propagate in turn.
    /// Returns the id of a rule whose literals are all false.
    pub fn propagate(
        &mut self,
        literal: Literal,
        rules: &RuleSet,
        decisions: &mut Decisions,
    ) -> Result<(), u32> {
        let false_literal = -literal;
        let index = Self::literal_index(false_literal);
        if index >= self.watches.len() {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.watches[index]);
        let mut kept = Vec::with_capacity(pending.len());
        let mut outcome = Ok(());

        let mut iter = pending.into_iter();
        while let Some(rule_id) = iter.next() {
            let Some(rule) = rules.get(rule_id) else {
                continue;
            };

            let result = if rule.is_multi_conflict() {
                kept.push(rule_id);
                Self::propagate_multi_conflict(rule, false_literal, decisions)
            } else {
                match self.propagate_rule(rule, false_literal, decisions) {
                    Watch::Keep(result) => {
                        kept.push(rule_id);
                        result
                    }
                    Watch::Moved => Ok(()),
                }
            };

            if result.is_err() {
                outcome = result;
                kept.extend(iter.by_ref());
                break;
            }
        }

        let slot = &mut self.watches[index];
        kept.append(slot);
        *slot = kept;

        outcome
    }

    fn propagate_multi_conflict(
        rule: &Rule,
        false_literal: Literal,
        decisions: &mut Decisions,
    ) -> Result<(), u32> {
        for &other in rule.literals() {
            if other == false_literal {
                continue;
            }
            if decisions.conflict(other) {
                return Err(rule.id());
            }
            if decisions.undecided(other) {
                decisions.decide(other, Some(rule.id()));
            }
        }
        Ok(())
    }

    fn propagate_rule(&mut self, rule: &Rule, false_literal: Literal, decisions: &mut Decisions) -> Watch {
        let rule_id = rule.id();
        let Some([first, second]) = self.watched.get(rule_id as usize).copied().flatten() else {
            return Watch::Keep(Ok(()));
        };
        let other = if first == false_literal { second } else { first };

        if decisions.satisfied(other) {
            return Watch::Keep(Ok(()));
        }

        let replacement = rule
            .literals()
            .iter()
            .copied()
            .find(|&l| l != first && l != second && !decisions.conflict(l));

        if let Some(replacement) = replacement {
            self.set_watched(rule_id, [other, replacement]);
            self.watches_mut(replacement).push(rule_id);
            return Watch::Moved;
        }

        if decisions.conflict(other) {
            return Watch::Keep(Err(rule_id));
        }

        decisions.decide(other, Some(rule_id));
        Watch::Keep(Ok(()))
    }
}

enum Watch {
    Keep(Result<(), u32>),
    Moved,
}
