use std::collections::HashMap;

use super::rule::Rule;

/// Collection of SAT rules with deduplication and sequential ids.
///
/// Learned rules are appended like any other rule so that watches and
/// reasons can refer to them by id.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    rule_hashes: HashMap<u64, Vec<u32>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, returning its id. A duplicate returns the existing id.
    pub fn add(&mut self, mut rule: Rule) -> u32 {
        let hash = rule.literal_hash();
        if let Some(ids) = self.rule_hashes.get(&hash) {
            for &id in ids {
                if self.rules[id as usize].equals_literals(&rule) {
                    return id;
                }
            }
        }

        let id = self.rules.len() as u32;
        rule.set_id(id);
        self.rule_hashes.entry(hash).or_default().push(id);
        self.rules.push(rule);
        id
    }

    pub fn get(&self, id: u32) -> Option<&Rule> {
        self.rules.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    #[cfg(test)]
    pub fn rules_of_type(&self, rule_type: super::rule::RuleType) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.rule_type() == rule_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
