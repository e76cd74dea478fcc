//! Gating predicates evaluated against the negotiated capability set.

use std::collections::BTreeSet;

use voltd_wire::{CapabilitySet, CapabilityValue};

/// Predicate deciding whether a declaration becomes active.
///
/// Evaluation is fail-closed: a gate that references any capability name
/// absent from the host's set is false, no matter how the reference is
/// nested. `Not(Flag("x"))` with an unknown `x` does not activate.
#[derive(Debug, Clone)]
pub enum Gate {
    /// Active regardless of capabilities.
    Always,
    /// Active when the named capability is present and truthy.
    Flag(String),
    /// Active when the named capability equals the given value.
    Equals(String, CapabilityValue),
    /// Inverts the inner gate.
    Not(Box<Gate>),
    /// Active when every inner gate is. Empty means active.
    All(Vec<Gate>),
}

impl Gate {
    pub fn flag(name: impl Into<String>) -> Self {
        Gate::Flag(name.into())
    }

    pub fn equals(name: impl Into<String>, value: impl Into<CapabilityValue>) -> Self {
        Gate::Equals(name.into(), value.into())
    }

    pub fn not(inner: Gate) -> Self {
        Gate::Not(Box::new(inner))
    }

    pub fn all(gates: impl IntoIterator<Item = Gate>) -> Self {
        Gate::All(gates.into_iter().collect())
    }

    /// Capability names this gate reads, in sorted order.
    pub fn references(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Gate::Always => {}
            Gate::Flag(name) | Gate::Equals(name, _) => {
                names.insert(name.as_str());
            }
            Gate::Not(inner) => inner.collect_references(names),
            Gate::All(gates) => {
                for gate in gates {
                    gate.collect_references(names);
                }
            }
        }
    }

    /// Capability names this gate references that `capabilities` lacks.
    pub fn missing_references(&self, capabilities: &CapabilitySet) -> Vec<String> {
        self.references()
            .into_iter()
            .filter(|name| !capabilities.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Evaluate against the negotiated capability set.
    ///
    /// Any unresolved reference makes the whole gate false before the
    /// boolean structure is considered.
    pub fn evaluate(&self, capabilities: &CapabilitySet) -> bool {
        if self
            .references()
            .iter()
            .any(|name| !capabilities.contains(name))
        {
            return false;
        }
        self.truth(capabilities)
    }

    fn truth(&self, capabilities: &CapabilitySet) -> bool {
        match self {
            Gate::Always => true,
            Gate::Flag(name) => capabilities.is_enabled(name),
            Gate::Equals(name, want) => capabilities.get(name) == Some(want),
            Gate::Not(inner) => !inner.truth(capabilities),
            Gate::All(gates) => gates.iter().all(|gate| gate.truth(capabilities)),
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Gate::Always
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> CapabilitySet {
        CapabilitySet::new()
            .with("developer", true)
            .with("network", "regtest")
            .with("max_peers", 16i64)
            .with("quiet", false)
    }

    #[test]
    fn test_always_is_active_on_empty_set() {
        assert!(Gate::Always.evaluate(&CapabilitySet::new()));
    }

    #[test]
    fn test_flag_follows_truthiness() {
        assert!(Gate::flag("developer").evaluate(&caps()));
        assert!(!Gate::flag("quiet").evaluate(&caps()));
    }

    #[test]
    fn test_unknown_reference_fails_closed() {
        assert!(!Gate::flag("no_such_cap").evaluate(&caps()));
        // Negation cannot rescue an unresolved reference.
        assert!(!Gate::not(Gate::flag("no_such_cap")).evaluate(&caps()));
        assert!(!Gate::all([Gate::Always, Gate::flag("no_such_cap")]).evaluate(&caps()));
    }

    #[test]
    fn test_equals_compares_values() {
        assert!(Gate::equals("network", "regtest").evaluate(&caps()));
        assert!(!Gate::equals("network", "mainnet").evaluate(&caps()));
        assert!(Gate::equals("max_peers", 16i64).evaluate(&caps()));
    }

    #[test]
    fn test_not_inverts_resolved_gates() {
        assert!(Gate::not(Gate::flag("quiet")).evaluate(&caps()));
        assert!(!Gate::not(Gate::flag("developer")).evaluate(&caps()));
    }

    #[test]
    fn test_all_requires_every_member() {
        let gate = Gate::all([Gate::flag("developer"), Gate::equals("network", "regtest")]);
        assert!(gate.evaluate(&caps()));

        let gate = Gate::all([Gate::flag("developer"), Gate::flag("quiet")]);
        assert!(!gate.evaluate(&caps()));

        assert!(Gate::all([]).evaluate(&CapabilitySet::new()));
    }

    #[test]
    fn test_references_collects_nested_names() {
        let gate = Gate::all([
            Gate::flag("developer"),
            Gate::not(Gate::equals("network", "mainnet")),
        ]);
        let names: Vec<&str> = gate.references().into_iter().collect();
        assert_eq!(names, vec!["developer", "network"]);
    }

    #[test]
    fn test_missing_references_names_the_gaps() {
        let gate = Gate::all([Gate::flag("developer"), Gate::flag("absent")]);
        assert_eq!(gate.missing_references(&caps()), vec!["absent"]);
    }
}
