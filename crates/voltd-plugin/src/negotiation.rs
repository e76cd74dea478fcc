//! Negotiation of declared handlers against the host capability set.
//!
//! Runs once, after the handshake and before any dispatch. Declarations
//! whose gates pass become active registrations; the rest stay visible as
//! disabled so dispatch can answer "disabled" instead of "unknown".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use voltd_wire::{CapabilitySet, HandlerKind, InvokeTarget};

use crate::handler::Handler;
use crate::registry::Registry;

/// A declaration that survived negotiation and may be dispatched.
#[derive(Clone)]
pub struct ActiveRegistration {
    pub name: String,
    pub kind: HandlerKind,
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for ActiveRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveRegistration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// What the dispatcher finds when it resolves a target.
#[derive(Debug)]
pub enum Resolution<'a> {
    Active(&'a ActiveRegistration),
    Disabled,
    Unknown,
}

/// Dispatch-side view of the negotiation result.
///
/// At most one active registration exists per `(name, kind)` pair; the
/// registry already rejected duplicates and negotiation only ever drops
/// entries.
#[derive(Debug, Default)]
pub struct ActiveSet {
    active: HashMap<InvokeTarget, ActiveRegistration>,
    disabled: HashSet<InvokeTarget>,
}

impl ActiveSet {
    /// Resolve a target to its registration, or to why there is none.
    pub fn resolve(&self, target: &InvokeTarget) -> Resolution<'_> {
        if let Some(registration) = self.active.get(target) {
            return Resolution::Active(registration);
        }
        if self.disabled.contains(target) {
            return Resolution::Disabled;
        }
        Resolution::Unknown
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn disabled_count(&self) -> usize {
        self.disabled.len()
    }

    /// Targets that survived negotiation, in no particular order.
    pub fn active_targets(&self) -> impl Iterator<Item = &InvokeTarget> {
        self.active.keys()
    }
}

/// One line of the negotiation report.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub name: String,
    pub kind: HandlerKind,
    pub enabled: bool,
    /// Referenced capability names the host never offered. Non-empty only
    /// for declarations dropped by the fail-closed rule.
    pub missing: Vec<String>,
}

/// Everything negotiation decided, in registration order.
#[derive(Debug, Clone, Default)]
pub struct NegotiationReport {
    pub outcomes: Vec<RegistrationOutcome>,
}

impl NegotiationReport {
    pub fn enabled(&self) -> impl Iterator<Item = &RegistrationOutcome> {
        self.outcomes.iter().filter(|o| o.enabled)
    }

    pub fn disabled(&self) -> impl Iterator<Item = &RegistrationOutcome> {
        self.outcomes.iter().filter(|o| !o.enabled)
    }
}

/// Filter the registry's declarations against `capabilities`.
///
/// Seals the registry first, so registration is closed from the moment
/// negotiation begins. Each declaration's gate is evaluated fail-closed:
/// unresolved capability references disable the declaration outright.
pub fn negotiate(
    registry: &mut Registry,
    capabilities: &CapabilitySet,
) -> (ActiveSet, NegotiationReport) {
    registry.seal();

    let mut set = ActiveSet::default();
    let mut report = NegotiationReport::default();

    for declaration in registry.declarations() {
        let target = InvokeTarget {
            kind: declaration.kind,
            name: declaration.name.clone(),
        };
        let missing = declaration.gate.missing_references(capabilities);
        let enabled = declaration.gate.evaluate(capabilities);

        if enabled {
            tracing::info!("Enabled {} '{}'", declaration.kind, declaration.name);
            set.active.insert(
                target,
                ActiveRegistration {
                    name: declaration.name.clone(),
                    kind: declaration.kind,
                    handler: Arc::clone(&declaration.handler),
                },
            );
        } else if missing.is_empty() {
            tracing::info!(
                "Disabled {} '{}': gate not satisfied",
                declaration.kind,
                declaration.name
            );
            set.disabled.insert(target);
        } else {
            tracing::warn!(
                "Disabled {} '{}': references unknown capabilities {:?}",
                declaration.kind,
                declaration.name,
                missing
            );
            set.disabled.insert(target);
        }

        report.outcomes.push(RegistrationOutcome {
            name: declaration.name.clone(),
            kind: declaration.kind,
            enabled,
            missing,
        });
    }

    tracing::info!(
        "Negotiation complete: {} active, {} disabled",
        set.active_count(),
        set.disabled_count()
    );
    (set, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use crate::handler::from_fn;
    use serde_json::json;

    fn noop() -> Arc<dyn Handler> {
        from_fn(|_ctx, _params| async move { Ok(json!(null)) })
    }

    fn registry_with_gates() -> Registry {
        let mut registry = Registry::new();
        registry
            .declare_method("getinfo", None, Gate::Always, noop())
            .unwrap();
        registry
            .declare_method("devtool", None, Gate::flag("developer"), noop())
            .unwrap();
        registry
            .declare_hook("custommsg", None, Gate::flag("developer"), noop())
            .unwrap();
        registry
            .declare_method("phantom", None, Gate::flag("never_offered"), noop())
            .unwrap();
        registry
    }

    #[test]
    fn test_ungated_declarations_survive_empty_capabilities() {
        let mut registry = registry_with_gates();
        let (set, report) = negotiate(&mut registry, &CapabilitySet::new());

        assert!(matches!(
            set.resolve(&InvokeTarget::method("getinfo")),
            Resolution::Active(_)
        ));
        assert_eq!(set.active_count(), 1);
        assert_eq!(set.disabled_count(), 3);
        assert_eq!(report.enabled().count(), 1);
        assert_eq!(report.disabled().count(), 3);
    }

    #[test]
    fn test_truthy_flag_enables_gated_declarations() {
        let mut registry = registry_with_gates();
        let caps = CapabilitySet::new().with("developer", true);
        let (set, _) = negotiate(&mut registry, &caps);

        assert!(matches!(
            set.resolve(&InvokeTarget::method("devtool")),
            Resolution::Active(_)
        ));
        assert!(matches!(
            set.resolve(&InvokeTarget::hook("custommsg")),
            Resolution::Active(_)
        ));
    }

    #[test]
    fn test_falsy_flag_disables_but_remembers() {
        let mut registry = registry_with_gates();
        let caps = CapabilitySet::new().with("developer", false);
        let (set, report) = negotiate(&mut registry, &caps);

        assert!(matches!(
            set.resolve(&InvokeTarget::hook("custommsg")),
            Resolution::Disabled
        ));
        let outcome = report.disabled().find(|o| o.name == "custommsg").unwrap();
        // The capability was offered, just falsy. Not a missing reference.
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn test_unknown_reference_reports_missing_names() {
        let mut registry = registry_with_gates();
        let (set, report) = negotiate(&mut registry, &CapabilitySet::new().with("developer", true));

        assert!(matches!(
            set.resolve(&InvokeTarget::method("phantom")),
            Resolution::Disabled
        ));
        let outcome = report.outcomes.iter().find(|o| o.name == "phantom").unwrap();
        assert_eq!(outcome.missing, vec!["never_offered"]);
    }

    #[test]
    fn test_undeclared_target_is_unknown() {
        let mut registry = registry_with_gates();
        let (set, _) = negotiate(&mut registry, &CapabilitySet::new());
        assert!(matches!(
            set.resolve(&InvokeTarget::method("no_such_method")),
            Resolution::Unknown
        ));
        // Declared as a hook only, so the method namespace knows nothing.
        assert!(matches!(
            set.resolve(&InvokeTarget::method("custommsg")),
            Resolution::Unknown
        ));
    }

    #[test]
    fn test_negotiation_closes_the_registry() {
        let mut registry = registry_with_gates();
        let _ = negotiate(&mut registry, &CapabilitySet::new());
        assert!(!registry.is_open());
        assert!(registry
            .declare_method("late", None, Gate::Always, noop())
            .is_err());
    }
}
