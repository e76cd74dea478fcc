//! Declaration registry: everything the plugin offers, collected before
//! the handshake.

use std::fmt;
use std::sync::Arc;

use voltd_wire::{HandlerKind, Manifest, ManifestEntry, BUILTIN_PREFIX, HOOK_PREFIX};

use crate::error::{PluginError, PluginResult};
use crate::gate::Gate;
use crate::handler::Handler;

/// Registration lifecycle. The door swings one way: `seal` moves Open to
/// Closed and nothing moves it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Closed,
}

/// One declared method or hook with its gating predicate.
#[derive(Clone)]
pub struct Declaration {
    pub name: String,
    pub kind: HandlerKind,
    pub description: Option<String>,
    pub gate: Gate,
    pub handler: Arc<dyn Handler>,
}

impl Declaration {
    /// Manifest entry announcing this declaration to the host.
    pub fn manifest_entry(&self) -> ManifestEntry {
        ManifestEntry {
            name: self.name.clone(),
            description: self.description.clone(),
            requires: self.gate.references().into_iter().map(str::to_string).collect(),
        }
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Collects declarations while open, hands out the manifest once sealed.
///
/// Duplicate `(name, kind)` pairs are rejected and the first declaration
/// wins. The same bare name may exist once as a method and once as a hook.
pub struct Registry {
    phase: Phase,
    declarations: Vec<Declaration>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            phase: Phase::Open,
            declarations: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    /// Declare a method invocable by the host.
    pub fn declare_method(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        gate: Gate,
        handler: Arc<dyn Handler>,
    ) -> PluginResult<()> {
        self.declare(HandlerKind::Method, name.into(), description, gate, handler)
    }

    /// Declare a hook the host consults at its own checkpoints.
    pub fn declare_hook(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        gate: Gate,
        handler: Arc<dyn Handler>,
    ) -> PluginResult<()> {
        self.declare(HandlerKind::Hook, name.into(), description, gate, handler)
    }

    fn declare(
        &mut self,
        kind: HandlerKind,
        name: String,
        description: Option<String>,
        gate: Gate,
        handler: Arc<dyn Handler>,
    ) -> PluginResult<()> {
        if self.phase == Phase::Closed {
            return Err(PluginError::RegistrationClosed);
        }
        if name.is_empty() {
            return Err(PluginError::EmptyName);
        }
        for prefix in [BUILTIN_PREFIX, HOOK_PREFIX] {
            if name.starts_with(prefix) {
                return Err(PluginError::ReservedName { name, prefix });
            }
        }
        if self
            .declarations
            .iter()
            .any(|d| d.kind == kind && d.name == name)
        {
            return Err(PluginError::DuplicateName { name, kind });
        }

        tracing::debug!("Declared {kind} '{name}'");
        self.declarations.push(Declaration {
            name,
            kind,
            description,
            gate,
            handler,
        });
        Ok(())
    }

    /// Close registration. Idempotent; there is no way back to Open.
    pub fn seal(&mut self) {
        if self.phase == Phase::Open {
            self.phase = Phase::Closed;
            tracing::debug!("Registry sealed with {} declarations", self.declarations.len());
        }
    }

    /// All declarations in registration order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Manifest announcing every declaration, gated ones included.
    pub fn manifest(&self) -> Manifest {
        let mut manifest = Manifest::default();
        for declaration in &self.declarations {
            let entry = declaration.manifest_entry();
            match declaration.kind {
                HandlerKind::Method => manifest.methods.push(entry),
                HandlerKind::Hook => manifest.hooks.push(entry),
            }
        }
        manifest
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
