//! Handshake payloads: the single exchange that precedes all dispatch.
//!
//! The plugin sends one `plugin/handshake` request announcing its protocol
//! version, identity, and manifest; the host replies with the capability
//! set. Nothing else may cross the wire before this exchange completes.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;

/// Plugin protocol version this crate speaks.
pub const PROTOCOL_VERSION: &str = "1";

/// Wire method name of the handshake request.
pub const HANDSHAKE_METHOD: &str = "plugin/handshake";

/// Identity a plugin announces about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
}

impl PluginInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// One announced declaration inside a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capability names the entry's gate references; empty when the entry
    /// is unconditionally active.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            requires: Vec::new(),
        }
    }
}

/// Everything a plugin offers, announced during the handshake.
///
/// Gated entries are announced too: the host learns what exists and
/// distinguishes "disabled" from "unknown" at dispatch time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub methods: Vec<ManifestEntry>,
    #[serde(default)]
    pub hooks: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.methods.len() + self.hooks.len()
    }
}

/// Params of the `plugin/handshake` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub plugin: PluginInfo,
    pub manifest: Manifest,
}

impl HandshakeRequest {
    pub fn new(plugin: PluginInfo, manifest: Manifest) -> Self {
        Self {
            protocol: PROTOCOL_VERSION.to_string(),
            plugin,
            manifest,
        }
    }
}

/// Result payload of the handshake reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeReply {
    pub protocol: String,
    pub capabilities: CapabilitySet,
}

impl HandshakeReply {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            protocol: PROTOCOL_VERSION.to_string(),
            capabilities,
        }
    }
}
