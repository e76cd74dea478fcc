//! Capability values the host supplies during the handshake.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single capability value.
///
/// Hosts usually send plain booleans, but enumerated flags (network name,
/// feature tier) arrive as strings or integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl CapabilityValue {
    /// Whether this value counts as enabled when tested as a flag.
    pub fn is_truthy(&self) -> bool {
        match self {
            CapabilityValue::Flag(b) => *b,
            CapabilityValue::Number(n) => *n != 0,
            CapabilityValue::Text(s) => !(s.is_empty() || s == "false" || s == "0"),
        }
    }
}

impl From<bool> for CapabilityValue {
    fn from(b: bool) -> Self {
        CapabilityValue::Flag(b)
    }
}

impl From<i64> for CapabilityValue {
    fn from(n: i64) -> Self {
        CapabilityValue::Number(n)
    }
}

impl From<&str> for CapabilityValue {
    fn from(s: &str) -> Self {
        CapabilityValue::Text(s.to_string())
    }
}

impl From<String> for CapabilityValue {
    fn from(s: String) -> Self {
        CapabilityValue::Text(s)
    }
}

impl std::fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityValue::Flag(b) => write!(f, "{b}"),
            CapabilityValue::Number(n) => write!(f, "{n}"),
            CapabilityValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// The capability set received from the host, immutable after the
/// handshake. Keys are capability names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    entries: BTreeMap<String, CapabilityValue>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used by hosts and tests.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<CapabilityValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<CapabilityValue>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether the named capability is present and truthy. Absent names
    /// are false.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(CapabilityValue::is_truthy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CapabilityValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, CapabilityValue)> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = (String, CapabilityValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
