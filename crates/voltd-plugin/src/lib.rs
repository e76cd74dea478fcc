//! Capability-gated plugin framework for voltd.
//!
//! A plugin declares methods and hooks while its registry is open, performs
//! a single handshake with the host to learn the capability set, negotiates
//! its declarations against that set, and then serves dispatches until the
//! host closes the link. Declarations whose gates cannot be satisfied are
//! disabled rather than forgotten, so the host can tell "disabled" apart
//! from "never existed".

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod handler;
pub mod handshake;
pub mod negotiation;
pub mod plugin;
pub mod registry;
pub mod transport;
pub mod workbench;

pub use config::PluginConfig;
pub use dispatch::Dispatcher;
pub use error::{PluginError, PluginResult};
pub use gate::Gate;
pub use handler::{from_fn, CallContext, Handler};
pub use handshake::HandshakeAdapter;
pub use negotiation::{negotiate, ActiveRegistration, ActiveSet, NegotiationReport, Resolution};
pub use plugin::Plugin;
pub use registry::{Declaration, Phase, Registry};
pub use transport::{pair, HostLink, MemoryLink, StdioLink};
