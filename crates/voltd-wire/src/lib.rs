//! Wire vocabulary for the voltd plugin protocol.
//!
//! Both the voltd host and its plugins speak JSON-RPC 2.0 over whatever
//! byte transport the deployment provides. This crate holds the passive
//! message shapes shared by the two sides: envelopes, the handshake
//! payloads, capability values, and the structured dispatch error object.
//! It performs no I/O.

pub mod capability;
pub mod error;
pub mod handshake;
pub mod message;

pub use capability::{CapabilitySet, CapabilityValue};
pub use error::{codes, DispatchErrorKind, ErrorData, ErrorObject, WireError, WireResult};
pub use handshake::{
    HandshakeReply, HandshakeRequest, Manifest, ManifestEntry, PluginInfo, HANDSHAKE_METHOD,
    PROTOCOL_VERSION,
};
pub use message::{
    parse_envelope, Envelope, ErrorReply, HandlerKind, InvokeTarget, Notification, Request,
    RequestId, Response, BUILTIN_PREFIX, HOOK_PREFIX, JSONRPC_VERSION, PING_METHOD,
};
