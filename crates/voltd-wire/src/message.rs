//! JSON-RPC 2.0 envelopes and the invocation namespace.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorObject, WireError, WireResult};

/// JSON-RPC protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method-name prefix reserved for hook invocations.
pub const HOOK_PREFIX: &str = "hook/";

/// Method-name prefix reserved for protocol builtins.
pub const BUILTIN_PREFIX: &str = "plugin/";

/// Builtin liveness probe, answered by every plugin without declaration.
pub const PING_METHOD: &str = "plugin/ping";

/// Request identifier: string, number, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Null => write!(f, "null"),
        }
    }
}

/// An inbound or outbound JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Check that the envelope is well-formed before dispatching it.
    pub fn validate(&self) -> WireResult<()> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(WireError::InvalidRequest(format!(
                "expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{}\"",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(WireError::InvalidRequest(
                "method name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A successful reply to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

impl Response {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }
}

/// An error reply to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: ErrorObject,
}

impl ErrorReply {
    pub fn new(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        }
    }
}

/// A notification: no id, no reply expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Any JSON-RPC message either side may produce.
///
/// Untagged: a request has `id` and `method`, a response has `result`, an
/// error reply has `error`, and a notification has `method` only, so serde
/// can discriminate without a tag. Request must be tried before
/// Notification since a notification is a request minus the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Request(Request),
    Response(Response),
    ErrorReply(ErrorReply),
    Notification(Notification),
}

/// Parse one JSON text as an envelope.
pub fn parse_envelope(text: &str) -> WireResult<Envelope> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WireError::Parse("empty message".to_string()));
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// What kind of handler an invocation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Method,
    Hook,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Method => write!(f, "method"),
            HandlerKind::Hook => write!(f, "hook"),
        }
    }
}

/// A parsed invocation target: handler kind plus bare name.
///
/// Hooks travel under the `hook/` prefix so the same name may exist as
/// both a method and a hook without ambiguity on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvokeTarget {
    pub kind: HandlerKind,
    pub name: String,
}

impl InvokeTarget {
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::Method,
            name: name.into(),
        }
    }

    pub fn hook(name: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::Hook,
            name: name.into(),
        }
    }

    /// Parse a wire method string into its target.
    pub fn parse(method: &str) -> Self {
        match method.strip_prefix(HOOK_PREFIX) {
            Some(rest) => Self::hook(rest),
            None => Self::method(method),
        }
    }

    /// The wire method string addressing this target.
    pub fn wire_method(&self) -> String {
        match self.kind {
            HandlerKind::Method => self.name.clone(),
            HandlerKind::Hook => format!("{HOOK_PREFIX}{}", self.name),
        }
    }
}

impl std::fmt::Display for InvokeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}
