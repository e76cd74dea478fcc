//! Error types for plugin registration, negotiation, and dispatch.

use voltd_wire::error::codes;
use voltd_wire::{DispatchErrorKind, ErrorObject, ErrorReply, HandlerKind, RequestId};

/// All errors the plugin framework can produce.
///
/// Only the handshake and transport variants are fatal to the plugin
/// process. Dispatch failures are answered on the wire and the serve loop
/// keeps running.
#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    #[error("Duplicate {kind} registration: '{name}' is already declared")]
    DuplicateName { name: String, kind: HandlerKind },

    #[error("Registration is closed: declarations are only accepted before the handshake")]
    RegistrationClosed,

    #[error("Declaration name must not be empty")]
    EmptyName,

    #[error("Reserved name: '{name}' collides with the '{prefix}' namespace")]
    ReservedName { name: String, prefix: &'static str },

    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown {kind}: '{name}' was never declared")]
    UnknownHandler { name: String, kind: HandlerKind },

    #[error("Disabled {kind}: '{name}' was declared but its gate is not satisfied")]
    HandlerDisabled { name: String, kind: HandlerKind },

    #[error("Execution failed in {kind} '{name}': {cause}")]
    HandlerFailed {
        name: String,
        kind: HandlerKind,
        cause: anyhow::Error,
    },

    #[error("Panic in {kind} '{name}'")]
    HandlerPanicked { name: String, kind: HandlerKind },

    #[error("Deadline exceeded in {kind} '{name}'")]
    HandlerCancelled { name: String, kind: HandlerKind },
}

impl PluginError {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        use codes::*;
        match self {
            PluginError::UnknownHandler { .. } => METHOD_NOT_FOUND,
            PluginError::HandlerDisabled { .. } => HANDLER_DISABLED,
            PluginError::HandlerFailed { .. }
            | PluginError::HandlerPanicked { .. }
            | PluginError::HandlerCancelled { .. } => EXECUTION_FAILED,
            PluginError::Json(_) => PARSE_ERROR,
            PluginError::DuplicateName { .. }
            | PluginError::RegistrationClosed
            | PluginError::EmptyName
            | PluginError::ReservedName { .. } => INVALID_REQUEST,
            _ => INTERNAL_ERROR,
        }
    }

    /// Wire kind tag for dispatch failures, `None` for lifecycle errors.
    pub fn dispatch_kind(&self) -> Option<DispatchErrorKind> {
        match self {
            PluginError::UnknownHandler { .. } => Some(DispatchErrorKind::Unknown),
            PluginError::HandlerDisabled { .. } => Some(DispatchErrorKind::Disabled),
            PluginError::HandlerFailed { .. }
            | PluginError::HandlerPanicked { .. }
            | PluginError::HandlerCancelled { .. } => Some(DispatchErrorKind::ExecutionError),
            _ => None,
        }
    }

    /// Whether this error must tear the plugin down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PluginError::HandshakeTimeout { .. }
                | PluginError::Handshake(_)
                | PluginError::Transport(_)
                | PluginError::Io(_)
        )
    }

    /// Build the wire error object for this error.
    pub fn to_error_object(&self) -> ErrorObject {
        let object = ErrorObject::new(self.code(), self.to_string());
        match (self.dispatch_kind(), self) {
            (Some(kind), PluginError::HandlerFailed { cause, .. }) => {
                object.with_cause(kind, cause.to_string())
            }
            (Some(kind), PluginError::HandlerPanicked { .. }) => {
                object.with_cause(kind, "handler panicked")
            }
            (Some(kind), PluginError::HandlerCancelled { .. }) => {
                object.with_cause(kind, "dispatch deadline exceeded")
            }
            (Some(kind), _) => object.with_kind(kind),
            (None, _) => object,
        }
    }

    /// Build a full error reply addressed to `id`.
    pub fn to_error_reply(&self, id: RequestId) -> ErrorReply {
        self.to_error_object().into_reply(id)
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
