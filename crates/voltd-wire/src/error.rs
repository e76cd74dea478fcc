//! Error codes and the structured dispatch error object.

use serde::{Deserialize, Serialize};

use crate::message::{ErrorReply, RequestId};

/// JSON-RPC 2.0 standard codes plus the voltd domain block.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Target is declared but its gate failed negotiation.
    pub const HANDLER_DISABLED: i32 = -32810;
    /// The handler ran and failed, panicked, or hit its deadline.
    pub const EXECUTION_FAILED: i32 = -32811;
    /// The host refused the handshake.
    pub const HANDSHAKE_REJECTED: i32 = -32812;
}

/// Why a dispatch failed, as the host sees it.
///
/// `Unknown` means the plugin never declared the target; `Disabled` means
/// it declared it but negotiation gated it off; `ExecutionError` means the
/// handler itself misbehaved. Hosts rely on the distinction between the
/// first two to tell "no such feature" from "feature not enabled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorKind {
    Unknown,
    Disabled,
    ExecutionError,
}

/// Machine-readable detail attached to a dispatch error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub kind: DispatchErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Error member of an [`ErrorReply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

impl ErrorObject {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_kind(mut self, kind: DispatchErrorKind) -> Self {
        self.data = Some(ErrorData { kind, cause: None });
        self
    }

    pub fn with_cause(mut self, kind: DispatchErrorKind, cause: impl Into<String>) -> Self {
        self.data = Some(ErrorData {
            kind,
            cause: Some(cause.into()),
        });
        self
    }

    /// Wrap this object into a full error reply for the given request.
    pub fn into_reply(self, id: RequestId) -> ErrorReply {
        ErrorReply::new(id, self)
    }
}

/// Failures while reading or shaping wire messages.
#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WireError {
    pub fn code(&self) -> i32 {
        match self {
            WireError::Parse(_) | WireError::Json(_) => codes::PARSE_ERROR,
            WireError::InvalidRequest(_) => codes::INVALID_REQUEST,
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::new(self.code(), self.to_string())
    }
}

pub type WireResult<T> = Result<T, WireError>;
