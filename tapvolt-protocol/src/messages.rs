//! Client-host message types
//!
//! Everything here serializes to the exact JSON shapes the desktop host
//! speaks; field order and casing are part of the contract.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol version advertised in every AUTH payload, sent verbatim.
pub const PROTOCOL_VERSION: &str = "1.0";

/// One atomic desktop operation within an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    /// Keyboard shortcut, e.g. `["control", "s"]`
    Shortcut { keys: Vec<String> },

    /// Text injection
    Text { value: String },

    /// Timed pause, in milliseconds
    Delay { duration: f64 },

    /// Single key press
    Key { key: String },

    /// Shell command line
    Command { command: String },
}

/// A client-originated request to run a bounded step sequence on the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub id: String,
    pub steps: Vec<Step>,
}

/// Identity presented to the host during authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub client_id: String,
    pub device_id: String,
    pub protocol_version: String,
}

/// Messages sent from client to host.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Authentication handshake
    #[serde(rename = "AUTH")]
    Auth { payload: AuthPayload },

    /// Run an action on the desktop
    #[serde(rename = "EXECUTE_ACTION")]
    ExecuteAction { timestamp: u64, payload: Action },

    /// Liveness reply to a host PING
    #[serde(rename = "PONG")]
    Pong { timestamp: u64 },
}

/// Outcome reported by the host for one action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Normalized ACTION_RESULT payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub id: String,
    pub status: ResultStatus,
    /// Host-side execution time in milliseconds
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error codes surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ClientError,
    SocketError,
    InvalidServerMessage,
    MaxStepsExceeded,
    MaxTextLengthExceeded,
    CommandExecutionDisabled,
    DeviceNotAuthorized,
    UnknownServerError,
}

impl ErrorCode {
    /// Canonical SCREAMING_SNAKE form used on the wire and in notices.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "CLIENT_ERROR",
            Self::SocketError => "SOCKET_ERROR",
            Self::InvalidServerMessage => "INVALID_SERVER_MESSAGE",
            Self::MaxStepsExceeded => "MAX_STEPS_EXCEEDED",
            Self::MaxTextLengthExceeded => "MAX_TEXT_LENGTH_EXCEEDED",
            Self::CommandExecutionDisabled => "COMMAND_EXECUTION_DISABLED",
            Self::DeviceNotAuthorized => "DEVICE_NOT_AUTHORIZED",
            Self::UnknownServerError => "UNKNOWN_SERVER_ERROR",
        }
    }

    /// Maps a normalized (trimmed, uppercased) desktop error code onto the
    /// known set. Unknown codes fall through to `UnknownServerError` at the
    /// call site.
    pub fn from_desktop_code(normalized: &str) -> Option<Self> {
        match normalized {
            "MAX_STEPS_EXCEEDED" => Some(Self::MaxStepsExceeded),
            "MAX_TEXT_LENGTH_EXCEEDED" => Some(Self::MaxTextLengthExceeded),
            "COMMAND_EXECUTION_DISABLED" => Some(Self::CommandExecutionDisabled),
            "DEVICE_NOT_AUTHORIZED" => Some(Self::DeviceNotAuthorized),
            _ => None,
        }
    }

    /// Caller-facing message for desktop-originated codes.
    pub fn desktop_message(&self) -> &'static str {
        match self {
            Self::MaxStepsExceeded => "Action exceeds the maximum of 50 steps.",
            Self::MaxTextLengthExceeded => "Text step exceeds the maximum of 1000 characters.",
            Self::CommandExecutionDisabled => "Terminal commands are disabled on the desktop.",
            Self::DeviceNotAuthorized => "This device is not authorized on the desktop.",
            _ => "Unexpected desktop error.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload delivered to the caller-facing error sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorNotice {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
