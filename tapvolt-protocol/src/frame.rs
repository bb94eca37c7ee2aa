//! Inbound frame parsing and outbound serialization
//!
//! The host speaks self-describing JSON text frames with a string `type`
//! field. Inbound parsing is deliberately lenient about envelope placement
//! (ERROR frames carry code/message either in the payload or at the top
//! level) and strict about ACTION_RESULT payloads.

use serde_json::{Map, Value};

use crate::messages::{ClientMessage, ErrorCode, ExecutionResult, ResultStatus};

/// An inbound frame, classified and normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Liveness probe; receipt is the liveness signal.
    Ping,

    /// Authentication accepted.
    AuthSuccess,

    /// Authentication rejected, either explicitly or via an auth-flavored
    /// ERROR frame.
    AuthFailure { message: Option<String> },

    /// Host-side failure mapped through the fixed code table.
    DesktopError { code: ErrorCode, message: String },

    /// Outcome for a previously dispatched action.
    ActionResult(ExecutionResult),
}

/// Failure to understand an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame root is not an object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unrecognized frame type `{0}`")]
    UnknownType(String),

    #[error("malformed {frame} payload: {reason}")]
    BadPayload { frame: &'static str, reason: String },
}

fn bad_payload(frame: &'static str, reason: impl Into<String>) -> FrameError {
    FrameError::BadPayload {
        frame,
        reason: reason.into(),
    }
}

impl ClientMessage {
    /// Serializes to the single-object text frame the host expects.
    pub fn to_frame(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Json)
    }
}

/// Parses one inbound text frame into a classified [`ServerFrame`].
///
/// Anything that is not a JSON object carrying a recognized string `type`
/// is an error; callers report those as `INVALID_SERVER_MESSAGE`.
pub fn parse_server_frame(text: &str) -> Result<ServerFrame, FrameError> {
    let root: Value = serde_json::from_str(text)?;
    let obj = root.as_object().ok_or(FrameError::NotAnObject)?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?;

    match kind {
        "PING" => Ok(ServerFrame::Ping),
        "AUTH_SUCCESS" => Ok(ServerFrame::AuthSuccess),
        "AUTH_FAILURE" => Ok(ServerFrame::AuthFailure {
            message: resolve_message(obj),
        }),
        "ERROR" => Ok(classify_error(obj)),
        "ACTION_RESULT" => parse_action_result(obj).map(ServerFrame::ActionResult),
        other => Err(FrameError::UnknownType(other.to_string())),
    }
}

/// Resolution order for the ERROR code string: `payload.code`, top-level
/// `code`, `payload.message`, top-level `message`, empty. Falling back to a
/// human message is best-effort and may collide with legitimate codes.
fn resolve_error_code(obj: &Map<String, Value>) -> String {
    let payload = obj.get("payload").and_then(Value::as_object);
    payload
        .and_then(|p| p.get("code"))
        .and_then(Value::as_str)
        .or_else(|| obj.get("code").and_then(Value::as_str))
        .or_else(|| payload.and_then(|p| p.get("message")).and_then(Value::as_str))
        .or_else(|| obj.get("message").and_then(Value::as_str))
        .unwrap_or("")
        .to_string()
}

/// Human message carried by a frame, payload first.
fn resolve_message(obj: &Map<String, Value>) -> Option<String> {
    let payload = obj.get("payload").and_then(Value::as_object);
    payload
        .and_then(|p| p.get("message"))
        .and_then(Value::as_str)
        .or_else(|| obj.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

/// The host does not yet guarantee structured codes, so anything that reads
/// like an authorization failure routes to the auth sink.
fn is_auth_flavored(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    lower.contains("auth") || lower.contains("unauthorized") || lower.contains("not authorized")
}

fn classify_error(obj: &Map<String, Value>) -> ServerFrame {
    let raw = resolve_error_code(obj);
    let normalized = raw.trim().to_uppercase();
    let known = ErrorCode::from_desktop_code(&normalized);

    if is_auth_flavored(&raw) {
        let message = match known {
            Some(code) => Some(code.desktop_message().to_string()),
            None if raw.trim().is_empty() => None,
            None => Some(raw),
        };
        return ServerFrame::AuthFailure { message };
    }

    let code = known.unwrap_or(ErrorCode::UnknownServerError);
    ServerFrame::DesktopError {
        message: code.desktop_message().to_string(),
        code,
    }
}

fn parse_action_result(obj: &Map<String, Value>) -> Result<ExecutionResult, FrameError> {
    const FRAME: &str = "ACTION_RESULT";

    let payload = obj
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| bad_payload(FRAME, "missing payload object"))?;

    let id = payload
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_payload(FRAME, "missing string `id`"))?
        .to_string();

    let status = match payload.get("status").and_then(Value::as_str) {
        Some("success") => ResultStatus::Success,
        Some("error") => ResultStatus::Error,
        Some(other) => return Err(bad_payload(FRAME, format!("unknown status `{other}`"))),
        None => return Err(bad_payload(FRAME, "missing string `status`")),
    };

    let execution_time = payload
        .get("executionTime")
        .and_then(Value::as_f64)
        .ok_or_else(|| bad_payload(FRAME, "missing numeric `executionTime`"))?;
    if !execution_time.is_finite() || execution_time < 0.0 {
        return Err(bad_payload(FRAME, "`executionTime` out of range"));
    }

    let error = match payload.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(bad_payload(FRAME, "`error` is not a string")),
    };

    Ok(ExecutionResult {
        id,
        status,
        execution_time,
        error,
    })
}
