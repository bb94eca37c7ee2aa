//! Shared wire protocol for tapvolt
//!
//! Defines the JSON text frames exchanged with the desktop host and the
//! validation rules applied to outbound actions.

mod frame;
mod messages;
mod validate;

pub use frame::{parse_server_frame, FrameError, ServerFrame};
pub use messages::{
    Action, AuthPayload, ClientMessage, ErrorCode, ErrorNotice, ExecutionResult, ResultStatus,
    Step, PROTOCOL_VERSION,
};
pub use validate::{validate_action, ActionError, MAX_STEPS_PER_ACTION, MAX_TEXT_STEP_CHARS};
