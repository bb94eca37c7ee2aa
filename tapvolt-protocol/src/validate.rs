//! Outbound action validation
//!
//! Bounds first, shape second; the desktop enforces the same bounds, so a
//! local rejection saves a round trip.

use crate::messages::{Action, ErrorCode, Step};

/// Maximum number of steps accepted in one action.
pub const MAX_STEPS_PER_ACTION: usize = 50;

/// Maximum characters accepted in one text step.
pub const MAX_TEXT_STEP_CHARS: usize = 1000;

/// Rejection reason for an outbound action.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("Action exceeds the maximum of 50 steps.")]
    TooManySteps,

    #[error("Text step exceeds the maximum of 1000 characters.")]
    TextTooLong,

    #[error("{0}")]
    Invalid(String),
}

impl ActionError {
    /// Error code reported to the caller for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TooManySteps => ErrorCode::MaxStepsExceeded,
            Self::TextTooLong => ErrorCode::MaxTextLengthExceeded,
            Self::Invalid(_) => ErrorCode::ClientError,
        }
    }
}

fn invalid(reason: impl Into<String>) -> ActionError {
    ActionError::Invalid(reason.into())
}

/// Validates an action before dispatch: bounds, then shape.
pub fn validate_action(action: &Action) -> Result<(), ActionError> {
    if action.steps.len() > MAX_STEPS_PER_ACTION {
        return Err(ActionError::TooManySteps);
    }
    for step in &action.steps {
        if let Step::Text { value } = step {
            if value.chars().count() > MAX_TEXT_STEP_CHARS {
                return Err(ActionError::TextTooLong);
            }
        }
    }

    if action.id.trim().is_empty() {
        return Err(invalid("action id is empty"));
    }
    if action.steps.is_empty() {
        return Err(invalid("action has no steps"));
    }
    for (index, step) in action.steps.iter().enumerate() {
        match step {
            Step::Shortcut { keys } => {
                if keys.is_empty() {
                    return Err(invalid(format!("step {index}: shortcut has no keys")));
                }
                if keys.iter().any(|key| key.is_empty()) {
                    return Err(invalid(format!("step {index}: shortcut key is empty")));
                }
            }
            Step::Text { .. } => {}
            Step::Delay { duration } => {
                if !duration.is_finite() || *duration < 0.0 {
                    return Err(invalid(format!(
                        "step {index}: delay must be a non-negative finite duration"
                    )));
                }
            }
            Step::Key { key } => {
                if key.is_empty() {
                    return Err(invalid(format!("step {index}: key name is empty")));
                }
            }
            Step::Command { command } => {
                if command.is_empty() {
                    return Err(invalid(format!("step {index}: command line is empty")));
                }
            }
        }
    }

    Ok(())
}
