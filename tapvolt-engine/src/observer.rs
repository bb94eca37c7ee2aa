//! Engine observer interface
//!
//! A single observer record owned by the engine task; every engine outcome
//! is delivered through these hooks. The engine never throws across its
//! boundary — failures arrive here as error notices.

use tapvolt_protocol::{ErrorNotice, ExecutionResult};

use crate::state::ConnectionState;

/// Callbacks for engine outcomes. All methods default to no-ops.
pub trait EngineObserver: Send {
    /// An accepted state transition, with the current reconnect attempt.
    fn on_state_change(&mut self, state: ConnectionState, reconnect_attempt: u32) {
        let _ = (state, reconnect_attempt);
    }

    fn on_connected(&mut self) {}

    fn on_disconnected(&mut self) {}

    fn on_auth_success(&mut self) {}

    fn on_auth_failure(&mut self, message: String) {
        let _ = message;
    }

    /// Outcome for a dispatched action; at most once per action id.
    fn on_action_result(&mut self, result: ExecutionResult) {
        let _ = result;
    }

    /// The action's deadline passed with no result.
    fn on_action_timeout(&mut self, id: &str) {
        let _ = id;
    }

    fn on_error(&mut self, notice: ErrorNotice) {
        let _ = notice;
    }

    /// `Some` raises a non-fatal warning; `None` clears it.
    fn on_warning(&mut self, warning: Option<String>) {
        let _ = warning;
    }

    /// Liveness signal observed, epoch milliseconds.
    fn on_heartbeat(&mut self, timestamp: u64) {
        let _ = timestamp;
    }
}

/// Observer that ignores everything; useful for headless dispatch.
#[derive(Debug, Default)]
pub struct NullObserver;

impl EngineObserver for NullObserver {}
