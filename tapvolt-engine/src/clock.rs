//! Wall-clock helper
//!
//! Wire timestamps and action ids use wall time; staleness math inside the
//! engine uses the runtime clock instead so it can be paused in tests.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
