//! Host process lifecycle signal

/// Two-state process signal consumed from the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Process returned to the foreground; resume the session if a target
    /// endpoint is remembered.
    Foregrounded,

    /// Process left the foreground; drop the session but keep the target so
    /// foregrounding can resume it.
    Backgrounded,
}
