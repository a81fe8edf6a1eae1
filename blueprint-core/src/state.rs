//! Load state of a payload record.

use std::fmt;

/// Where a [`PayloadRecord`](crate::PayloadRecord) is in its load.
///
/// States only move forward:
///
/// ```text
/// Pending ──► Ready
///    │  └───► Error
///    └──► Waiting ──► Ready
///            └──────► Error
/// ```
///
/// `Ready` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// Just created, outcome unknown.
    #[default]
    Pending,
    /// Payload loaded and readable.
    Ready,
    /// Load in progress; not a failure, the payload is not readable yet.
    Waiting,
    /// Load attempted and failed.
    Error,
}

impl LoadState {
    /// Returns `true` for states in which the source counts as present.
    ///
    /// ```
    /// use blueprint_core::LoadState;
    ///
    /// assert!(LoadState::Ready.is_usable());
    /// assert!(LoadState::Waiting.is_usable());
    /// assert!(!LoadState::Pending.is_usable());
    /// assert!(!LoadState::Error.is_usable());
    /// ```
    #[inline]
    pub fn is_usable(self) -> bool {
        matches!(self, LoadState::Ready | LoadState::Waiting)
    }

    /// Returns `true` once no further transition can happen.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadState::Ready | LoadState::Error)
    }

    /// Returns `true` if `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: LoadState) -> bool {
        matches!(
            (self, next),
            (
                LoadState::Pending,
                LoadState::Ready | LoadState::Waiting | LoadState::Error
            ) | (LoadState::Waiting, LoadState::Ready | LoadState::Error)
        )
    }

    /// Returns a static string label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Pending => "pending",
            LoadState::Ready => "ready",
            LoadState::Waiting => "waiting",
            LoadState::Error => "error",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LoadState; 4] = [
        LoadState::Pending,
        LoadState::Ready,
        LoadState::Waiting,
        LoadState::Error,
    ];

    #[test]
    fn test_terminal_states_never_advance() {
        for next in ALL {
            assert!(!LoadState::Ready.can_advance_to(next));
            assert!(!LoadState::Error.can_advance_to(next));
        }
    }

    #[test]
    fn test_pending_advances_everywhere_but_itself() {
        assert!(!LoadState::Pending.can_advance_to(LoadState::Pending));
        assert!(LoadState::Pending.can_advance_to(LoadState::Ready));
        assert!(LoadState::Pending.can_advance_to(LoadState::Waiting));
        assert!(LoadState::Pending.can_advance_to(LoadState::Error));
    }

    #[test]
    fn test_waiting_never_goes_back() {
        assert!(!LoadState::Waiting.can_advance_to(LoadState::Pending));
        assert!(!LoadState::Waiting.can_advance_to(LoadState::Waiting));
        assert!(LoadState::Waiting.can_advance_to(LoadState::Ready));
        assert!(LoadState::Waiting.can_advance_to(LoadState::Error));
    }

    #[test]
    fn test_display() {
        assert_eq!(LoadState::Waiting.to_string(), "waiting");
        assert_eq!(LoadState::default(), LoadState::Pending);
    }
}
