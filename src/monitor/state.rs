//! Monitor state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Monitor`](super::Monitor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// Constructed, `start` not yet called.
    Idle,
    /// Opening (or re-opening) the mailbox connection.
    Connecting,
    /// Running poll cycles.
    Polling,
    /// Stop requested; draining the current item.
    Stopping,
    /// Loop has exited and the source was disconnected.
    Stopped,
}

impl MonitorState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: MonitorState) -> bool {
        use MonitorState::*;

        matches!(
            (self, target),
            // From Idle
            (Idle, Connecting) | (Idle, Stopping) |
            // From Connecting (startup or reconnect)
            (Connecting, Polling) | (Connecting, Stopped) | (Connecting, Stopping) |
            // From Polling
            (Polling, Connecting) | (Polling, Stopping) |
            // From Stopping
            (Stopping, Stopped)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Check if the loop is running (connecting or polling).
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Connecting | Self::Polling)
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Polling => "polling",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}
