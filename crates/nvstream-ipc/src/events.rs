//! Events sent from the engine to the application.

use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::types::{SessionStats, WarningType};

/// Events that the engine can send to the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Session state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<SessionState>,

        /// Current state.
        current: Box<SessionState>,
    },

    /// Updated session statistics.
    Stats(SessionStats),

    /// Non-fatal condition worth surfacing.
    Warning(WarningType),

    /// Error occurred.
    Error {
        /// Whether the error is recoverable.
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// Engine is ready.
    Ready,

    /// Engine has shut down.
    Shutdown,
}
