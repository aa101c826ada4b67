//! Commands sent from the application to the engine.

use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;

/// Commands that the application can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Start a capture session with the given configuration.
    Start { config: SessionConfig },

    /// Stop the current session.
    Stop,

    /// Request current session state.
    GetState,

    /// Shutdown the engine completely.
    Shutdown,
}
