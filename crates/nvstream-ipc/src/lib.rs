//! Typed messages exchanged between an embedding application and the
//! nvstream engine.
//!
//! The engine is driven with [`EngineCommand`]s and reports back with
//! [`EngineEvent`]s over bounded channels. Session settings live in
//! [`SessionConfig`].

mod commands;
mod config;
mod events;
mod state;
mod types;

pub use commands::EngineCommand;
pub use config::{ConfigError, SessionConfig, MAX_FPS};
pub use events::EngineEvent;
pub use state::{SessionState, ShutdownPhase, StartupPhase, StopReason};
pub use types::{CodecFamily, QualityTier, SessionStats, WarningType};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (application → engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (engine → application).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<EngineCommand>, Receiver<EngineCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
