//! Capture session orchestration for nvstream.
//!
//! This crate runs the startup phases of a capture session (GPU context,
//! encoder configuration, frame pool, output stream, container header), feeds
//! captured frames through the encoder into the container, and tears
//! everything down in reverse order when the session stops.

mod error;
mod launcher;
mod metrics;
mod orchestrator;
mod session;

#[cfg(test)]
mod testing;

pub use error::{EngineError, StageError};
#[cfg(feature = "nvenc")]
pub use launcher::NvencLauncher;
pub use launcher::{LaunchedPipeline, PipelineLauncher, SessionLauncher};
pub use metrics::MetricsCollector;
pub use orchestrator::Engine;
pub use session::{
    native_format, Pipeline, PipelineSession, SessionBuilder, SessionSummary,
};

use crossbeam_channel::{Receiver, Sender};
use nvstream_ipc::{EngineCommand, EngineEvent};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Create an engine instance with IPC channels.
pub fn create_engine(
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    launcher: Box<dyn PipelineLauncher>,
) -> Engine {
    Engine::new(command_rx, event_tx, launcher)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "nvstream_engine=debug,nvstream_gpu=debug,nvstream_encoder=debug,nvstream_mux=debug,nvstream_capture=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
