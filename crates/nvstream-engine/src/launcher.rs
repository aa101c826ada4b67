//! Building sessions on behalf of the engine.

use std::sync::Arc;

use tracing::{info, warn};

use nvstream_capture::{CaptureResult, FrameSource};
use nvstream_encoder::EncodeBackend;
use nvstream_gpu::DeviceDriver;
use nvstream_ipc::{SessionConfig, StartupPhase};
use nvstream_mux::{Container, MuxResult};

use crate::{EngineError, EngineResult, Pipeline, SessionBuilder};

/// A started session and the source that feeds it.
pub struct LaunchedPipeline {
    pub source: Box<dyn FrameSource>,
    pub pipeline: Box<dyn Pipeline>,
}

/// Opens a frame source and builds a session for it.
pub trait PipelineLauncher: Send {
    /// Start a session for `config`, reporting each startup phase as it begins.
    fn launch(
        &mut self,
        config: &SessionConfig,
        observer: &mut dyn FnMut(StartupPhase),
    ) -> EngineResult<LaunchedPipeline>;
}

/// Launcher over a driver, an encode backend and factories for the frame
/// source and the output container.
pub struct SessionLauncher<B, S, C> {
    driver: Arc<dyn DeviceDriver>,
    backend: B,
    open_source: S,
    open_container: C,
}

impl<B, S, C> SessionLauncher<B, S, C>
where
    B: EncodeBackend + Send + 'static,
    S: FnMut(&SessionConfig) -> CaptureResult<Box<dyn FrameSource>> + Send,
    C: FnMut(&SessionConfig) -> MuxResult<Box<dyn Container>> + Send,
{
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        backend: B,
        open_source: S,
        open_container: C,
    ) -> Self {
        Self {
            driver,
            backend,
            open_source,
            open_container,
        }
    }
}

impl<B, S, C> PipelineLauncher for SessionLauncher<B, S, C>
where
    B: EncodeBackend + Send + 'static,
    B::Pool: 'static,
    B::Encoder: 'static,
    S: FnMut(&SessionConfig) -> CaptureResult<Box<dyn FrameSource>> + Send,
    C: FnMut(&SessionConfig) -> MuxResult<Box<dyn Container>> + Send,
{
    fn launch(
        &mut self,
        config: &SessionConfig,
        observer: &mut dyn FnMut(StartupPhase),
    ) -> EngineResult<LaunchedPipeline> {
        let mut source = (self.open_source)(config)?;
        let (width, height) = source.dimensions();
        info!(width, height, format = ?source.format(), "Frame source opened");

        let started = (self.open_container)(config)
            .map_err(EngineError::from)
            .and_then(|container| {
                SessionBuilder::new(
                    Arc::clone(&self.driver),
                    &self.backend,
                    container,
                    config.clone(),
                )
                .start_observed(width, height, source.format(), observer)
            });

        match started {
            Ok(session) => Ok(LaunchedPipeline {
                source,
                pipeline: Box::new(session),
            }),
            Err(err) => {
                if let Err(stop_err) = source.stop() {
                    warn!(%stop_err, "Failed to stop frame source");
                }
                Err(err)
            }
        }
    }
}

#[cfg(feature = "nvenc")]
mod nvenc {
    use std::sync::Arc;

    use nvstream_capture::{CaptureResult, FrameSource};
    use nvstream_encoder::FfmpegBackend;
    use nvstream_gpu::CudaDriver;
    use nvstream_ipc::SessionConfig;
    use nvstream_mux::{Container, FfmpegContainer, MuxResult};

    use super::SessionLauncher;
    use crate::{EngineError, EngineResult};

    pub type OpenContainer = fn(&SessionConfig) -> MuxResult<Box<dyn Container>>;

    /// CUDA, NVENC through libavcodec, and libavformat output.
    pub type NvencLauncher<S> = SessionLauncher<FfmpegBackend, S, OpenContainer>;

    fn open_container(config: &SessionConfig) -> MuxResult<Box<dyn Container>> {
        let container =
            FfmpegContainer::create(&config.output_url, config.output_format.as_deref())?;
        Ok(Box::new(container))
    }

    impl<S> NvencLauncher<S>
    where
        S: FnMut(&SessionConfig) -> CaptureResult<Box<dyn FrameSource>> + Send,
    {
        /// Launcher writing to the configured URL, fed by `open_source`.
        pub fn nvenc(open_source: S) -> EngineResult<Self> {
            let backend = FfmpegBackend::new().map_err(EngineError::Backend)?;
            Ok(SessionLauncher::new(
                Arc::new(CudaDriver::new()),
                backend,
                open_source,
                open_container as OpenContainer,
            ))
        }
    }
}

#[cfg(feature = "nvenc")]
pub use nvenc::NvencLauncher;
