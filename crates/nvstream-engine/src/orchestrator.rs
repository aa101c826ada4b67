//! Main engine orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use nvstream_capture::{CaptureError, FrameSource};
use nvstream_ipc::{
    EngineCommand, EngineEvent, SessionConfig, SessionState, SessionStats, ShutdownPhase,
    StartupPhase, StopReason,
};
use nvstream_mux::DrainOutcome;

use crate::launcher::{LaunchedPipeline, PipelineLauncher};
use crate::metrics::MetricsCollector;
use crate::{EngineError, Pipeline};

/// How often live statistics are published.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// How often the capture loop logs its counters.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What the capture loop hands back when it ends.
struct LoopExit {
    reason: StopReason,
    source: Box<dyn FrameSource>,
    pipeline: Box<dyn Pipeline>,
}

/// The capture engine.
pub struct Engine {
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    launcher: Box<dyn PipelineLauncher>,
    state: Arc<RwLock<SessionState>>,
    metrics: Arc<MetricsCollector>,
    capture_thread: Option<JoinHandle<LoopExit>>,
    should_stop: Arc<AtomicBool>,
    last_stats: Instant,
}

impl Engine {
    /// Create a new engine.
    pub fn new(
        command_rx: Receiver<EngineCommand>,
        event_tx: Sender<EngineEvent>,
        launcher: Box<dyn PipelineLauncher>,
    ) -> Self {
        Self {
            command_rx,
            event_tx,
            launcher,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            metrics: Arc::new(MetricsCollector::default()),
            capture_thread: None,
            should_stop: Arc::new(AtomicBool::new(false)),
            last_stats: Instant::now(),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Run the engine (blocking).
    #[instrument(name = "engine_run", skip(self))]
    pub fn run(&mut self) {
        info!("Engine starting");
        self.send_event(EngineEvent::Ready);

        loop {
            match self.command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    self.poll_capture_loop();
                    if self.state.read().is_live() && self.last_stats.elapsed() >= STATS_INTERVAL
                    {
                        self.emit_stats();
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    self.stop_session(StopReason::UserRequested);
                    break;
                }
            }
        }

        info!("Engine stopped");
    }

    /// Handle a command. Returns false if engine should stop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            EngineCommand::Start { config } => self.start_session(config),
            EngineCommand::Stop => self.stop_session(StopReason::UserRequested),
            EngineCommand::GetState => self.send_state(),
            EngineCommand::Shutdown => {
                self.stop_session(StopReason::UserRequested);
                self.send_event(EngineEvent::Shutdown);
                return false;
            }
        }

        true
    }

    /// Start a session.
    #[instrument(name = "start_session", skip_all)]
    fn start_session(&mut self, config: SessionConfig) {
        // Idempotent: ignore if a session is already running
        {
            let state = self.state.read();
            if state.is_starting() || state.is_live() || state.is_stopping() {
                debug!("Session already running, ignoring start command");
                return;
            }
        }

        if let Err(err) = config.validate() {
            warn!(%err, "Rejected session configuration");
            self.send_event(EngineEvent::Error {
                recoverable: true,
                message: err.to_string(),
            });
            return;
        }

        info!(
            url = %config.output_url,
            codec = config.codec.name(),
            tier = config.quality.name(),
            fps = config.fps,
            "Starting session"
        );
        self.transition_to(SessionState::Starting {
            phase: StartupPhase::AcquireDevice,
        });

        let state = &self.state;
        let event_tx = &self.event_tx;
        let result = self.launcher.launch(&config, &mut |phase| {
            if phase != StartupPhase::AcquireDevice {
                publish_transition(state, event_tx, SessionState::Starting { phase });
            }
        });

        match result {
            Ok(launched) => {
                self.metrics = Arc::new(MetricsCollector::new(config.fps as f32));
                self.metrics.start();
                self.last_stats = Instant::now();

                let frame_interval = Duration::from_nanos(1_000_000_000 / u64::from(config.fps));
                self.transition_to(SessionState::Live {
                    config,
                    stats: SessionStats::default(),
                });
                self.start_capture_loop(launched, frame_interval);

                info!("Session started successfully");
            }
            Err(err) => {
                error!(%err, "Session start failed");
                let recoverable = matches!(err, EngineError::Config(_));
                self.fail(err.to_string(), recoverable);
            }
        }
    }

    /// Start the capture loop in a separate thread.
    fn start_capture_loop(&mut self, launched: LaunchedPipeline, frame_interval: Duration) {
        let metrics = Arc::clone(&self.metrics);
        let should_stop = Arc::clone(&self.should_stop);

        should_stop.store(false, Ordering::SeqCst);

        let handle = thread::spawn(move || {
            capture_loop(launched, metrics, should_stop, frame_interval)
        });

        self.capture_thread = Some(handle);
    }

    /// Stop the running session.
    #[instrument(name = "stop_session", skip(self))]
    fn stop_session(&mut self, reason: StopReason) {
        {
            let state = self.state.read();
            if state.is_error() {
                drop(state);
                self.transition_to(SessionState::Idle);
                return;
            }
            if !state.is_live() {
                debug!("No live session, ignoring stop command");
                return;
            }
        }

        info!(?reason, "Stopping session");
        self.end_session();
    }

    /// Tear the session down once the capture loop has ended on its own.
    fn poll_capture_loop(&mut self) {
        let finished = self
            .capture_thread
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        if finished {
            self.end_session();
        }
    }

    /// Stop the capture loop and release the session, phase by phase.
    fn end_session(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);

        let Some(handle) = self.capture_thread.take() else {
            return;
        };
        let LoopExit {
            reason,
            mut source,
            pipeline,
        } = match handle.join() {
            Ok(exit) => exit,
            Err(_) => {
                error!("Capture loop panicked");
                self.metrics.stop();
                self.fail("Capture loop panicked".to_string(), false);
                return;
            }
        };

        self.transition_to(SessionState::Stopping {
            reason: reason.clone(),
            phase: ShutdownPhase::StopCapture,
        });
        if let Err(err) = source.stop() {
            warn!(%err, "Failed to stop frame source");
        }
        drop(source);

        let state = &self.state;
        let event_tx = &self.event_tx;
        let result = pipeline.finish(&mut |phase| {
            publish_transition(
                state,
                event_tx,
                SessionState::Stopping {
                    reason: reason.clone(),
                    phase,
                },
            );
        });

        let mut stats = self.metrics.snapshot();
        if let Ok(summary) = &result {
            stats.packets_written = summary.packets_written;
            stats.write_failures = summary.write_failures;
        }
        self.send_event(EngineEvent::Stats(stats));
        self.metrics.stop();

        match result {
            Ok(summary) if !reason.is_failure() => {
                info!(
                    frames = summary.frames_submitted,
                    packets = summary.packets_written,
                    "Session stopped"
                );
                self.transition_to(SessionState::Idle);
            }
            Ok(_) => {
                let message = reason.message();
                error!(%message, "Session ended");
                self.fail(message, false);
            }
            Err(err) => {
                error!(%err, "Session teardown failed");
                self.fail(err.to_string(), false);
            }
        }
    }

    fn send_state(&self) {
        let state = self.state.read().clone();
        self.send_event(EngineEvent::StateChanged {
            previous: Box::new(state.clone()),
            current: Box::new(state),
        });
    }

    fn emit_stats(&mut self) {
        let stats = self.metrics.snapshot();

        for warning in self.metrics.check_warnings(&stats) {
            self.send_event(EngineEvent::Warning(warning));
        }
        self.send_event(EngineEvent::Stats(stats));

        self.metrics.mark_reported();
        self.last_stats = Instant::now();
    }

    fn fail(&self, message: String, recoverable: bool) {
        self.transition_to(SessionState::Error {
            message: message.clone(),
            recoverable,
        });
        self.send_event(EngineEvent::Error {
            recoverable,
            message,
        });
    }

    fn transition_to(&self, new_state: SessionState) {
        publish_transition(&self.state, &self.event_tx, new_state);
    }

    fn send_event(&self, event: EngineEvent) {
        send_event(&self.event_tx, event);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            if let Ok(mut exit) = handle.join() {
                if let Err(err) = exit.source.stop() {
                    warn!(%err, "Failed to stop frame source");
                }
                if let Err(err) = exit.pipeline.finish(&mut |_| {}) {
                    warn!(%err, "Failed to finish session on drop");
                }
            }
        }
    }
}

fn publish_transition(
    state: &RwLock<SessionState>,
    event_tx: &Sender<EngineEvent>,
    new_state: SessionState,
) {
    let previous = std::mem::replace(&mut *state.write(), new_state.clone());

    debug!(
        previous = %previous.name(),
        current = %new_state.name(),
        "State transition"
    );

    send_event(
        event_tx,
        EngineEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        },
    );
}

fn send_event(event_tx: &Sender<EngineEvent>, event: EngineEvent) {
    if let Err(e) = event_tx.try_send(event) {
        warn!("Failed to send event: {}", e);
    }
}

/// Pull frames from the source and submit them until told to stop or the
/// session fails.
fn capture_loop(
    launched: LaunchedPipeline,
    metrics: Arc<MetricsCollector>,
    should_stop: Arc<AtomicBool>,
    frame_interval: Duration,
) -> LoopExit {
    debug!("Capture loop starting");

    let LaunchedPipeline {
        mut source,
        pipeline,
    } = launched;
    let start_time = Instant::now();
    let mut frames_received: u64 = 0;
    let mut frames_dropped: u64 = 0;
    let mut last_log_time = Instant::now();

    let reason = loop {
        if should_stop.load(Ordering::SeqCst) {
            break StopReason::UserRequested;
        }

        // Periodic status logging every 5 seconds
        if last_log_time.elapsed() >= STATUS_LOG_INTERVAL {
            let stats = metrics.snapshot();
            info!(
                "Session stats: received={}, submitted={}, repeated={}, packets={}, write_failures={}, uptime={:.1}s",
                frames_received,
                stats.frames_submitted,
                stats.repeated_frames,
                stats.packets_written,
                stats.write_failures,
                start_time.elapsed().as_secs_f32()
            );
            last_log_time = Instant::now();
        }

        let frame = match source.next_frame(frame_interval) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(CaptureError::Stopped) => break StopReason::UserRequested,
            Err(err) => {
                warn!(%err, "Frame source lost");
                break StopReason::CaptureLost {
                    message: err.to_string(),
                };
            }
        };

        frames_received += 1;
        if frames_received <= 5 || frames_received % 100 == 0 {
            debug!(
                "Frame received: #{}, size={}x{}",
                frames_received, frame.width, frame.height
            );
        }
        if !frame.is_new {
            metrics.record_repeated();
        }

        match pipeline.submit(&frame) {
            Ok(report) => {
                metrics.record_drain(&report);
                if report.outcome == DrainOutcome::EndOfStream {
                    break StopReason::EndOfStream;
                }
            }
            Err(err) if err.is_recoverable() => {
                frames_dropped += 1;
                warn!(%err, sequence = frame.sequence, "Frame dropped");
            }
            Err(err) if err.is_end_of_stream() => break StopReason::EndOfStream,
            Err(err) => {
                error!(%err, "Encoding failed");
                break StopReason::EncoderError {
                    message: err.to_string(),
                };
            }
        }
    };

    info!(
        "Capture loop stopped: received={}, dropped={}, reason={}",
        frames_received,
        frames_dropped,
        reason.message()
    );

    LoopExit {
        reason,
        source,
        pipeline,
    }
}
