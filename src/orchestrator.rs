//! Application lifecycle: Stopped -> Authenticating -> Running -> Stopping -> Stopped
//!
//! The orchestrator owns every worker. While running it drives three loops
//! (gesture, voice, heartbeat) next to the event bus consumer and the metrics
//! writer. Every command from any source goes through the same
//! guard-then-execute path in [`CommandPipeline`].

use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::actuation::{FixedScreen, MouseKeyboard, RecordingActuator, ScreenSize};
use crate::auth::{FaceAuthenticator, UnconfiguredAuthenticator};
use crate::camera::{FrameSource, LatestFrameSlot, SlotFrameSource};
use crate::command::{Command, CommandKind, CommandSource};
use crate::config::{Config, GestureConfig};
use crate::error::{ControlError, Result};
use crate::event_bus::EventBus;
use crate::events::{DomainEvent, EventType};
use crate::executor::CommandExecutor;
use crate::gesture::{GestureFrame, GestureInterpreter, HandAdapterFactory, HandLandmarkAdapter, NoHands};
use crate::guard::CommandGuard;
use crate::metrics::{self, MetricField, MetricsSnapshot, MetricsWriter, SharedMetrics};
use crate::state::{AppPhase, RuntimeSnapshot, RuntimeState, SharedState};
use crate::voice::{ChannelVoiceListener, VoiceCommandMapper, VoiceListener, VoicePhrase};
use crate::worker::{StopSignal, join_with_timeout, spawn_named};

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(10);
const VOICE_POLL_TIMEOUT: Duration = Duration::from_millis(200);

// ============================================================================
// Command handling
// ============================================================================

/// Guard, executor and the bookkeeping around them, shared by every loop
struct CommandPipeline {
    guard: CommandGuard,
    executor: CommandExecutor,
    metrics: SharedMetrics,
    events: Arc<EventBus>,
    state: SharedState,
}

impl CommandPipeline {
    /// Validate then execute. Failures are recorded, never propagated.
    fn handle(&self, command: &Command) {
        let verdict = self.guard.validate(command);
        if !verdict.accepted {
            self.metrics.incr(MetricField::BlockedCommandCount, 1);
            self.events.publish(
                DomainEvent::new(EventType::CommandBlocked, "Command blocked by security policy.")
                    .with("command", command.name.as_str())
                    .with("reason", verdict.reason),
            );
            return;
        }

        match self.executor.execute(command) {
            Ok(()) => {
                self.metrics.incr(MetricField::CommandCount, 1);
                self.events.publish(
                    DomainEvent::new(EventType::CommandExecuted, "Command executed.")
                        .with("command", command.name.as_str())
                        .with("source", command.source.to_string()),
                );
            }
            Err(e) => {
                if matches!(e, ControlError::UnsupportedCommand(_)) {
                    tracing::error!(command = %command.name, "allow-list names a command the executor cannot dispatch");
                }
                self.metrics.incr(MetricField::Errors, 1);
                self.state.mark_error(e.to_string());
                self.events.publish(
                    DomainEvent::new(EventType::Error, "Command execution failed.")
                        .with("command", command.name.as_str())
                        .with("error", e.to_string()),
                );
            }
        }
    }
}

/// Commands for one interpreted frame: pointer move, then click or double
/// click, then right click, then scroll
pub fn commands_from_gesture(gesture: &GestureFrame) -> Vec<Command> {
    let mut commands = Vec::new();
    let cmd = |kind| Command::of(kind, CommandSource::Gesture);

    if let Some(pointer) = gesture.pointer {
        commands.push(cmd(CommandKind::MouseMove).with_payload([
            ("screen_x", json!(pointer.x)),
            ("screen_y", json!(pointer.y)),
        ]));
    }
    if gesture.click {
        if gesture.double_click {
            commands.push(cmd(CommandKind::DoubleClick));
        } else {
            commands.push(cmd(CommandKind::ClickLeft));
        }
    }
    if gesture.right_click {
        commands.push(cmd(CommandKind::ClickRight));
    }
    if gesture.scroll_delta > 0 {
        commands.push(cmd(CommandKind::ScrollUp).with_payload([("scroll_delta", json!(gesture.scroll_delta))]));
    } else if gesture.scroll_delta < 0 {
        commands.push(cmd(CommandKind::ScrollDown).with_payload([("scroll_delta", json!(gesture.scroll_delta))]));
    }
    commands
}

// ============================================================================
// Orchestrator
// ============================================================================

struct RunCycle {
    stop: StopSignal,
    workers: Vec<JoinHandle<()>>,
    started_at: Instant,
}

pub struct AppOrchestrator {
    config: Config,
    state: SharedState,
    events: Arc<EventBus>,
    metrics: SharedMetrics,
    metrics_writer: MetricsWriter,
    pipeline: Arc<CommandPipeline>,
    screen: Arc<dyn ScreenSize>,
    authenticator: Arc<dyn FaceAuthenticator>,
    camera: Arc<dyn FrameSource>,
    hand_adapters: HandAdapterFactory,
    voice: Arc<dyn VoiceListener>,
    mapper: Arc<VoiceCommandMapper>,
    cycle: Mutex<Option<RunCycle>>,
}

impl AppOrchestrator {
    /// Default collaborators. `dry_run` records actuation instead of performing it.
    pub fn new(config: Config, dry_run: bool) -> Result<Self> {
        Self::builder(config).dry_run(dry_run).build()
    }

    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> RuntimeSnapshot {
        self.state.snapshot()
    }

    pub fn phase(&self) -> AppPhase {
        self.state.phase()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn voice_mapper(&self) -> &VoiceCommandMapper {
        &self.mapper
    }

    pub fn voice_availability(&self) -> (bool, String) {
        self.voice.availability()
    }

    /// Run one command through the guard and executor
    pub fn handle_command(&self, command: &Command) {
        self.pipeline.handle(command);
    }

    /// Handle every command derived from an interpreted frame
    pub fn dispatch_gesture(&self, gesture: &GestureFrame) -> usize {
        let commands = commands_from_gesture(gesture);
        for command in &commands {
            self.pipeline.handle(command);
        }
        commands.len()
    }

    /// Authenticate and start the workers. A no-op unless stopped.
    ///
    /// Authentication failure leaves the orchestrator stopped and returns the
    /// reason. The lifecycle lock is held for the whole call, including the
    /// blocking `authenticate()`; a concurrent `stop()` waits for the
    /// authenticator to return and then shuts the fresh run down.
    pub fn start(&self) -> Result<()> {
        let mut cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        if cycle.is_some() || self.state.phase() != AppPhase::Stopped {
            return Ok(());
        }

        if self.config.metrics.reset_on_start {
            self.metrics.reset();
        }
        self.state.set_authenticated(false);
        self.state.set_uptime(0.0);
        self.state.set_profile(&self.config.environment);
        self.state.set_phase(AppPhase::Authenticating);
        *cycle = Some(RunCycle {
            stop: StopSignal::new(),
            workers: Vec::new(),
            started_at: Instant::now(),
        });

        self.events.start();
        if self.config.metrics.enabled {
            self.metrics_writer.start();
        }
        self.events
            .publish(DomainEvent::new(EventType::Startup, "Application startup."));

        if let Err(reason) = self.authenticate() {
            self.shutdown(&mut cycle);
            return Err(ControlError::Authentication(reason));
        }

        if let Err(e) = self.launch(&mut cycle) {
            self.metrics.incr(MetricField::Errors, 1);
            self.state.mark_error(e.to_string());
            self.events.publish(
                DomainEvent::new(EventType::Error, "Startup failed.").with("error", e.to_string()),
            );
            self.shutdown(&mut cycle);
            return Err(e);
        }
        Ok(())
    }

    /// Stop every worker and flush. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.shutdown(&mut cycle);
    }

    fn authenticate(&self) -> std::result::Result<(), String> {
        if !self.config.auth.enabled {
            self.state.set_authenticated(true);
            self.events.publish(DomainEvent::new(
                EventType::AuthSuccess,
                "Auth disabled; bypassed.",
            ));
            return Ok(());
        }

        self.metrics.incr(MetricField::AuthAttempts, 1);
        match self.authenticator.authenticate() {
            Err(e) => {
                self.metrics.incr(MetricField::Errors, 1);
                self.state.mark_error(e.to_string());
                self.events.publish(
                    DomainEvent::new(EventType::Error, "Authentication exception.")
                        .with("error", e.to_string()),
                );
                Err(e.to_string())
            }
            Ok(result) if result.success => {
                self.state.set_authenticated(true);
                self.metrics.incr(MetricField::AuthSuccesses, 1);
                self.events.publish(
                    DomainEvent::new(EventType::AuthSuccess, "Authentication successful.")
                        .with("attempts", result.attempts),
                );
                Ok(())
            }
            Ok(result) => {
                self.events.publish(
                    DomainEvent::new(EventType::AuthFailure, "Authentication failed.")
                        .with("attempts", result.attempts)
                        .with("reason", result.reason.as_str()),
                );
                Err(result.reason)
            }
        }
    }

    /// Bring up collaborators and spawn the loops
    fn launch(&self, cycle: &mut Option<RunCycle>) -> Result<()> {
        let Some(run) = cycle.as_mut() else {
            return Ok(());
        };

        let adapter = (self.hand_adapters)(&self.config.gesture)
            .map_err(ControlError::into_hand_tracking)?;
        self.camera.start().map_err(ControlError::into_camera)?;

        if let Err(e) = self.voice.start() {
            self.warn("Voice listener failed to start.", "error", e.to_string());
        }
        let (available, reason) = self.voice.availability();
        if available {
            tracing::info!(reason = %reason, "voice input available");
        } else {
            tracing::warn!(reason = %reason, "voice input unavailable; gestures only");
        }

        self.state.set_phase(AppPhase::Running);

        let gesture = GestureLoop {
            stop: run.stop.clone(),
            camera: Arc::clone(&self.camera),
            adapter,
            interpreter: GestureInterpreter::new(self.config.gesture.clone()),
            screen: Arc::clone(&self.screen),
            mirrored: self.config.camera.mirrored,
            pipeline: Arc::clone(&self.pipeline),
        };
        run.workers.push(spawn_named("gesture-loop", move || gesture.run())?);

        let voice = VoiceLoop {
            stop: run.stop.clone(),
            phrases: self.voice.phrases(),
            mapper: Arc::clone(&self.mapper),
            pipeline: Arc::clone(&self.pipeline),
        };
        run.workers.push(spawn_named("voice-loop", move || voice.run())?);

        let heartbeat = HeartbeatLoop {
            stop: run.stop.clone(),
            started_at: run.started_at,
            interval: self.config.metrics.heartbeat_interval(),
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
            events: Arc::clone(&self.events),
        };
        run.workers.push(spawn_named("heartbeat-loop", move || heartbeat.run())?);

        tracing::info!(environment = %self.config.environment, "orchestrator running");
        Ok(())
    }

    fn shutdown(&self, cycle: &mut Option<RunCycle>) {
        let Some(run) = cycle.take() else {
            return;
        };
        self.state.set_phase(AppPhase::Stopping);

        run.stop.trigger();
        for worker in run.workers {
            join_with_timeout(worker, WORKER_JOIN_TIMEOUT);
        }

        self.voice.stop();
        self.camera.stop();

        let uptime = run.started_at.elapsed().as_secs_f64();
        self.state.set_uptime(uptime);
        self.state.set_phase(AppPhase::Stopped);

        self.events.publish(
            DomainEvent::new(EventType::Shutdown, "Application shutdown.").with("uptime", uptime),
        );

        if self.config.metrics.enabled {
            if let Err(e) = self.metrics_writer.write_now() {
                tracing::warn!(
                    path = %self.metrics_writer.output_path().display(),
                    "final metrics write failed: {}",
                    e
                );
            }
            self.metrics_writer.stop();
        }
        // Last, so the shutdown event above is still delivered
        self.events.stop();
    }

    fn warn(&self, message: &str, key: &str, value: String) {
        self.metrics.incr(MetricField::Warnings, 1);
        self.events
            .publish(DomainEvent::new(EventType::Warning, message).with(key, value));
    }
}

impl Drop for AppOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Worker loops
// ============================================================================

struct GestureLoop {
    stop: StopSignal,
    camera: Arc<dyn FrameSource>,
    adapter: Box<dyn HandLandmarkAdapter>,
    interpreter: GestureInterpreter,
    screen: Arc<dyn ScreenSize>,
    mirrored: bool,
    pipeline: Arc<CommandPipeline>,
}

impl GestureLoop {
    fn run(mut self) {
        let mut last_index = None;

        while !self.stop.is_triggered() {
            let frame = self
                .camera
                .read_latest_frame()
                .filter(|f| Some(f.index) != last_index);
            let Some(frame) = frame else {
                if self.stop.wait_timeout(FRAME_POLL_INTERVAL) {
                    break;
                }
                continue;
            };
            last_index = Some(frame.index);

            let hands = match self.adapter.parse(&frame) {
                Ok(hands) => hands,
                Err(e) => {
                    // Skip this frame; the next one retries
                    let e = e.into_hand_tracking();
                    tracing::debug!(index = frame.index, "hand tracking failed: {}", e);
                    self.pipeline.metrics.incr(MetricField::Warnings, 1);
                    self.pipeline.events.publish(
                        DomainEvent::new(EventType::Warning, "Hand tracking failed.")
                            .with("index", frame.index)
                            .with("error", e.to_string()),
                    );
                    continue;
                }
            };

            let gesture = self
                .interpreter
                .process(hands.first(), self.screen.size(), self.mirrored);

            let pipeline = &self.pipeline;
            pipeline.metrics.incr(MetricField::GestureFramesProcessed, 1);
            pipeline.events.publish(
                DomainEvent::new(EventType::GestureFrame, "Processed gesture frame.")
                    .with("hand_present", gesture.hand_present)
                    .with("index", frame.index),
            );

            for command in commands_from_gesture(&gesture) {
                if command.kind() != Some(CommandKind::MouseMove) {
                    pipeline.events.publish(
                        DomainEvent::new(EventType::GestureCommand, "Gesture recognized.")
                            .with("command", command.name.as_str()),
                    );
                }
                pipeline.handle(&command);
            }

            if self.stop.wait_timeout(FRAME_POLL_INTERVAL) {
                break;
            }
        }
    }
}

struct VoiceLoop {
    stop: StopSignal,
    phrases: flume::Receiver<VoicePhrase>,
    mapper: Arc<VoiceCommandMapper>,
    pipeline: Arc<CommandPipeline>,
}

impl VoiceLoop {
    fn run(self) {
        while !self.stop.is_triggered() {
            match self.phrases.recv_timeout(VOICE_POLL_TIMEOUT) {
                Ok(phrase) => self.on_phrase(&phrase),
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => {
                    tracing::warn!("voice phrase queue closed; voice loop exiting");
                    break;
                }
            }
        }
    }

    fn on_phrase(&self, phrase: &VoicePhrase) {
        let pipeline = &self.pipeline;
        pipeline.metrics.incr(MetricField::VoiceCommandsHeard, 1);

        let Some(command) = self.mapper.to_command(&phrase.text) else {
            pipeline.events.publish(
                DomainEvent::new(EventType::Warning, "Unmapped voice command ignored.")
                    .with("text", phrase.text.as_str()),
            );
            pipeline.metrics.incr(MetricField::Warnings, 1);
            return;
        };

        pipeline.events.publish(
            DomainEvent::new(EventType::VoiceCommand, "Voice command recognized.")
                .with("command", command.name.as_str())
                .with("text", phrase.text.as_str()),
        );
        pipeline.handle(&command);
    }
}

struct HeartbeatLoop {
    stop: StopSignal,
    started_at: Instant,
    interval: Duration,
    state: SharedState,
    metrics: SharedMetrics,
    events: Arc<EventBus>,
}

impl HeartbeatLoop {
    fn run(self) {
        loop {
            let uptime = self.started_at.elapsed().as_secs_f64();
            self.state.set_uptime(uptime);
            let snapshot = serde_json::to_value(self.metrics.snapshot()).unwrap_or_default();
            self.events.publish(
                DomainEvent::new(EventType::Heartbeat, "App heartbeat.")
                    .with("uptime_seconds", (uptime * 10.0).round() / 10.0)
                    .with("metrics", snapshot),
            );
            if self.stop.wait_timeout(self.interval) {
                break;
            }
        }
    }
}

// ============================================================================
// Event log sink
// ============================================================================

fn log_event(event: &DomainEvent, redact: bool) {
    let context = render_context(event, redact);
    let kind = event.event_type;
    match kind {
        EventType::Error | EventType::AuthFailure => {
            tracing::error!(event = %kind, context = %context, "{}", event.message)
        }
        EventType::Warning | EventType::CommandBlocked => {
            tracing::warn!(event = %kind, context = %context, "{}", event.message)
        }
        EventType::GestureFrame => tracing::trace!(event = %kind, "{}", event.message),
        _ => tracing::info!(event = %kind, "{}", event.message),
    }
}

/// Context as compact JSON; transcribed speech is masked when redacting
fn render_context(event: &DomainEvent, redact: bool) -> String {
    let mut context = event.context.clone();
    if redact {
        if let Some(text) = context.get_mut("text") {
            *text = Value::from("<redacted>");
        }
    }
    Value::Object(context).to_string()
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an [`AppOrchestrator`], defaulting any collaborator not supplied
pub struct OrchestratorBuilder {
    config: Config,
    dry_run: bool,
    actuator: Option<Arc<dyn MouseKeyboard>>,
    screen: Option<Arc<dyn ScreenSize>>,
    authenticator: Option<Arc<dyn FaceAuthenticator>>,
    camera: Option<Arc<dyn FrameSource>>,
    hand_adapters: Option<HandAdapterFactory>,
    voice: Option<Arc<dyn VoiceListener>>,
}

impl OrchestratorBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            dry_run: false,
            actuator: None,
            screen: None,
            authenticator: None,
            camera: None,
            hand_adapters: None,
            voice: None,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn actuator(mut self, actuator: Arc<dyn MouseKeyboard>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn screen(mut self, screen: Arc<dyn ScreenSize>) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn FaceAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn camera(mut self, camera: Arc<dyn FrameSource>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn hand_adapters<F>(mut self, factory: F) -> Self
    where
        F: Fn(&GestureConfig) -> Result<Box<dyn HandLandmarkAdapter>>
            + Send
            + Sync
            + 'static,
    {
        self.hand_adapters = Some(Box::new(factory));
        self
    }

    pub fn voice_listener(mut self, voice: Arc<dyn VoiceListener>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn build(self) -> Result<AppOrchestrator> {
        let config = self.config;
        config.validate()?;

        let (actuator, default_screen) = match self.actuator {
            Some(actuator) => (actuator, None),
            None => default_backend(self.dry_run)?,
        };
        let screen: Arc<dyn ScreenSize> = match self.screen.or(default_screen) {
            Some(screen) => screen,
            None => Arc::new(FixedScreen::default()),
        };
        let authenticator: Arc<dyn FaceAuthenticator> = match self.authenticator {
            Some(authenticator) => authenticator,
            None => Arc::new(UnconfiguredAuthenticator),
        };
        let camera: Arc<dyn FrameSource> = match self.camera {
            Some(camera) => camera,
            None => Arc::new(SlotFrameSource::new(LatestFrameSlot::new())),
        };
        let hand_adapters: HandAdapterFactory = match self.hand_adapters {
            Some(factory) => factory,
            None => Box::new(no_hands),
        };
        let voice: Arc<dyn VoiceListener> = match self.voice {
            Some(voice) => voice,
            None => Arc::new(ChannelVoiceListener::new(&config.voice)),
        };

        let state = RuntimeState::new();
        let events = Arc::new(EventBus::new());
        let metrics = metrics::new_shared();
        let metrics_writer = MetricsWriter::new(
            Arc::clone(&metrics),
            config.metrics.output_path.clone(),
            config.metrics.write_interval(),
        );

        let pipeline = Arc::new(CommandPipeline {
            guard: CommandGuard::new(&config.security),
            executor: CommandExecutor::new(actuator, Arc::clone(&screen)),
            metrics: Arc::clone(&metrics),
            events: Arc::clone(&events),
            state: Arc::clone(&state),
        });

        let redact = config.security.redact_sensitive_logs;
        events.subscribe_any(move |event| log_event(event, redact));

        Ok(AppOrchestrator {
            state,
            events,
            metrics,
            metrics_writer,
            pipeline,
            screen,
            authenticator,
            camera,
            hand_adapters,
            voice,
            mapper: Arc::new(VoiceCommandMapper::with_custom(&config.voice)),
            cycle: Mutex::new(None),
            config,
        })
    }
}

type Backend = (Arc<dyn MouseKeyboard>, Option<Arc<dyn ScreenSize>>);

fn no_hands(_: &GestureConfig) -> Result<Box<dyn HandLandmarkAdapter>> {
    Ok(Box::new(NoHands))
}

fn default_backend(dry_run: bool) -> Result<Backend> {
    if dry_run {
        let recorder: Arc<dyn MouseKeyboard> = RecordingActuator::new();
        return Ok((recorder, None));
    }
    os_backend()
}

#[cfg(feature = "os-input")]
fn os_backend() -> Result<Backend> {
    let desktop = Arc::new(crate::actuation::DesktopActuator::new()?);
    let screen: Arc<dyn ScreenSize> = desktop.clone();
    let actuator: Arc<dyn MouseKeyboard> = desktop;
    Ok((actuator, Some(screen)))
}

#[cfg(not(feature = "os-input"))]
fn os_backend() -> Result<Backend> {
    Err(ControlError::BackendUnavailable(
        "built without the os-input feature; use --dry-run".into(),
    ))
}
