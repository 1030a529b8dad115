/// Lifecycle scenarios driven through the public orchestrator API with stub
/// collaborators: recording actuator, scripted authenticator, slot camera and
/// channel voice listener.
use handsfree::actuation::RecordingActuator;
use handsfree::auth::{AuthResult, FaceAuthenticator, ScriptedAuthenticator};
use handsfree::camera::{CameraFrame, LatestFrameSlot, SlotFrameSource};
use handsfree::command::{Command, CommandSource};
use handsfree::events::{DomainEvent, EventType};
use handsfree::gesture::{GestureFrame, HandLandmarkAdapter, HandLandmarks, Landmark};
use handsfree::metrics::MetricsSnapshot;
use handsfree::orchestrator::OrchestratorBuilder;
use handsfree::state::AppPhase;
use handsfree::voice::ChannelVoiceListener;
use handsfree::{AppOrchestrator, Config, ControlError};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.auth.enabled = false;
    config.voice.enabled = false;
    config.metrics.output_path = dir.join("metrics.json");
    config
}

fn builder(config: Config, recorder: &Arc<RecordingActuator>) -> OrchestratorBuilder {
    AppOrchestrator::builder(config).actuator(recorder.clone())
}

fn record_events(app: &AppOrchestrator) -> Arc<Mutex<Vec<DomainEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    app.events()
        .subscribe_any(move |e| sink.lock().unwrap().push(e.clone()));
    seen
}

fn types(events: &Mutex<Vec<DomainEvent>>) -> Vec<EventType> {
    events.lock().unwrap().iter().map(|e| e.event_type).collect()
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

/// Index and thumb pinched together, other fingers extended
fn pinch() -> HandLandmarks {
    HandLandmarks {
        thumb_tip: Landmark::new(0.505, 0.505),
        index_tip: Landmark::new(0.50, 0.50),
        index_pip: Landmark::new(0.50, 0.60),
        middle_tip: Landmark::new(0.60, 0.50),
        middle_pip: Landmark::new(0.60, 0.60),
        ring_tip: Landmark::new(0.65, 0.52),
        ring_pip: Landmark::new(0.65, 0.62),
        pinky_tip: Landmark::new(0.70, 0.52),
        pinky_pip: Landmark::new(0.70, 0.62),
        wrist: Landmark::new(0.50, 0.75),
    }
}

struct PinchAdapter;

impl HandLandmarkAdapter for PinchAdapter {
    fn parse(&mut self, _frame: &CameraFrame) -> handsfree::Result<Vec<HandLandmarks>> {
        Ok(vec![pinch()])
    }
}

#[test]
fn test_click_gesture_executes_exactly_one_command() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingActuator::new();
    let app = builder(test_config(dir.path()), &recorder).build().unwrap();

    app.start().unwrap();
    assert_eq!(app.phase(), AppPhase::Running);

    let handled = app.dispatch_gesture(&GestureFrame {
        hand_present: true,
        click: true,
        ..GestureFrame::default()
    });
    assert_eq!(handled, 1);
    app.stop();

    assert_eq!(app.metrics().command_count, 1);
    assert_eq!(recorder.rendered(), vec!["click:left"]);
}

#[test]
fn test_camera_frame_flows_through_gesture_loop() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingActuator::new();
    let camera = Arc::new(SlotFrameSource::new(LatestFrameSlot::new()));
    let app = builder(test_config(dir.path()), &recorder)
        .camera(camera.clone())
        .hand_adapters(|_| Ok(Box::new(PinchAdapter) as Box<dyn HandLandmarkAdapter>))
        .build()
        .unwrap();

    app.start().unwrap();
    camera.publish(640, 480, vec![0u8; 4]).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        recorder.rendered().contains(&"click:left".to_string())
    }));
    // The same slot contents are never processed twice
    std::thread::sleep(Duration::from_millis(100));
    app.stop();

    let metrics = app.metrics();
    assert_eq!(metrics.gesture_frames_processed, 1);
    assert_eq!(metrics.command_count, 2);
    assert_eq!(recorder.actions().len(), 2);
    assert!(recorder.rendered()[0].starts_with("move:"));
}

#[test]
fn test_voice_phrases_map_or_warn() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.voice.enabled = true;
    let recorder = RecordingActuator::new();
    let listener = Arc::new(ChannelVoiceListener::new(&config.voice));
    let phrases = listener.sender();
    let app = builder(config, &recorder)
        .voice_listener(listener)
        .build()
        .unwrap();
    let events = record_events(&app);

    app.start().unwrap();
    assert!(app.voice_availability().0);
    phrases.say("please volume up now").unwrap();
    phrases.say("open the pod bay doors").unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        app.metrics().voice_commands_heard == 2
    }));
    app.stop();

    let metrics = app.metrics();
    assert_eq!(metrics.warnings, 1);
    assert_eq!(metrics.command_count, 1);
    assert_eq!(recorder.rendered(), vec!["key:volumeup"]);

    let seen = types(&events);
    assert!(seen.contains(&EventType::VoiceCommand));
    assert!(seen.contains(&EventType::Warning));
}

#[test]
fn test_failed_authentication_blocks_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.auth.enabled = true;
    let recorder = RecordingActuator::new();
    let app = builder(config, &recorder)
        .authenticator(Arc::new(ScriptedAuthenticator::rejecting("No matching face.")))
        .build()
        .unwrap();
    let events = record_events(&app);

    let err = app.start().unwrap_err();
    assert!(matches!(err, ControlError::Authentication(reason) if reason == "No matching face."));

    let state = app.state();
    assert_eq!(state.phase, AppPhase::Stopped);
    assert!(!state.is_running);
    assert!(!state.is_authenticated);
    assert_eq!(app.metrics().auth_attempts, 1);
    assert_eq!(app.metrics().auth_successes, 0);

    assert_eq!(
        types(&events),
        vec![EventType::Startup, EventType::AuthFailure, EventType::Shutdown]
    );
    let failure = events.lock().unwrap()[1].clone();
    assert_eq!(failure.context["attempts"], 1);
    assert_eq!(failure.context["reason"], "No matching face.");
}

#[test]
fn test_authenticator_error_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.auth.enabled = true;
    let recorder = RecordingActuator::new();
    let auth = ScriptedAuthenticator::always(AuthResult::success(1))
        .then(Err(ControlError::Camera("device busy".into())));
    let app = builder(config, &recorder)
        .authenticator(Arc::new(auth))
        .build()
        .unwrap();

    assert!(app.start().is_err());
    assert_eq!(app.metrics().errors, 1);
    assert!(app.state().errors[0].contains("device busy"));

    // next attempt falls through to the scripted success
    app.start().unwrap();
    assert!(app.state().is_authenticated);
    assert_eq!(app.metrics().auth_successes, 1);
    app.stop();
}

#[test]
fn test_enabled_auth_without_backend_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.auth.enabled = true;
    let recorder = RecordingActuator::new();
    let app = builder(config, &recorder).build().unwrap();

    assert!(app.start().is_err());
    assert_eq!(app.phase(), AppPhase::Stopped);
}

#[test]
fn test_blocked_and_failed_commands_are_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingActuator::new();
    let app = builder(test_config(dir.path()), &recorder).build().unwrap();
    let events = record_events(&app);
    app.start().unwrap();

    app.handle_command(&Command::new("nuke.everything", CommandSource::Test));
    recorder.fail_with(Some("display lost"));
    app.handle_command(&Command::new("mouse.click.left", CommandSource::Test));
    recorder.fail_with(None);
    app.handle_command(&Command::new("mouse.click.left", CommandSource::Test));
    app.stop();

    let metrics = app.metrics();
    assert_eq!(metrics.blocked_command_count, 1);
    assert_eq!(metrics.errors, 1);
    assert_eq!(metrics.command_count, 1);
    assert!(app.state().errors.iter().any(|e| e.contains("display lost")));

    let seen = types(&events);
    assert!(seen.contains(&EventType::CommandBlocked));
    assert!(seen.contains(&EventType::Error));
    assert!(seen.contains(&EventType::CommandExecuted));
}

#[test]
fn test_start_stop_idempotent_and_metrics_flushed() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let metrics_path = config.metrics.output_path.clone();
    let recorder = RecordingActuator::new();
    let app = builder(config, &recorder).build().unwrap();
    let events = record_events(&app);

    app.start().unwrap();
    app.start().unwrap();
    app.handle_command(&Command::new("mouse.click.right", CommandSource::Test));
    app.stop();
    app.stop();

    let seen = types(&events);
    assert_eq!(seen.iter().filter(|t| **t == EventType::Startup).count(), 1);
    assert_eq!(seen.iter().filter(|t| **t == EventType::Shutdown).count(), 1);
    assert_eq!(seen.last(), Some(&EventType::Shutdown));
    assert!(!app.events().is_running());

    let doc: Value =
        serde_json::from_str(&std::fs::read_to_string(&metrics_path).unwrap()).unwrap();
    assert!(doc["timestamp"].is_number());
    assert_eq!(doc["snapshot"]["command_count"], 1);
    assert_eq!(doc["snapshot"]["blocked_command_count"], 0);
}

#[test]
fn test_metrics_cumulative_unless_reset_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingActuator::new();
    let click = Command::new("mouse.click.left", CommandSource::Test);

    let app = builder(test_config(dir.path()), &recorder).build().unwrap();
    for _ in 0..2 {
        app.start().unwrap();
        app.handle_command(&click);
        app.stop();
    }
    assert_eq!(app.metrics().command_count, 2);

    let mut config = test_config(dir.path());
    config.metrics.reset_on_start = true;
    let app = builder(config, &recorder).build().unwrap();
    for _ in 0..2 {
        app.start().unwrap();
        app.handle_command(&click);
        app.stop();
    }
    assert_eq!(app.metrics().command_count, 1);
}

#[test]
fn test_heartbeat_carries_uptime_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.metrics.heartbeat_interval_seconds = 0.02;
    let recorder = RecordingActuator::new();
    let app = builder(config, &recorder).build().unwrap();
    let events = record_events(&app);

    app.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        types(&events)
            .iter()
            .filter(|t| **t == EventType::Heartbeat)
            .count()
            >= 2
    }));
    app.stop();

    let heartbeat = events
        .lock()
        .unwrap()
        .iter()
        .find(|e| e.event_type == EventType::Heartbeat)
        .cloned()
        .unwrap();
    assert!(heartbeat.context["uptime_seconds"].is_number());
    assert!(heartbeat.context["metrics"]["command_count"].is_number());
    assert!(app.state().uptime_seconds > 0.0);
}

#[test]
fn test_unsupported_command_surfaces_as_error_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.security.fail_closed = false;
    let recorder = RecordingActuator::new();
    let app = builder(config, &recorder).build().unwrap();
    let events = record_events(&app);

    app.start().unwrap();
    app.handle_command(&Command::new("custom.thing", CommandSource::Test));
    app.stop();

    let metrics: MetricsSnapshot = app.metrics();
    assert_eq!(metrics.errors, 1);
    assert_eq!(metrics.blocked_command_count, 0);
    assert_eq!(metrics.command_count, 0);
    assert!(recorder.actions().is_empty());
    assert!(app.state().errors.iter().any(|e| e.contains("custom.thing")));

    let error = events
        .lock()
        .unwrap()
        .iter()
        .find(|e| e.event_type == EventType::Error)
        .cloned()
        .unwrap();
    assert!(error.context["error"].as_str().unwrap().contains("Unsupported command"));
    assert!(!types(&events).contains(&EventType::CommandBlocked));
}

struct BrokenAdapter;

impl HandLandmarkAdapter for BrokenAdapter {
    fn parse(&mut self, _frame: &CameraFrame) -> handsfree::Result<Vec<HandLandmarks>> {
        Err(ControlError::Io(std::io::Error::other("model crashed")))
    }
}

#[test]
fn test_hand_tracking_failures_are_attributed() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingActuator::new();
    let app = builder(test_config(dir.path()), &recorder)
        .hand_adapters(|_| Err(ControlError::Io(std::io::Error::other("model missing"))))
        .build()
        .unwrap();

    let err = app.start().unwrap_err();
    assert!(matches!(err, ControlError::HandTracking(ref m) if m.contains("model missing")));
    assert_eq!(app.phase(), AppPhase::Stopped);

    let camera = Arc::new(SlotFrameSource::new(LatestFrameSlot::new()));
    let app = builder(test_config(dir.path()), &recorder)
        .camera(camera.clone())
        .hand_adapters(|_| Ok(Box::new(BrokenAdapter) as Box<dyn HandLandmarkAdapter>))
        .build()
        .unwrap();
    let events = record_events(&app);
    app.start().unwrap();
    camera.publish(640, 480, vec![0u8; 4]).unwrap();
    assert!(wait_until(Duration::from_secs(2), || app.metrics().warnings == 1));
    app.stop();

    let warning = events
        .lock()
        .unwrap()
        .iter()
        .find(|e| e.event_type == EventType::Warning)
        .cloned()
        .unwrap();
    assert!(warning.context["error"].as_str().unwrap().starts_with("Hand tracking error"));
    assert_eq!(app.phase(), AppPhase::Stopped);
}

struct SlowAuthenticator;

impl FaceAuthenticator for SlowAuthenticator {
    fn authenticate(&self) -> handsfree::Result<AuthResult> {
        std::thread::sleep(Duration::from_millis(200));
        Ok(AuthResult::success(1))
    }
}

#[test]
fn test_stop_during_authentication_waits_then_stops() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.auth.enabled = true;
    let recorder = RecordingActuator::new();
    let app = Arc::new(
        builder(config, &recorder)
            .authenticator(Arc::new(SlowAuthenticator))
            .build()
            .unwrap(),
    );

    let starter = Arc::clone(&app);
    let handle = std::thread::spawn(move || starter.start());
    assert!(wait_until(Duration::from_secs(2), || {
        app.phase() == AppPhase::Authenticating
    }));
    app.stop();

    assert!(handle.join().unwrap().is_ok());
    assert_eq!(app.phase(), AppPhase::Stopped);
    assert!(!app.state().is_running);
}
