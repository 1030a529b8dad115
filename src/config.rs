use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ControlError, Result};

/// Paths probed by [`Config::load`], first existing file wins.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "config/handsfree.toml",
    "config/handsfree.local.toml",
    "handsfree.toml",
];

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            camera: CameraConfig::default(),
            gesture: GestureConfig::default(),
            voice: VoiceConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_environment() -> String {
    "dev".into()
}

// ============================================================================
// Camera Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// Flip the x axis so the pointer follows the hand like a mirror
    #[serde(default = "default_true")]
    pub mirrored: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            target_fps: default_target_fps(),
            mirrored: true,
        }
    }
}

fn default_camera_width() -> u32 {
    1280
}

fn default_camera_height() -> u32 {
    720
}

fn default_target_fps() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Gesture Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GestureConfig {
    #[serde(default = "default_hand_max_num")]
    pub hand_max_num: u32,
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_min_tracking_confidence")]
    pub min_tracking_confidence: f32,
    /// Normalized index-to-thumb distance below which a pinch counts as a click
    #[serde(default = "default_click_distance")]
    pub click_distance_threshold: f32,
    /// Normalized middle-to-thumb distance below which a pinch counts as a right click
    #[serde(default = "default_right_click_distance")]
    pub right_click_distance_threshold: f32,
    #[serde(default = "default_double_click_cooldown")]
    pub double_click_cooldown_seconds: f64,
    #[serde(default = "default_drag_hold")]
    pub drag_hold_threshold_seconds: f64,
    /// EMA factor applied to pointer deltas (0.0-1.0]
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f32,
    /// Per-axis movement (pixels) ignored as jitter
    #[serde(default = "default_deadzone_px")]
    pub deadzone_px: u32,
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: f32,
    #[serde(default = "default_fast_scroll_threshold")]
    pub fast_scroll_threshold: f32,
    #[serde(default = "default_scroll_step")]
    pub scroll_step: i32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            hand_max_num: default_hand_max_num(),
            min_detection_confidence: default_min_detection_confidence(),
            min_tracking_confidence: default_min_tracking_confidence(),
            click_distance_threshold: default_click_distance(),
            right_click_distance_threshold: default_right_click_distance(),
            double_click_cooldown_seconds: default_double_click_cooldown(),
            drag_hold_threshold_seconds: default_drag_hold(),
            smoothing_alpha: default_smoothing_alpha(),
            deadzone_px: default_deadzone_px(),
            scroll_threshold: default_scroll_threshold(),
            fast_scroll_threshold: default_fast_scroll_threshold(),
            scroll_step: default_scroll_step(),
        }
    }
}

impl GestureConfig {
    pub fn double_click_cooldown(&self) -> Duration {
        seconds_or(self.double_click_cooldown_seconds, default_double_click_cooldown())
    }

    pub fn drag_hold_threshold(&self) -> Duration {
        seconds_or(self.drag_hold_threshold_seconds, default_drag_hold())
    }
}

fn default_hand_max_num() -> u32 {
    1
}
fn default_min_detection_confidence() -> f32 {
    0.70
}
fn default_min_tracking_confidence() -> f32 {
    0.50
}
fn default_click_distance() -> f32 {
    0.045
}
fn default_right_click_distance() -> f32 {
    0.050
}
fn default_double_click_cooldown() -> f64 {
    0.8
}
fn default_drag_hold() -> f64 {
    0.6
}
fn default_smoothing_alpha() -> f32 {
    0.25
}
fn default_deadzone_px() -> u32 {
    4
}
fn default_scroll_threshold() -> f32 {
    0.35
}
fn default_fast_scroll_threshold() -> f32 {
    0.60
}
fn default_scroll_step() -> i32 {
    120
}

// ============================================================================
// Voice Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VoiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_phrase_time_limit")]
    pub phrase_time_limit_seconds: f64,
    #[serde(default = "default_ambient_noise_adjust")]
    pub ambient_noise_adjust_seconds: f64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: f64,
    /// Extra phrase rules, matched before the built-in table in declared order
    #[serde(default)]
    pub custom: Vec<CustomPhrase>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            phrase_time_limit_seconds: default_phrase_time_limit(),
            ambient_noise_adjust_seconds: default_ambient_noise_adjust(),
            language: default_language(),
            command_timeout_seconds: default_command_timeout(),
            custom: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CustomPhrase {
    pub phrase: String,
    pub command: String,
}

fn default_phrase_time_limit() -> f64 {
    4.0
}
fn default_ambient_noise_adjust() -> f64 {
    1.0
}
fn default_language() -> String {
    "en-US".into()
}
fn default_command_timeout() -> f64 {
    5.0
}

// ============================================================================
// Auth Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_face_image_path")]
    pub face_image_path: String,
    #[serde(default = "default_acceptance_tolerance")]
    pub acceptance_tolerance: f32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            face_image_path: default_face_image_path(),
            acceptance_tolerance: default_acceptance_tolerance(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_face_image_path() -> String {
    "user.png".into()
}
fn default_acceptance_tolerance() -> f32 {
    0.45
}
fn default_max_attempts() -> u32 {
    2
}

// ============================================================================
// Security Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SecurityConfig {
    /// Reject commands missing from the allow-list
    #[serde(default = "default_true")]
    pub fail_closed: bool,
    #[serde(default = "default_true")]
    pub redact_sensitive_logs: bool,
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            fail_closed: true,
            redact_sensitive_logs: true,
            allowed_commands: default_allowed_commands(),
        }
    }
}

fn default_allowed_commands() -> Vec<String> {
    [
        "mouse.move",
        "mouse.move.center",
        "mouse.move.top_left",
        "mouse.move.top_right",
        "mouse.move.bottom_left",
        "mouse.move.bottom_right",
        "mouse.click.left",
        "mouse.click.right",
        "mouse.double_click",
        "mouse.scroll.up",
        "mouse.scroll.down",
        "system.volume.up",
        "system.volume.down",
        "system.mute.toggle",
        "system.lock",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ============================================================================
// Metrics Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_write_interval")]
    pub write_interval_seconds: f64,
    #[serde(default = "default_metrics_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: f64,
    /// Zero all counters on every start() instead of accumulating per process
    #[serde(default)]
    pub reset_on_start: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_interval_seconds: default_write_interval(),
            output_path: default_metrics_path(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            reset_on_start: false,
        }
    }
}

impl MetricsConfig {
    pub fn write_interval(&self) -> Duration {
        seconds_or(self.write_interval_seconds, default_write_interval())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        seconds_or(self.heartbeat_interval_seconds, default_heartbeat_interval())
    }
}

fn default_write_interval() -> f64 {
    10.0
}
fn default_metrics_path() -> PathBuf {
    PathBuf::from("runtime/metrics.json")
}
fn default_heartbeat_interval() -> f64 {
    5.0
}

// ============================================================================
// Logging Config
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file; `None` logs to stderr only
    #[serde(default = "default_log_path")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_rotation_megabytes")]
    pub rotation_megabytes: u32,
    #[serde(default = "default_backup_count")]
    pub backup_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            path: default_log_path(),
            rotation_megabytes: default_rotation_megabytes(),
            backup_count: default_backup_count(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_path() -> Option<PathBuf> {
    Some(PathBuf::from("runtime/handsfree.log"))
}
fn default_rotation_megabytes() -> u32 {
    5
}
fn default_backup_count() -> u32 {
    5
}

impl Config {
    /// Load the first config file found in [`DEFAULT_CONFIG_PATHS`], or defaults
    pub fn load() -> Result<Self> {
        let paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        Self::load_first_available(&paths)
    }

    pub fn load_first_available<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        for path in paths {
            if path.as_ref().exists() {
                return Self::from_file(path);
            }
        }
        Ok(Config::default())
    }

    /// Parse a TOML config file. A missing file yields the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        let g = &self.gesture;
        if !(g.smoothing_alpha > 0.0 && g.smoothing_alpha <= 1.0) {
            return Err(ControlError::Config(format!(
                "gesture.smoothing_alpha must be in (0, 1], got {}",
                g.smoothing_alpha
            )));
        }
        if g.fast_scroll_threshold < g.scroll_threshold {
            return Err(ControlError::Config(
                "gesture.fast_scroll_threshold must not be below gesture.scroll_threshold".into(),
            ));
        }
        if g.scroll_step <= 0 {
            return Err(ControlError::Config("gesture.scroll_step must be positive".into()));
        }
        check_seconds(
            "gesture.double_click_cooldown_seconds",
            g.double_click_cooldown_seconds,
            true,
        )?;
        check_seconds(
            "gesture.drag_hold_threshold_seconds",
            g.drag_hold_threshold_seconds,
            true,
        )?;
        check_seconds(
            "metrics.write_interval_seconds",
            self.metrics.write_interval_seconds,
            false,
        )?;
        check_seconds(
            "metrics.heartbeat_interval_seconds",
            self.metrics.heartbeat_interval_seconds,
            false,
        )?;
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ControlError::Config("camera size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Reject values `Duration` cannot hold (negative, NaN, overflowing)
fn check_seconds(field: &str, value: f64, allow_zero: bool) -> Result<()> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) if allow_zero || !d.is_zero() => Ok(()),
        Ok(_) => Err(ControlError::Config(format!("{} must be positive", field))),
        Err(_) => Err(ControlError::Config(format!(
            "{} must be a finite, non-negative number of seconds, got {}",
            field, value
        ))),
    }
}

fn seconds_or(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value)
        .or_else(|_| Duration::try_from_secs_f64(fallback))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.environment, "dev");
        assert!(config.voice.enabled);
        assert!(config.security.fail_closed);
        assert_eq!(config.gesture.deadzone_px, 4);
        assert!(config
            .security
            .allowed_commands
            .contains(&"mouse.click.left".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let config = Config::from_toml(
            r#"
environment = "prod"

[camera]
width = 1920
height = 1080

[voice]
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(config.environment, "prod");
        assert_eq!(config.camera.width, 1920);
        assert_eq!(config.camera.target_fps, 30);
        assert!(!config.voice.enabled);
        assert_eq!(config.voice.language, "en-US");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_first_available() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.toml");
        let b = dir.path().join("b.toml");
        fs::write(&b, "environment = \"stage\"\n").unwrap();
        let config = Config::load_first_available(&[a, b]).unwrap();
        assert_eq!(config.environment, "stage");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(Config::from_toml("camera = 5").is_err());
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let result = Config::from_toml("[gesture]\nsmoothing_alpha = 0.0\n");
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn test_unrepresentable_durations_rejected() {
        for field in ["double_click_cooldown_seconds", "drag_hold_threshold_seconds"] {
            for value in ["-0.5", "nan", "1e300"] {
                let text = format!("[gesture]\n{} = {}\n", field, value);
                assert!(
                    matches!(Config::from_toml(&text), Err(ControlError::Config(_))),
                    "{} = {} should be rejected",
                    field,
                    value
                );
            }
        }
        assert!(Config::from_toml("[gesture]\ndouble_click_cooldown_seconds = 0.0\n").is_ok());

        for field in ["write_interval_seconds", "heartbeat_interval_seconds"] {
            for value in ["0.0", "-1.0", "inf"] {
                let text = format!("[metrics]\n{} = {}\n", field, value);
                assert!(Config::from_toml(&text).is_err(), "{} = {}", field, value);
            }
        }
    }

    #[test]
    fn test_duration_accessors_fall_back_to_defaults() {
        let mut gesture = GestureConfig::default();
        gesture.double_click_cooldown_seconds = -0.5;
        gesture.drag_hold_threshold_seconds = f64::NAN;
        assert_eq!(
            gesture.double_click_cooldown(),
            Duration::from_secs_f64(default_double_click_cooldown())
        );
        assert_eq!(
            gesture.drag_hold_threshold(),
            Duration::from_secs_f64(default_drag_hold())
        );
        assert_eq!(MetricsConfig::default().heartbeat_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = Config::default().to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }
}
