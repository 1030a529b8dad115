use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Actuation error: {0}")]
    Actuation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Hand tracking error: {0}")]
    HandTracking(String),

    #[error("Voice error: {0}")]
    Voice(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;

impl ControlError {
    /// Attribute a failure from the hand detector
    pub fn into_hand_tracking(self) -> Self {
        match self {
            e @ Self::HandTracking(_) => e,
            e => Self::HandTracking(e.to_string()),
        }
    }

    /// Attribute a failure from the frame source
    pub fn into_camera(self) -> Self {
        match self {
            e @ Self::Camera(_) => e,
            e => Self::Camera(e.to_string()),
        }
    }
}
