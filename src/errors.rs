use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Screen capture error: {0}")]
    Capture(String),

    #[error("Decision service error: {0}")]
    Transport(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Coordinates do not match action '{action}': {detail}")]
    InvalidActionShape { action: String, detail: String },

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Safety violation: {0}")]
    SafetyViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PilotError {
    /// Failures that only cost the current iteration and leave no trace in
    /// the loop's error list.
    pub fn is_transient(&self) -> bool {
        matches!(self, PilotError::Capture(_))
    }

    /// Failures that end the loop regardless of the failure budget.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PilotError::SafetyViolation(_))
    }

    /// Model output that could not be turned into an action.
    pub fn is_malformed_response(&self) -> bool {
        matches!(
            self,
            PilotError::MalformedResponse(_) | PilotError::InvalidActionShape { .. }
        )
    }
}

impl serde::Serialize for PilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;
