/// Result alias that carries the custom [`HearingError`] type.
pub type Result<T> = std::result::Result<T, HearingError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum HearingError {
    /// The default capture device is missing, permission was denied, or its
    /// stream could not be started. Only raised by `start()`.
    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),
    /// The default output device is missing or cannot follow the capture
    /// stream's sample rate.
    #[error("output device unavailable: {0}")]
    OutputUnavailable(String),
    /// Settings JSON could not be parsed or produced.
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl HearingError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn capture_unavailable<T: Into<String>>(reason: T) -> Self {
        Self::CaptureUnavailable(reason.into())
    }

    pub fn output_unavailable<T: Into<String>>(reason: T) -> Self {
        Self::OutputUnavailable(reason.into())
    }

    pub fn is_capture_unavailable(&self) -> bool {
        matches!(self, Self::CaptureUnavailable(_))
    }
}

impl From<&str> for HearingError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for HearingError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
