// Error types for the playback service
// Failures are handled where they happen; these types carry them to the log
// and to the event loop, never back to a command caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlaybackError>;

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The station host could not be reached
    #[error("No network connection")]
    NetworkUnavailable,

    /// The stream could not be opened, probed or routed to an output device
    #[error("Stream preparation failed: {0}")]
    PreparationFailure(String),

    /// The host refused to grant audio focus
    #[error("Audio focus request denied")]
    FocusDenied,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Audio output error: {0}")]
    Output(String),

    #[error("Invalid stream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl PlaybackError {
    pub fn preparation(msg: impl Into<String>) -> Self {
        Self::PreparationFailure(msg.into())
    }
}
