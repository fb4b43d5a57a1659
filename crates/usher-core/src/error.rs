//! Error types for Usher Core

use thiserror::Error;

/// Result type alias for playback coordination operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coordination error types
///
/// Only integration-contract violations surface as errors. Environment
/// gaps (autoplay unsupported, fullscreen unavailable) are branched around
/// silently, and transient measurement races resolve to `None` upstream.
#[derive(Error, Debug)]
pub enum Error {
    /// A state query referenced a video that was never registered.
    #[error("no registered video matches element `{0}`")]
    VideoNotRegistered(String),

    /// `rotate-to-fullscreen` was requested on a video that cannot take
    /// user input, so the gesture could never be attributed.
    #[error("rotate-to-fullscreen requires an interactive video: `{0}`")]
    RotateToFullscreenNotInteractive(String),
}

impl Error {
    /// Returns the error code for analytics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::VideoNotRegistered(_) => "VIDEO_NOT_REGISTERED",
            Error::RotateToFullscreenNotInteractive(_) => "ROTATE_FULLSCREEN_NOT_INTERACTIVE",
        }
    }
}
