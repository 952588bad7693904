use crate::session::SessionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Missing upstream configuration: {0}")]
    Configuration(String),

    #[error("Connection rejected by signaling backend (status {status}): {message}")]
    ConnectionRejected { status: u16, message: String },

    #[error("Signaling request failed: {0}")]
    Signaling(#[from] reqwest::Error),

    #[error("Microphone unavailable: {0}")]
    MediaAcquisition(String),

    #[error("Playback blocked: {0}")]
    PlaybackBlocked(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Cannot {action} while call is {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("A previous start is still settling")]
    Busy,

    #[error("Call was stopped before it finished connecting")]
    Cancelled,
}

impl CallError {
    /// Text shown to the user when a start attempt fails.
    ///
    /// Upstream rejections are passed through as-is.
    pub fn user_message(&self) -> String {
        match self {
            CallError::ConnectionRejected { message, .. } if !message.is_empty() => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
