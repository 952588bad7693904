//! Call session management
//!
//! This module provides the `SessionController` that drives one voice call:
//! - Credential exchange with the signaling backend
//! - Joining the media room and publishing the microphone
//! - Remote audio playback and autoplay recovery
//! - Side-channel transcripts and the activity log
//! - State transitions and teardown on every exit path

mod controller;
mod state;

pub use controller::{Collaborators, ControllerOptions, SessionController};
pub use state::{ActivityLog, CallSnapshot, LogEntry, SessionState};
