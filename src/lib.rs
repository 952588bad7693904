pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod signaling;
pub mod transcript;
pub mod transport;

pub use audio::{
    AudioOutputPlatform, CaptureOptions, LocalAudioPublisher, LocalAudioTrack, Microphone,
    PlayableOutput, RemoteAudioSink, UserInteraction,
};
pub use config::Config;
pub use error::CallError;
pub use http::{create_router, AppState};
pub use session::{CallSnapshot, Collaborators, ControllerOptions, SessionController, SessionState};
pub use signaling::{CredentialExchange, HttpCredentialExchange, SessionCredentials};
pub use transcript::{Speaker, TranscriptEvent};
pub use transport::{Room, RoomConnector, TransportEvent, TransportSession};
