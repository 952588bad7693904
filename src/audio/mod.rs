pub mod capture;
pub mod playback;

pub use capture::{CaptureOptions, CaptureStream, LocalAudioPublisher, LocalAudioTrack, Microphone};
pub use playback::{
    AttachOutcome, AudioOutputPlatform, PlayableOutput, PlaybackNotifier, PlaybackSignal,
    PlayOutcome, RemoteAudioHandle, RemoteAudioSink, SinkEvent, SinkEventReceiver,
    SinkEventSender, UserInteraction,
};
