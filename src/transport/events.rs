use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// A track published by a remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    /// Track id assigned by the room, unique within it
    pub sid: String,
    pub kind: TrackKind,
    /// Publisher-declared source, e.g. "microphone"
    pub source: String,
}

impl RemoteTrack {
    pub fn audio(sid: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            kind: TrackKind::Audio,
            source: "microphone".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Lost,
    Unknown,
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Lost => "lost",
            ConnectionQuality::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Everything the room reports after join, in delivery order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ParticipantJoined {
        identity: String,
    },
    TrackPublished {
        participant: String,
        track: RemoteTrack,
    },
    TrackSubscribed {
        participant: String,
        track: RemoteTrack,
    },
    TrackUnsubscribed {
        participant: String,
        track: RemoteTrack,
    },
    /// Side-channel payload; `participant` is `None` for server-sent data
    DataReceived {
        participant: Option<String>,
        payload: Vec<u8>,
    },
    Disconnected {
        reason: Option<String>,
    },
    ConnectionQualityChanged {
        participant: String,
        quality: ConnectionQuality,
    },
}
