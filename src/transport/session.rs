use super::events::TransportEvent;
use crate::audio::LocalAudioTrack;
use crate::error::Result;
use crate::signaling::SessionCredentials;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Room construction options handed to the media library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomOptions {
    pub adaptive_stream: bool,
    pub dynacast: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            adaptive_stream: true,
            dynacast: true,
        }
    }
}

/// Options for publishing the local microphone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Discontinuous transmission; kept off so quiet speech is never dropped
    pub dtx: bool,
}

/// Joins media rooms.
///
/// `connect` suspends until the room handshake completes. On success the room
/// is joined and every later event is delivered on the returned receiver.
#[async_trait::async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        token: &str,
        options: RoomOptions,
    ) -> Result<(Arc<dyn Room>, EventReceiver)>;
}

/// A joined media room
#[async_trait::async_trait]
pub trait Room: Send + Sync {
    fn name(&self) -> &str;

    /// Identities of remote participants already present
    fn remote_participants(&self) -> Vec<String>;

    async fn publish_audio(&self, track: &LocalAudioTrack, options: PublishOptions) -> Result<()>;

    /// Leave the room. Must tolerate being called more than once.
    async fn disconnect(&self);
}

/// Owns the single active room of a call
pub struct TransportSession {
    connector: Arc<dyn RoomConnector>,
    options: RoomOptions,
    room: Mutex<Option<Arc<dyn Room>>>,
}

impl TransportSession {
    pub fn new(connector: Arc<dyn RoomConnector>, options: RoomOptions) -> Self {
        Self {
            connector,
            options,
            room: Mutex::new(None),
        }
    }

    /// Join the room described by `credentials`.
    ///
    /// The room lock is not held across the handshake, so a concurrent
    /// [`disconnect`](Self::disconnect) is a no-op until the join lands.
    pub async fn connect(&self, credentials: &SessionCredentials) -> Result<EventReceiver> {
        info!("Connecting to room {}", credentials.room_name);

        let (room, events) = self
            .connector
            .connect(&credentials.room_address, &credentials.access_token, self.options)
            .await?;

        let previous = self.room.lock().await.replace(room);
        if let Some(stale) = previous {
            warn!("Replacing a room that was still joined: {}", stale.name());
            stale.disconnect().await;
        }

        info!("Connected to room {}", credentials.room_name);
        Ok(events)
    }

    pub async fn room(&self) -> Option<Arc<dyn Room>> {
        self.room.lock().await.clone()
    }

    pub async fn is_joined(&self) -> bool {
        self.room.lock().await.is_some()
    }

    /// Leave the room if one is joined. Returns whether anything was left.
    pub async fn disconnect(&self) -> bool {
        let room = self.room.lock().await.take();
        match room {
            Some(room) => {
                info!("Disconnecting from room {}", room.name());
                room.disconnect().await;
                true
            }
            None => false,
        }
    }
}
