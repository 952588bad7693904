use crate::error::{CallError, Result};
use crate::transport::{PublishOptions, TransportSession};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Microphone capture settings
///
/// Tuned for speech recognition rather than music fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channel_count: u16,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: 48000,
            channel_count: 1,
        }
    }
}

/// Platform side of an open microphone
pub trait CaptureStream: Send + Sync {
    /// Release the capture device
    fn stop(&self);
}

/// A microphone capture ready to be published into a room
#[derive(Clone)]
pub struct LocalAudioTrack {
    id: String,
    options: CaptureOptions,
    stream: Arc<dyn CaptureStream>,
}

impl LocalAudioTrack {
    pub fn new(id: impl Into<String>, options: CaptureOptions, stream: Arc<dyn CaptureStream>) -> Self {
        Self {
            id: id.into(),
            options,
            stream,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    fn stop(self) {
        self.stream.stop();
    }
}

impl fmt::Debug for LocalAudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAudioTrack")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish()
    }
}

/// Microphone access trait
///
/// Platform-specific implementations open the default input device with the
/// requested processing. A denied or missing device is reported as
/// [`CallError::MediaAcquisition`].
#[async_trait::async_trait]
pub trait Microphone: Send + Sync {
    async fn acquire(&self, options: &CaptureOptions) -> Result<LocalAudioTrack>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Owns the single published microphone of a call
pub struct LocalAudioPublisher {
    microphone: Arc<dyn Microphone>,
    options: CaptureOptions,
    track: Mutex<Option<LocalAudioTrack>>,
}

impl LocalAudioPublisher {
    pub fn new(microphone: Arc<dyn Microphone>, options: CaptureOptions) -> Self {
        Self {
            microphone,
            options,
            track: Mutex::new(None),
        }
    }

    /// Acquire the microphone and publish it into the joined room.
    ///
    /// The device is recorded before publishing so that [`stop`](Self::stop)
    /// releases it on every path, including a failed publish.
    pub async fn publish(&self, transport: &TransportSession) -> Result<()> {
        let room = transport.room().await.ok_or_else(|| {
            CallError::Transport("Cannot publish the microphone before the room is joined".to_string())
        })?;

        info!("Opening microphone {} ({:?})", self.microphone.name(), self.options);
        let track = self.microphone.acquire(&self.options).await?;

        let previous = self.track.lock().await.replace(track.clone());
        if let Some(stale) = previous {
            warn!("Releasing a microphone track that was never stopped: {}", stale.id());
            stale.stop();
        }

        info!("Publishing microphone track {}", track.id());
        room.publish_audio(&track, PublishOptions::default()).await?;
        info!("Microphone published");

        Ok(())
    }

    pub async fn is_active(&self) -> bool {
        self.track.lock().await.is_some()
    }

    /// Release the capture device if held. Returns whether anything was released.
    pub async fn stop(&self) -> bool {
        let track = self.track.lock().await.take();
        match track {
            Some(track) => {
                info!("Stopping microphone track {}", track.id());
                track.stop();
                true
            }
            None => false,
        }
    }
}
