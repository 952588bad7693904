//! Remote audio playback with autoplay recovery
//!
//! Each subscribed remote audio track gets a playable output from the platform.
//! The first play attempt may be refused by an autoplay policy. That refusal is
//! expected: the sink parks a one-shot trigger on the next user interaction and
//! retries exactly once when it fires. A handle never has more than one trigger
//! pending; registering a new one aborts the old.
//!
//! The sink never awaits the platform. Every `play()` runs in its own task and
//! reports back through a [`SinkEvent::PlayAttempted`], so a play that never
//! settles cannot hold up the owner of the sink.

use crate::error::Result;
use crate::transport::{RemoteTrack, TrackKind};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// State changes reported by a playable output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSignal {
    Started,
    Paused,
    Ended,
    Failed(String),
}

/// Work the sink asks its owner to feed back into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Playback {
        track_sid: String,
        signal: PlaybackSignal,
    },
    /// A user interaction fired the resume trigger `trigger` of `track_sid`
    ResumeRequested { track_sid: String, trigger: u64 },
    /// Play attempt `attempt` on `track_sid` settled
    PlayAttempted {
        track_sid: String,
        attempt: u64,
        result: std::result::Result<(), String>,
    },
}

pub type SinkEventSender = mpsc::UnboundedSender<SinkEvent>;
pub type SinkEventReceiver = mpsc::UnboundedReceiver<SinkEvent>;

/// Handed to the platform on attach so the output can report state changes
#[derive(Clone)]
pub struct PlaybackNotifier {
    track_sid: String,
    tx: SinkEventSender,
}

impl PlaybackNotifier {
    pub fn track_sid(&self) -> &str {
        &self.track_sid
    }

    pub fn notify(&self, signal: PlaybackSignal) {
        // Receiver is gone once the session is torn down
        let _ = self.tx.send(SinkEvent::Playback {
            track_sid: self.track_sid.clone(),
            signal,
        });
    }
}

/// An audio output bound to one remote track
///
/// `play` reports an autoplay refusal as
/// [`CallError::PlaybackBlocked`](crate::CallError::PlaybackBlocked) and may
/// take arbitrarily long to settle. `pause` and `detach` must be idempotent.
#[async_trait::async_trait]
pub trait PlayableOutput: Send + Sync {
    async fn play(&self) -> Result<()>;

    fn pause(&self);

    fn detach(&self);
}

/// Creates playable outputs for remote tracks
pub trait AudioOutputPlatform: Send + Sync {
    fn attach(&self, track: &RemoteTrack, notifier: PlaybackNotifier) -> Result<Arc<dyn PlayableOutput>>;
}

/// One-shot "next user interaction" primitive
pub trait UserInteraction: Send + Sync {
    /// Resolves on the next genuine user interaction. Dropping the future
    /// cancels the registration.
    fn next_interaction(&self) -> BoxFuture<'static, ()>;
}

/// Outcome of handling a track subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Output attached; the first play attempt is under way
    Attached,
    AttachFailed(String),
    NotAudio(TrackKind),
}

/// What a settled play attempt means for the track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Playing,
    /// Autoplay refused; a resume trigger is waiting for user interaction
    Blocked(String),
    /// The retry after a user interaction played
    Resumed,
    /// The retry was refused too; a fresh trigger replaced the consumed one
    StillBlocked(String),
}

struct ResumeTrigger {
    id: u64,
    task: AbortHandle,
}

struct PendingPlay {
    id: u64,
    retry: bool,
    task: AbortHandle,
}

/// Playback state of one subscribed remote audio track
pub struct RemoteAudioHandle {
    participant: String,
    track: RemoteTrack,
    output: Arc<dyn PlayableOutput>,
    is_attached: bool,
    is_playing: bool,
    play: Option<PendingPlay>,
    resume: Option<ResumeTrigger>,
    retries: u32,
}

impl RemoteAudioHandle {
    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn track(&self) -> &RemoteTrack {
        &self.track
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// A play attempt has not settled yet
    pub fn has_pending_play(&self) -> bool {
        self.play.is_some()
    }

    pub fn has_pending_resume(&self) -> bool {
        self.resume.is_some()
    }

    /// User-triggered play retries so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn cancel_resume(&mut self) {
        if let Some(trigger) = self.resume.take() {
            trigger.task.abort();
        }
    }

    fn cancel_play(&mut self) {
        if let Some(play) = self.play.take() {
            play.task.abort();
        }
    }

    fn release(&mut self) {
        self.cancel_play();
        self.cancel_resume();
        self.is_playing = false;
        if self.is_attached {
            self.output.pause();
            self.output.detach();
            self.is_attached = false;
        }
    }
}

impl fmt::Debug for RemoteAudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAudioHandle")
            .field("participant", &self.participant)
            .field("track", &self.track)
            .field("is_attached", &self.is_attached)
            .field("is_playing", &self.is_playing)
            .field("pending_play", &self.play.is_some())
            .field("pending_resume", &self.resume.is_some())
            .field("retries", &self.retries)
            .finish()
    }
}

/// Owns every remote audio output of the active call
pub struct RemoteAudioSink {
    platform: Arc<dyn AudioOutputPlatform>,
    interactions: Arc<dyn UserInteraction>,
    events: Option<SinkEventSender>,
    handles: HashMap<String, RemoteAudioHandle>,
    /// Ids for play attempts and resume triggers
    next_task: u64,
}

impl RemoteAudioSink {
    pub fn new(platform: Arc<dyn AudioOutputPlatform>, interactions: Arc<dyn UserInteraction>) -> Self {
        Self {
            platform,
            interactions,
            events: None,
            handles: HashMap::new(),
            next_task: 0,
        }
    }

    /// Route playback signals, play results and resume triggers of the coming
    /// session to `tx`.
    pub fn bind(&mut self, tx: SinkEventSender) {
        self.events = Some(tx);
    }

    /// Attach an output for `track` and start the first play attempt.
    pub fn subscribe(&mut self, participant: &str, track: RemoteTrack) -> AttachOutcome {
        if track.kind != TrackKind::Audio {
            debug!("Ignoring {} track {} from {}", track.kind, track.sid, participant);
            return AttachOutcome::NotAudio(track.kind);
        }

        let Some(tx) = self.events.clone() else {
            warn!("Audio track {} arrived with no active session", track.sid);
            return AttachOutcome::AttachFailed("no active session".to_string());
        };

        if let Some(mut stale) = self.handles.remove(&track.sid) {
            warn!("Track {} subscribed again, replacing its output", track.sid);
            stale.release();
        }

        let notifier = PlaybackNotifier {
            track_sid: track.sid.clone(),
            tx,
        };
        let output = match self.platform.attach(&track, notifier) {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to attach audio track {}: {}", track.sid, e);
                return AttachOutcome::AttachFailed(e.to_string());
            }
        };

        let sid = track.sid.clone();
        self.handles.insert(
            sid.clone(),
            RemoteAudioHandle {
                participant: participant.to_string(),
                track,
                output,
                is_attached: true,
                is_playing: false,
                play: None,
                resume: None,
                retries: 0,
            },
        );
        info!("Audio output attached for track {}", sid);

        self.start_play(&sid, false);
        AttachOutcome::Attached
    }

    /// Retry playback after the resume trigger `trigger` fired.
    ///
    /// Returns false when the trigger is stale (the handle is gone or has
    /// since been re-armed); otherwise a retry is under way.
    pub fn resume(&mut self, track_sid: &str, trigger: u64) -> bool {
        let Some(handle) = self.handles.get_mut(track_sid) else {
            return false;
        };
        match &handle.resume {
            Some(pending) if pending.id == trigger => {}
            _ => {
                debug!("Ignoring stale resume trigger {} for {}", trigger, track_sid);
                return false;
            }
        }
        // One-shot: the trigger is consumed whatever the result
        handle.resume = None;
        handle.retries += 1;

        self.start_play(track_sid, true);
        true
    }

    /// Apply the result of play attempt `attempt`. Results of attempts that
    /// were cancelled or superseded return `None`.
    pub fn on_play_attempted(
        &mut self,
        track_sid: &str,
        attempt: u64,
        result: std::result::Result<(), String>,
    ) -> Option<PlayOutcome> {
        let handle = self.handles.get_mut(track_sid)?;
        let retry = match &handle.play {
            Some(play) if play.id == attempt => play.retry,
            _ => {
                debug!("Ignoring stale play result {} for {}", attempt, track_sid);
                return None;
            }
        };
        handle.play = None;

        match result {
            Ok(()) => {
                handle.is_playing = true;
                handle.cancel_resume();
                if retry {
                    info!("Audio enabled after user interaction on {}", track_sid);
                    Some(PlayOutcome::Resumed)
                } else {
                    info!("Audio playing for track {}", track_sid);
                    Some(PlayOutcome::Playing)
                }
            }
            Err(reason) => {
                self.arm_resume(track_sid);
                if retry {
                    warn!("Still cannot play {}: {}", track_sid, reason);
                    Some(PlayOutcome::StillBlocked(reason))
                } else {
                    warn!("Autoplay blocked for track {}: {}", track_sid, reason);
                    Some(PlayOutcome::Blocked(reason))
                }
            }
        }
    }

    pub fn on_playback(&mut self, track_sid: &str, signal: &PlaybackSignal) {
        let Some(handle) = self.handles.get_mut(track_sid) else {
            return;
        };
        match signal {
            PlaybackSignal::Started => {
                handle.is_playing = true;
                handle.cancel_resume();
            }
            PlaybackSignal::Paused | PlaybackSignal::Ended => handle.is_playing = false,
            PlaybackSignal::Failed(reason) => {
                warn!("Audio error on {}: {}", track_sid, reason);
                handle.is_playing = false;
            }
        }
    }

    /// Drop the output of an unsubscribed track. Returns whether it was known.
    pub fn unsubscribe(&mut self, track_sid: &str) -> bool {
        match self.handles.remove(track_sid) {
            Some(mut handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Detach every output and forget the session channel.
    pub fn clear(&mut self) {
        for (_, mut handle) in self.handles.drain() {
            handle.release();
        }
        self.events = None;
    }

    /// The "agent is speaking" signal
    pub fn is_speaking(&self) -> bool {
        self.handles.values().any(|h| h.is_playing)
    }

    pub fn handle(&self, track_sid: &str) -> Option<&RemoteAudioHandle> {
        self.handles.get(track_sid)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn task_id(&mut self) -> u64 {
        self.next_task += 1;
        self.next_task
    }

    fn start_play(&mut self, track_sid: &str, retry: bool) {
        let Some(tx) = self.events.clone() else {
            return;
        };
        let id = self.task_id();
        let Some(handle) = self.handles.get_mut(track_sid) else {
            return;
        };
        handle.cancel_play();

        let output = Arc::clone(&handle.output);
        let sid = track_sid.to_string();
        let task = tokio::spawn(async move {
            let result = output.play().await.map_err(|e| e.to_string());
            let _ = tx.send(SinkEvent::PlayAttempted {
                track_sid: sid,
                attempt: id,
                result,
            });
        });

        handle.play = Some(PendingPlay {
            id,
            retry,
            task: task.abort_handle(),
        });
    }

    fn arm_resume(&mut self, track_sid: &str) {
        let Some(tx) = self.events.clone() else {
            return;
        };
        let id = self.task_id();
        let Some(handle) = self.handles.get_mut(track_sid) else {
            return;
        };
        handle.cancel_resume();

        let sid = track_sid.to_string();
        let interaction = self.interactions.next_interaction();
        let task = tokio::spawn(async move {
            interaction.await;
            let _ = tx.send(SinkEvent::ResumeRequested { track_sid: sid, trigger: id });
        });

        handle.resume = Some(ResumeTrigger {
            id,
            task: task.abort_handle(),
        });
        info!("Waiting for user interaction to enable audio on {}", track_sid);
    }
}

impl Drop for RemoteAudioSink {
    fn drop(&mut self) {
        self.clear();
    }
}
