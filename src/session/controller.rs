use super::state::{CallSnapshot, CallStatus, SessionState};
use crate::audio::{
    AttachOutcome, AudioOutputPlatform, CaptureOptions, LocalAudioPublisher, Microphone,
    PlayOutcome, PlaybackSignal, RemoteAudioSink, SinkEvent, SinkEventReceiver, UserInteraction,
};
use crate::config::Config;
use crate::error::{CallError, Result};
use crate::signaling::CredentialExchange;
use crate::transcript::{self, Speaker};
use crate::transport::{EventReceiver, RoomConnector, RoomOptions, TransportEvent, TransportSession};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// The external pieces a call is made of
pub struct Collaborators {
    pub exchange: Arc<dyn CredentialExchange>,
    pub connector: Arc<dyn RoomConnector>,
    pub microphone: Arc<dyn Microphone>,
    pub output: Arc<dyn AudioOutputPlatform>,
    pub interactions: Arc<dyn UserInteraction>,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub capture: CaptureOptions,
    pub room: RoomOptions,
    /// Activity log entries kept for display
    pub log_history: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            room: RoomOptions::default(),
            log_history: 11,
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capture: config.capture,
            room: RoomOptions::default(),
            log_history: config.session.log_history,
        }
    }
}

/// Longest slice of a non-transcript payload shown in the activity log
const DATA_PREVIEW_CHARS: usize = 120;

/// Everything the event pump feeds into the controller, in arrival order
enum CallEvent {
    Transport(TransportEvent),
    Sink(SinkEvent),
}

/// Drives a single voice call: idle -> connecting -> connected -> idle,
/// with error as the landing state for failed starts.
///
/// Cheap to clone; clones share the same call.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    exchange: Arc<dyn CredentialExchange>,
    transport: TransportSession,
    publisher: LocalAudioPublisher,
    sink: Mutex<RemoteAudioSink>,
    status: Mutex<CallStatus>,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of `start()`; a second start is refused until the
    /// first has settled, even if `stop()` already returned the call to idle
    starting: Mutex<()>,
}

impl SessionController {
    pub fn new(collaborators: Collaborators, options: ControllerOptions) -> Self {
        let Collaborators {
            exchange,
            connector,
            microphone,
            output,
            interactions,
        } = collaborators;

        Self {
            inner: Arc::new(Inner {
                exchange,
                transport: TransportSession::new(connector, options.room),
                publisher: LocalAudioPublisher::new(microphone, options.capture),
                sink: Mutex::new(RemoteAudioSink::new(output, interactions)),
                status: Mutex::new(CallStatus::new(options.log_history)),
                pump: Mutex::new(None),
                starting: Mutex::new(()),
            }),
        }
    }

    /// Place a call.
    ///
    /// Legal only from idle. On failure everything acquired so far is released
    /// before the error is returned, and the call lands in the error state.
    /// A start overtaken by [`stop`](Self::stop) returns
    /// [`CallError::Cancelled`] and leaves the call idle.
    pub async fn start(&self) -> Result<()> {
        let _starting = self.inner.starting.try_lock().map_err(|_| CallError::Busy)?;

        let (epoch, call_id, continuation) = {
            let mut status = self.inner.status.lock().await;
            let current = status.state;
            let Some((epoch, call_id)) = status.begin_attempt() else {
                return Err(CallError::InvalidState {
                    action: "start",
                    state: current,
                });
            };
            (epoch, call_id, status.continuation_id.clone())
        };

        let span = info_span!("call", call_id = %call_id);
        match self
            .inner
            .establish(epoch, continuation)
            .instrument(span.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.inner.fail(epoch, e).instrument(span).await),
        }
    }

    /// Hang up. Always ends idle; safe to call in any state and repeatedly.
    pub async fn stop(&self) {
        let previous = {
            let mut status = self.inner.status.lock().await;
            let previous = status.state;
            status.end_attempt(SessionState::Idle);
            if previous != SessionState::Idle {
                status.log.push("Stopping call...");
            }
            previous
        };

        if previous != SessionState::Idle {
            info!("Stopping call (was {})", previous);
        }
        self.inner.release(true).await;
    }

    pub async fn state(&self) -> SessionState {
        self.inner.status.lock().await.state
    }

    /// The "agent is speaking" signal
    pub async fn is_speaking(&self) -> bool {
        self.inner.sink.lock().await.is_speaking()
    }

    pub async fn continuation_id(&self) -> Option<String> {
        self.inner.status.lock().await.continuation_id.clone()
    }

    pub async fn snapshot(&self) -> CallSnapshot {
        let mut snapshot = {
            let status = self.inner.status.lock().await;
            CallSnapshot {
                call_id: status.call_id,
                state: status.state,
                is_listening: false,
                is_speaking: false,
                last_transcript: status.last_transcript.clone(),
                continuation_id: status.continuation_id.clone(),
                last_error: status.last_error.clone(),
                discarded_payloads: status.discarded_payloads,
                logs: status.log.entries().cloned().collect(),
            }
        };

        snapshot.is_listening =
            snapshot.state == SessionState::Connected && self.inner.publisher.is_active().await;
        snapshot.is_speaking = self.inner.sink.lock().await.is_speaking();
        snapshot
    }
}

impl Inner {
    /// Credential exchange -> join -> publish microphone -> connected.
    async fn establish(self: &Arc<Self>, epoch: u64, continuation: Option<String>) -> Result<()> {
        self.note("Requesting connection from server...").await;
        let credentials = self.exchange.request_session(continuation.as_deref()).await?;

        {
            let mut status = self.status.lock().await;
            if !status.is_current(epoch) {
                return Err(abort_reason(&status));
            }
            status.continuation_id = credentials.continuation_id.clone();
            status.log.push(format!("Got room: {}", credentials.room_name));
        }

        self.note("Connecting to room...").await;
        let events = self.transport.connect(&credentials).await?;
        self.ensure_current(epoch).await?;

        self.note("Connected to room!").await;
        if let Some(room) = self.transport.room().await {
            for identity in room.remote_participants() {
                self.note(format!("Remote participant: {}", identity)).await;
            }
        }

        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        self.sink.lock().await.bind(sink_tx);
        let pump = tokio::spawn(
            Arc::clone(self)
                .pump(epoch, events, sink_rx)
                .instrument(Span::current()),
        );
        if let Some(stale) = self.pump.lock().await.replace(pump) {
            stale.abort();
        }

        self.note("Creating microphone track...").await;
        self.publisher.publish(&self.transport).await?;

        let mut status = self.status.lock().await;
        if !status.is_current(epoch) {
            return Err(abort_reason(&status));
        }
        status.transition(SessionState::Connected);
        status.log.push("Microphone published - start speaking!");
        info!("Call connected");

        Ok(())
    }

    /// Settle a failed start. Teardown always runs before the error is handed back.
    async fn fail(&self, epoch: u64, err: CallError) -> CallError {
        let overtaken = {
            let mut status = self.status.lock().await;
            if status.is_current(epoch) {
                let message = err.user_message();
                status.end_attempt(SessionState::Error);
                status.log.push(format!("ERROR: {}", message));
                status.last_error = Some(message);
                None
            } else {
                Some(abort_reason(&status))
            }
        };

        self.release(true).await;

        match overtaken {
            None => {
                error!("Call failed: {}", err);
                err
            }
            Some(reason) => {
                info!("Start overtaken ({}); discarding: {}", reason, err);
                reason
            }
        }
    }

    async fn ensure_current(&self, epoch: u64) -> Result<()> {
        let status = self.status.lock().await;
        if status.is_current(epoch) {
            Ok(())
        } else {
            Err(abort_reason(&status))
        }
    }

    /// Release every call resource that is held. Each step checks for the
    /// resource first, so this is safe to repeat and safe on partial starts.
    async fn release(&self, abort_pump: bool) {
        let pump = self.pump.lock().await.take();
        if let Some(pump) = pump {
            if abort_pump {
                pump.abort();
            }
        }

        if self.publisher.stop().await {
            self.note("Microphone released").await;
        }

        self.sink.lock().await.clear();

        if self.transport.disconnect().await {
            self.note("Left room").await;
        }
    }

    async fn pump(
        self: Arc<Self>,
        epoch: u64,
        mut events: EventReceiver,
        mut sink_events: SinkEventReceiver,
    ) {
        debug!("Event pump started");

        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => CallEvent::Transport(event),
                    None => CallEvent::Transport(TransportEvent::Disconnected {
                        reason: Some("event stream closed".to_string()),
                    }),
                },
                Some(event) = sink_events.recv() => CallEvent::Sink(event),
            };

            if !self.status.lock().await.is_current(epoch) {
                break;
            }
            if !self.dispatch(epoch, event).await {
                break;
            }
        }

        debug!("Event pump stopped");
    }

    /// Returns false once the session is over.
    async fn dispatch(&self, epoch: u64, event: CallEvent) -> bool {
        match event {
            CallEvent::Transport(event) => return self.on_transport_event(epoch, event).await,
            CallEvent::Sink(SinkEvent::Playback { track_sid, signal }) => {
                self.sink.lock().await.on_playback(&track_sid, &signal);
                match signal {
                    PlaybackSignal::Started => self.note("Audio started playing").await,
                    PlaybackSignal::Ended => self.note("Audio finished").await,
                    PlaybackSignal::Failed(reason) => {
                        self.note(format!("Audio error: {}", reason)).await
                    }
                    PlaybackSignal::Paused => {}
                }
            }
            CallEvent::Sink(SinkEvent::ResumeRequested { track_sid, trigger }) => {
                if self.sink.lock().await.resume(&track_sid, trigger) {
                    debug!("Retrying playback of {} after user interaction", track_sid);
                }
            }
            CallEvent::Sink(SinkEvent::PlayAttempted {
                track_sid,
                attempt,
                result,
            }) => {
                let outcome = self
                    .sink
                    .lock()
                    .await
                    .on_play_attempted(&track_sid, attempt, result);
                match outcome {
                    Some(PlayOutcome::Playing) => self.note("Audio playing").await,
                    Some(PlayOutcome::Blocked(reason)) => {
                        self.note(format!("Autoplay blocked: {}", reason)).await;
                        self.note("Click anywhere to enable audio").await;
                    }
                    Some(PlayOutcome::Resumed) => {
                        self.note("Audio enabled after user interaction").await
                    }
                    Some(PlayOutcome::StillBlocked(reason)) => {
                        self.note(format!("Still can't play audio: {}", reason)).await
                    }
                    None => {}
                }
            }
        }
        true
    }

    async fn on_transport_event(&self, epoch: u64, event: TransportEvent) -> bool {
        match event {
            TransportEvent::ParticipantJoined { identity } => {
                self.note(format!("Participant joined: {}", identity)).await;
            }
            TransportEvent::TrackPublished { participant, track } => {
                self.note(format!(
                    "Track published by {}: {} ({})",
                    participant, track.kind, track.source
                ))
                .await;
            }
            TransportEvent::TrackSubscribed { participant, track } => {
                self.note(format!("Track subscribed: {} from {}", track.kind, participant))
                    .await;
                let outcome = self.sink.lock().await.subscribe(&participant, track);
                match outcome {
                    AttachOutcome::Attached => {}
                    AttachOutcome::AttachFailed(reason) => {
                        self.note(format!("Failed to attach audio: {}", reason)).await
                    }
                    AttachOutcome::NotAudio(_) => {}
                }
            }
            TransportEvent::TrackUnsubscribed { participant, track } => {
                self.note(format!("Track unsubscribed: {} from {}", track.kind, participant))
                    .await;
                self.sink.lock().await.unsubscribe(&track.sid);
            }
            TransportEvent::DataReceived { payload, .. } => self.on_data(&payload).await,
            TransportEvent::ConnectionQualityChanged {
                participant,
                quality,
            } => {
                self.note(format!("Quality: {} for {}", quality, participant)).await;
            }
            TransportEvent::Disconnected { reason } => {
                self.on_remote_disconnect(epoch, reason).await;
                return false;
            }
        }
        true
    }

    async fn on_data(&self, payload: &[u8]) {
        let mut status = self.status.lock().await;
        match transcript::decode(payload) {
            Some(event) => {
                let who = match event.speaker {
                    Speaker::Agent => "Agent",
                    Speaker::User => "You",
                };
                info!("{} ({}): {}", who, event.language, event.text);
                status.log.push(format!("{}: {}", who, event.text));
                status.last_transcript = Some(event);
            }
            None => {
                status.discarded_payloads += 1;
                let text = String::from_utf8_lossy(payload);
                let preview: String = text.chars().take(DATA_PREVIEW_CHARS).collect();
                debug!("Discarded side-channel payload ({} bytes)", payload.len());
                status.log.push(format!("Data: {}", preview));
            }
        }
    }

    /// The room went away without us asking. Same teardown as `stop()`; a call
    /// that never finished connecting counts as a failed start.
    async fn on_remote_disconnect(&self, epoch: u64, reason: Option<String>) {
        let reason = reason.unwrap_or_else(|| "unknown".to_string());
        {
            let mut status = self.status.lock().await;
            if !status.is_current(epoch) {
                return;
            }
            status.log.push(format!("Disconnected: {}", reason));
            if status.state == SessionState::Connecting {
                let message = format!("Room disconnected before the call was established: {}", reason);
                status.end_attempt(SessionState::Error);
                status.last_error = Some(message);
            } else {
                status.end_attempt(SessionState::Idle);
            }
        }

        warn!("Room disconnected: {}", reason);
        self.release(false).await;
    }

    async fn note(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.status.lock().await.log.push(message);
    }
}

fn abort_reason(status: &CallStatus) -> CallError {
    match (&status.state, &status.last_error) {
        (SessionState::Error, Some(message)) => CallError::Transport(message.clone()),
        _ => CallError::Cancelled,
    }
}
