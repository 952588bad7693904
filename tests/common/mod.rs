// In-memory stand-ins for the collaborators a call depends on.
//
// Each fake records what was done to it so tests can check that devices and
// rooms are released on every path.

#![allow(dead_code)]

use convai_call::audio::{
    AudioOutputPlatform, CaptureOptions, CaptureStream, LocalAudioTrack, Microphone,
    PlayableOutput, PlaybackNotifier, UserInteraction,
};
use convai_call::error::{CallError, Result};
use convai_call::signaling::{CredentialExchange, SessionCredentials};
use convai_call::transport::{
    EventReceiver, EventSender, PublishOptions, RemoteTrack, Room, RoomConnector, RoomOptions,
    TransportEvent,
};
use convai_call::{Collaborators, ControllerOptions, SessionController};
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

// ============================================================================
// Credential exchange
// ============================================================================

pub struct FakeExchange {
    pub requests: Mutex<Vec<Option<String>>>,
    reject: Mutex<Option<(u16, String)>>,
    next_continuation: Mutex<Option<String>>,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            reject: Mutex::new(None),
            next_continuation: Mutex::new(Some("char-session-1".to_string())),
        }
    }

    pub fn reject_next(&self, status: u16, message: &str) {
        *self.reject.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn continue_with(&self, continuation: Option<&str>) {
        *self.next_continuation.lock().unwrap() = continuation.map(str::to_string);
    }

    pub fn requests(&self) -> Vec<Option<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CredentialExchange for FakeExchange {
    async fn request_session(&self, continuation_id: Option<&str>) -> Result<SessionCredentials> {
        self.requests
            .lock()
            .unwrap()
            .push(continuation_id.map(str::to_string));

        if let Some((status, message)) = self.reject.lock().unwrap().take() {
            return Err(CallError::ConnectionRejected { status, message });
        }

        Ok(SessionCredentials {
            room_address: "wss://rooms.test".to_string(),
            room_name: "room-1".to_string(),
            access_token: "token-1".to_string(),
            session_id: "session-1".to_string(),
            continuation_id: self.next_continuation.lock().unwrap().clone(),
        })
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct FakeRoom {
    pub published: Mutex<Vec<String>>,
    pub disconnects: AtomicUsize,
    pub remote_participants: Vec<String>,
    fail_publish: bool,
}

#[async_trait::async_trait]
impl Room for FakeRoom {
    fn name(&self) -> &str {
        "room-1"
    }

    fn remote_participants(&self) -> Vec<String> {
        self.remote_participants.clone()
    }

    async fn publish_audio(&self, track: &LocalAudioTrack, options: PublishOptions) -> Result<()> {
        assert!(!options.dtx, "microphone must be published without DTX");
        if self.fail_publish {
            return Err(CallError::Transport("publish refused".to_string()));
        }
        self.published.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Parks a fake call until the test lets it through
struct Gate {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

pub struct FakeConnector {
    pub rooms: Mutex<Vec<Arc<FakeRoom>>>,
    pub options: Mutex<Vec<RoomOptions>>,
    senders: Mutex<Vec<EventSender>>,
    gate: Mutex<Option<Gate>>,
    pub fail_join: AtomicBool,
    pub fail_publish: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            fail_join: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
        }
    }

    /// Make the next `connect` wait. Returns (connect entered, release it).
    pub fn hold_next_connect(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        hold(&self.gate)
    }

    /// Close the event stream of every joined room, as a transport whose
    /// connection died without a disconnect event would.
    pub fn close_events(&self) {
        self.senders.lock().unwrap().clear();
    }

    /// Deliver an event on the most recent room's event stream
    pub fn emit(&self, event: TransportEvent) {
        let senders = self.senders.lock().unwrap();
        senders
            .last()
            .expect("no room was joined")
            .send(event)
            .expect("event pump is gone");
    }

    pub fn joins(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    /// Rooms joined and not yet left
    pub fn open_rooms(&self) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.disconnects.load(Ordering::SeqCst) == 0)
            .count()
    }

    pub fn last_room(&self) -> Arc<FakeRoom> {
        self.rooms.lock().unwrap().last().cloned().expect("no room was joined")
    }
}

#[async_trait::async_trait]
impl RoomConnector for FakeConnector {
    async fn connect(
        &self,
        address: &str,
        token: &str,
        options: RoomOptions,
    ) -> Result<(Arc<dyn Room>, EventReceiver)> {
        assert_eq!(address, "wss://rooms.test");
        assert_eq!(token, "token-1");

        pass_gate(&self.gate).await;

        if self.fail_join.load(Ordering::SeqCst) {
            return Err(CallError::Transport("room handshake failed".to_string()));
        }

        let room = Arc::new(FakeRoom {
            published: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            remote_participants: vec!["agent-1".to_string()],
            fail_publish: self.fail_publish.load(Ordering::SeqCst),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        self.options.lock().unwrap().push(options);
        self.rooms.lock().unwrap().push(Arc::clone(&room));
        self.senders.lock().unwrap().push(tx);

        let room: Arc<dyn Room> = room;
        Ok((room, rx))
    }
}

fn hold(slot: &Mutex<Option<Gate>>) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    *slot.lock().unwrap() = Some(Gate {
        entered: entered_tx,
        release: release_rx,
    });
    (entered_rx, release_tx)
}

async fn pass_gate(slot: &Mutex<Option<Gate>>) {
    let gate = slot.lock().unwrap().take();
    if let Some(gate) = gate {
        let _ = gate.entered.send(());
        let _ = gate.release.await;
    }
}

// ============================================================================
// Microphone
// ============================================================================

struct FakeCaptureStream {
    stops: Arc<AtomicUsize>,
}

impl CaptureStream for FakeCaptureStream {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeMicrophone {
    pub acquires: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    pub options: Mutex<Vec<CaptureOptions>>,
    pub deny: AtomicBool,
    gate: Mutex<Option<Gate>>,
}

impl FakeMicrophone {
    pub fn new() -> Self {
        Self {
            acquires: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            options: Mutex::new(Vec::new()),
            deny: AtomicBool::new(false),
            gate: Mutex::new(None),
        }
    }

    /// Make the next `acquire` wait, as a pending permission prompt does.
    /// Returns (acquire entered, release it).
    pub fn hold_next_acquire(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        hold(&self.gate)
    }

    /// Devices acquired and not yet released
    pub fn held(&self) -> usize {
        self.acquires.load(Ordering::SeqCst) - self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Microphone for FakeMicrophone {
    async fn acquire(&self, options: &CaptureOptions) -> Result<LocalAudioTrack> {
        pass_gate(&self.gate).await;

        if self.deny.load(Ordering::SeqCst) {
            return Err(CallError::MediaAcquisition("Permission denied".to_string()));
        }
        self.options.lock().unwrap().push(*options);
        let n = self.acquires.fetch_add(1, Ordering::SeqCst);
        let stream = Arc::new(FakeCaptureStream {
            stops: Arc::clone(&self.stops),
        });
        Ok(LocalAudioTrack::new(format!("mic-{}", n), *options, stream))
    }

    fn name(&self) -> &str {
        "fake-mic"
    }
}

// ============================================================================
// Audio output
// ============================================================================

/// What happened to one playable output
pub struct OutputRecord {
    pub plays: AtomicUsize,
    pub pauses: AtomicUsize,
    pub detached: AtomicBool,
    pub notifier: PlaybackNotifier,
    script: Mutex<VecDeque<bool>>,
    hang: bool,
}

struct FakeOutput {
    record: Arc<OutputRecord>,
}

#[async_trait::async_trait]
impl PlayableOutput for FakeOutput {
    async fn play(&self) -> Result<()> {
        self.record.plays.fetch_add(1, Ordering::SeqCst);
        if self.record.hang {
            futures::future::pending::<()>().await;
        }
        let allowed = self.record.script.lock().unwrap().pop_front().unwrap_or(true);
        if allowed {
            Ok(())
        } else {
            Err(CallError::PlaybackBlocked(
                "play() failed because the user didn't interact with the document first".to_string(),
            ))
        }
    }

    fn pause(&self) {
        self.record.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn detach(&self) {
        self.record.detached.store(true, Ordering::SeqCst);
    }
}

pub struct FakeOutputPlatform {
    records: Mutex<HashMap<String, Arc<OutputRecord>>>,
    scripts: Mutex<HashMap<String, Vec<bool>>>,
    pub fail_attach: AtomicBool,
    /// Outputs attached from now on never settle `play()`
    pub hang_play: AtomicBool,
}

impl FakeOutputPlatform {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            fail_attach: AtomicBool::new(false),
            hang_play: AtomicBool::new(false),
        }
    }

    /// `play()` calls on `track_sid` so far; zero before it is attached
    pub fn plays(&self, track_sid: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .get(track_sid)
            .map_or(0, |p| p.plays.load(Ordering::SeqCst))
    }

    /// Results of successive `play()` calls for `track_sid`; `true` plays.
    /// Calls past the end of the script succeed.
    pub fn script(&self, track_sid: &str, results: &[bool]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(track_sid.to_string(), results.to_vec());
    }

    pub fn record(&self, track_sid: &str) -> Arc<OutputRecord> {
        self.records
            .lock()
            .unwrap()
            .get(track_sid)
            .cloned()
            .expect("track was never attached")
    }
}

impl AudioOutputPlatform for FakeOutputPlatform {
    fn attach(&self, track: &RemoteTrack, notifier: PlaybackNotifier) -> Result<Arc<dyn PlayableOutput>> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(CallError::PlaybackBlocked("no output device".to_string()));
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&track.sid)
            .unwrap_or_default();
        let record = Arc::new(OutputRecord {
            plays: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            detached: AtomicBool::new(false),
            notifier,
            script: Mutex::new(script.into()),
            hang: self.hang_play.load(Ordering::SeqCst),
        });
        self.records
            .lock()
            .unwrap()
            .insert(track.sid.clone(), Arc::clone(&record));
        let output: Arc<dyn PlayableOutput> = Arc::new(FakeOutput { record });
        Ok(output)
    }
}

// ============================================================================
// User interaction
// ============================================================================

pub struct FakeInteractions {
    clicks: broadcast::Sender<()>,
    pub registrations: AtomicUsize,
}

impl FakeInteractions {
    pub fn new() -> Self {
        let (clicks, _) = broadcast::channel(16);
        Self {
            clicks,
            registrations: AtomicUsize::new(0),
        }
    }

    /// Simulate the user clicking somewhere on the page
    pub fn click(&self) {
        let _ = self.clicks.send(());
    }

    /// Registrations still waiting for a click
    pub fn waiting(&self) -> usize {
        self.clicks.receiver_count()
    }
}

impl UserInteraction for FakeInteractions {
    fn next_interaction(&self) -> BoxFuture<'static, ()> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.clicks.subscribe();
        Box::pin(async move {
            let _ = rx.recv().await;
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub controller: SessionController,
    pub exchange: Arc<FakeExchange>,
    pub connector: Arc<FakeConnector>,
    pub microphone: Arc<FakeMicrophone>,
    pub output: Arc<FakeOutputPlatform>,
    pub interactions: Arc<FakeInteractions>,
}

impl Harness {
    pub fn new() -> Self {
        let exchange = Arc::new(FakeExchange::new());
        let connector = Arc::new(FakeConnector::new());
        let microphone = Arc::new(FakeMicrophone::new());
        let output = Arc::new(FakeOutputPlatform::new());
        let interactions = Arc::new(FakeInteractions::new());

        let controller = SessionController::new(
            Collaborators {
                exchange: exchange.clone(),
                connector: connector.clone(),
                microphone: microphone.clone(),
                output: output.clone(),
                interactions: interactions.clone(),
            },
            ControllerOptions::default(),
        );

        Self {
            controller,
            exchange,
            connector,
            microphone,
            output,
            interactions,
        }
    }
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}
