use crate::transcript::TranscriptEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of the single active call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Error,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// Staying `Idle` is allowed so that stopping an idle call is a no-op.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Idle)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Error)
                | (Connecting, Idle)
                | (Connected, Idle)
                | (Error, Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A single activity log line
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Bounded, most-recent-last activity log shown to the user
#[derive(Debug, Clone)]
pub struct ActivityLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only view of the call for the UI layer
#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub call_id: Option<Uuid>,
    pub state: SessionState,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub last_transcript: Option<TranscriptEvent>,
    pub continuation_id: Option<String>,
    pub last_error: Option<String>,
    /// Side-channel payloads that were not transcripts
    pub discarded_payloads: u64,
    pub logs: Vec<LogEntry>,
}

/// Mutable call status, guarded by the controller
#[derive(Debug)]
pub(crate) struct CallStatus {
    pub state: SessionState,
    /// Bumped whenever an attempt starts or is torn down; in-flight steps
    /// compare against it to notice they were overtaken
    pub epoch: u64,
    pub call_id: Option<Uuid>,
    pub continuation_id: Option<String>,
    pub last_error: Option<String>,
    pub last_transcript: Option<TranscriptEvent>,
    pub discarded_payloads: u64,
    pub log: ActivityLog,
}

impl CallStatus {
    pub fn new(log_history: usize) -> Self {
        Self {
            state: SessionState::Idle,
            epoch: 0,
            call_id: None,
            continuation_id: None,
            last_error: None,
            last_transcript: None,
            discarded_payloads: 0,
            log: ActivityLog::new(log_history),
        }
    }

    /// Apply a transition, refusing illegal ones.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Enter `Connecting` for a fresh attempt. Returns the attempt's epoch.
    pub fn begin_attempt(&mut self) -> Option<(u64, Uuid)> {
        if self.state != SessionState::Idle || !self.transition(SessionState::Connecting) {
            return None;
        }
        self.epoch += 1;
        let call_id = Uuid::new_v4();
        self.call_id = Some(call_id);
        self.last_error = None;
        self.last_transcript = None;
        self.discarded_payloads = 0;
        self.log.clear();
        Some((self.epoch, call_id))
    }

    /// End whatever attempt is current and land in `next` (Idle or Error).
    pub fn end_attempt(&mut self, next: SessionState) {
        self.epoch += 1;
        if !self.transition(next) {
            self.state = SessionState::Idle;
        }
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }
}
