//! Event hub: monotonic-id broadcast of session and run lifecycle frames.
//!
//! The hub sits between everything that mutates session state and the SSE
//! handlers. Publishers never block; a slow subscriber lags its broadcast
//! receiver and resynchronizes via the replay ring using `Last-Event-ID`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Size of the broadcast channel for frames.
const FRAME_BUFFER_SIZE: usize = 256;

/// How many frames are kept for `Last-Event-ID` replay.
const REPLAY_BUFFER_SIZE: usize = 256;

/// Kind of a stream frame; becomes the SSE `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Init,
    Event,
    SessionCreated,
    SessionUpdated,
    SessionDeleted,
    RunFailed,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Init => "init",
            FrameKind::Event => "event",
            FrameKind::SessionCreated => "session_created",
            FrameKind::SessionUpdated => "session_updated",
            FrameKind::SessionDeleted => "session_deleted",
            FrameKind::RunFailed => "run_failed",
        }
    }
}

/// One broadcast frame.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    /// Monotonic over the life of the process; the SSE `id` field.
    pub id: u64,
    pub kind: FrameKind,
    /// Session the frame concerns; used for stream filtering.
    pub session_id: Option<String>,
    /// Creator tag of that session; used for stream filtering.
    pub created_by: Option<String>,
    pub data: Value,
}

/// Hub shared by all publishers and SSE subscribers.
pub struct EventHub {
    next_id: AtomicU64,
    tx: broadcast::Sender<StreamFrame>,
    replay: Mutex<VecDeque<StreamFrame>>,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FRAME_BUFFER_SIZE);
        Self {
            next_id: AtomicU64::new(1),
            tx,
            replay: Mutex::new(VecDeque::with_capacity(REPLAY_BUFFER_SIZE)),
        }
    }

    /// Publish a frame to all subscribers. Returns the assigned frame id.
    pub fn publish(
        &self,
        kind: FrameKind,
        session_id: Option<&str>,
        created_by: Option<&str>,
        data: Value,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = StreamFrame {
            id,
            kind,
            session_id: session_id.map(str::to_string),
            created_by: created_by.map(str::to_string),
            data,
        };

        {
            let mut replay = self.replay.lock().unwrap_or_else(|e| e.into_inner());
            if replay.len() == REPLAY_BUFFER_SIZE {
                replay.pop_front();
            }
            replay.push_back(frame.clone());
        }

        // Send fails only when no subscriber is connected.
        if self.tx.send(frame).is_err() {
            debug!("no stream subscribers for {} frame", kind.as_str());
        }
        id
    }

    /// Subscribe to live frames.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamFrame> {
        self.tx.subscribe()
    }

    /// Id of the most recently published frame (0 when none yet).
    pub fn last_id(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }

    /// Frames newer than `last_id` still held in the replay ring.
    pub fn replay_after(&self, last_id: u64) -> Vec<StreamFrame> {
        let replay = self.replay.lock().unwrap_or_else(|e| e.into_inner());
        replay.iter().filter(|f| f.id > last_id).cloned().collect()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_carry_monotonic_ids() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.publish(FrameKind::SessionCreated, Some("ses_a"), None, json!({}));
        hub.publish(FrameKind::Event, Some("ses_a"), None, json!({"n": 1}));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(first.kind, FrameKind::SessionCreated);
    }

    #[test]
    fn replay_returns_only_newer_frames() {
        let hub = EventHub::new();
        let a = hub.publish(FrameKind::Event, Some("ses_a"), None, json!({}));
        let b = hub.publish(FrameKind::Event, Some("ses_a"), None, json!({}));

        let frames = hub.replay_after(a);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, b);

        assert!(hub.replay_after(b).is_empty());
    }

    #[test]
    fn replay_ring_is_bounded() {
        let hub = EventHub::new();
        for _ in 0..(REPLAY_BUFFER_SIZE + 10) {
            hub.publish(FrameKind::Event, None, None, json!({}));
        }
        let frames = hub.replay_after(0);
        assert_eq!(frames.len(), REPLAY_BUFFER_SIZE);
    }
}
