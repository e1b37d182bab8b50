//! Per-user broadcast bus with bounded replay.
//!
//! Each user gets an ordered channel: a ring buffer holding the most recent
//! events for late subscribers, plus a lossy broadcast for live delivery.
//! Publishing never blocks; a subscriber that falls more than
//! `PENDING_LIMIT` events behind is dropped rather than slowing the run.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{EventRecord, WorkflowEvent};

/// Maximum events queued per live subscriber before it is dropped.
const PENDING_LIMIT: usize = 128;

struct UserChannel {
    seq: u64,
    ring: VecDeque<EventRecord>,
    tx: broadcast::Sender<EventRecord>,
}

impl UserChannel {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(PENDING_LIMIT);
        Self {
            seq: 0,
            ring: VecDeque::new(),
            tx,
        }
    }
}

/// Process-wide event bus, keyed by user id. A channel lives from run start
/// until the post-terminal grace elapses.
pub struct EventBus {
    replay_window: usize,
    channels: Mutex<HashMap<String, UserChannel>>,
}

impl EventBus {
    pub fn new(replay_window: usize) -> Self {
        Self {
            replay_window: replay_window.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a fresh channel for the user, discarding any previous run's
    /// history. Sequence numbering restarts at 1.
    pub fn reset(&self, user_id: &str) {
        let mut channels = self.channels.lock().expect("event bus lock poisoned");
        channels.insert(user_id.to_string(), UserChannel::new());
    }

    /// Assigns the next sequence number, stamps the timestamp, stores the
    /// event in the replay ring, and fans it out to live subscribers.
    /// O(1) and non-blocking.
    pub fn publish(&self, user_id: &str, event: WorkflowEvent) -> u64 {
        let mut channels = self.channels.lock().expect("event bus lock poisoned");
        let channel = channels
            .entry(user_id.to_string())
            .or_insert_with(UserChannel::new);

        channel.seq += 1;
        let record = EventRecord {
            seq: channel.seq,
            ts: chrono::Utc::now(),
            event,
        };

        channel.ring.push_back(record.clone());
        while channel.ring.len() > self.replay_window {
            channel.ring.pop_front();
        }

        // Err means no live subscribers, which is fine: the ring keeps the
        // replay for anyone who attaches later.
        let _ = channel.tx.send(record);
        channel.seq
    }

    /// Atomically snapshots the replay ring and attaches a live receiver, so
    /// the combined stream has no gaps and no duplicates.
    pub fn subscribe(&self, user_id: &str) -> Option<Subscription> {
        let channels = self.channels.lock().expect("event bus lock poisoned");
        let channel = channels.get(user_id)?;
        debug!(
            user_id,
            replayed = channel.ring.len(),
            "event bus subscription attached"
        );
        Some(Subscription {
            user_id: user_id.to_string(),
            replay: channel.ring.iter().cloned().collect(),
            live: channel.tx.subscribe(),
            done: false,
        })
    }

    /// Removes the user's channel. Called by the engine after the
    /// post-terminal grace period.
    pub fn remove(&self, user_id: &str) {
        let mut channels = self.channels.lock().expect("event bus lock poisoned");
        channels.remove(user_id);
    }
}

/// A single consumer's view of a run: buffered replay followed by live
/// events, ending after the terminal event.
pub struct Subscription {
    user_id: String,
    replay: VecDeque<EventRecord>,
    live: broadcast::Receiver<EventRecord>,
    done: bool,
}

impl Subscription {
    /// Yields the next event, or `None` once the run's terminal event has
    /// been delivered, the channel is gone, or this subscriber lagged past
    /// the pending limit.
    pub async fn next(&mut self) -> Option<EventRecord> {
        if self.done {
            return None;
        }
        if let Some(record) = self.replay.pop_front() {
            self.done = record.event.is_terminal();
            return Some(record);
        }
        match self.live.recv().await {
            Ok(record) => {
                self.done = record.event.is_terminal();
                Some(record)
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    user_id = %self.user_id,
                    skipped,
                    "dropping slow event subscriber"
                );
                self.done = true;
                None
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.done = true;
                None
            }
        }
    }
}
