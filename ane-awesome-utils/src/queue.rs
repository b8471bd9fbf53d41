//! Per-session inbox of received binary frames.
//!
//! Producers are transport callback threads; the single consumer is the host
//! thread polling through `awesome_utils_poll_next_message`. Nothing here ever
//! blocks waiting for a frame.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Deserialize;

/// What a bounded inbox does when a frame arrives while it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the incoming frame.
    RejectNew,
}

/// Result of an `enqueue` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// Accepted after evicting the head frame.
    DroppedOldest,
    /// The incoming frame was discarded.
    Rejected,
}

#[derive(Debug, Default)]
pub struct MessageQueue {
    frames: Mutex<VecDeque<Vec<u8>>>,
    limit: Option<usize>,
    policy: OverflowPolicy,
}

impl MessageQueue {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue holding at most `limit` frames. A limit of zero is treated as unbounded.
    pub fn bounded(limit: usize, policy: OverflowPolicy) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            limit: (limit > 0).then_some(limit),
            policy,
        }
    }

    pub fn enqueue(&self, frame: Vec<u8>) -> Enqueued {
        let mut frames = self.frames.lock();
        match self.limit {
            Some(limit) if frames.len() >= limit => match self.policy {
                OverflowPolicy::DropOldest => {
                    frames.pop_front();
                    frames.push_back(frame);
                    Enqueued::DroppedOldest
                }
                OverflowPolicy::RejectNew => Enqueued::Rejected,
            },
            _ => {
                frames.push_back(frame);
                Enqueued::Accepted
            }
        }
    }

    pub fn dequeue(&self) -> Option<Vec<u8>> {
        self.frames.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Drop every queued frame, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut frames = self.frames.lock();
        let n = frames.len();
        frames.clear();
        n
    }
}
