use std::collections::VecDeque;

use crate::ws::{OverflowPolicy, SocketConfig};

/// FIFO of inbound binary messages, optionally bounded by count and/or bytes.
#[derive(Debug, Default)]
pub struct InboundQueue {
    messages: VecDeque<Vec<u8>>,
    bytes: usize,
    max_messages: Option<usize>,
    max_bytes: Option<usize>,
    overflow: OverflowPolicy,
    dropped: u64,
}

/// Result of [`InboundQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting this many older messages.
    QueuedAfterEvicting(usize),
    /// The incoming message was discarded.
    Rejected,
}

impl InboundQueue {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SocketConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            max_bytes: config.max_bytes,
            overflow: config.overflow,
            ..Self::default()
        }
    }

    /// Append a message to the tail, applying the overflow policy if bounded.
    pub fn push(&mut self, message: Vec<u8>) -> PushOutcome {
        // A message larger than the whole byte budget can never fit.
        if self.max_bytes.is_some_and(|max| message.len() > max) {
            self.dropped += 1;
            return PushOutcome::Rejected;
        }

        let mut evicted = 0;
        while !self.fits(message.len()) {
            match self.overflow {
                OverflowPolicy::DropNewest => {
                    self.dropped += 1;
                    return PushOutcome::Rejected;
                }
                OverflowPolicy::DropOldest => {
                    if self.pop().is_none() {
                        break;
                    }
                    evicted += 1;
                    self.dropped += 1;
                }
            }
        }

        self.bytes += message.len();
        self.messages.push_back(message);

        if evicted == 0 {
            PushOutcome::Queued
        } else {
            PushOutcome::QueuedAfterEvicting(evicted)
        }
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        let message = self.messages.pop_front()?;
        self.bytes -= message.len();
        Some(message)
    }

    pub fn peek_len(&self) -> Option<usize> {
        self.messages.front().map(Vec::len)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total payload bytes currently queued.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Messages discarded by the overflow policy over the queue's lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn fits(&self, incoming: usize) -> bool {
        let count_ok = self
            .max_messages
            .is_none_or(|max| self.messages.len() < max);
        let bytes_ok = self
            .max_bytes
            .is_none_or(|max| self.bytes + incoming <= max);
        count_ok && bytes_ok
    }
}
