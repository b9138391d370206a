//! Outstanding-request table for one device.
//!
//! Sequence numbers cycle through 1..=127 (0 is left to fire-and-forget
//! sends, which never expect a reply). A number that is still outstanding
//! is never handed out again, and every entry carries a generation so that
//! a late cancel cannot remove a newer request that reused the number.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::ProtocolError;
use crate::protocol::{Message, MessageKind};

const MAX_SEQUENCE: u8 = 127;

/// Handle on a registered request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub sequence: u8,
    generation: u64,
}

/// Outcome of matching an inbound message against the table.
#[derive(Debug)]
pub enum Correlation {
    /// Sequence, kind and source all matched; the waiting caller was released.
    Accepted,
    /// No request is outstanding under this sequence number.
    Unsolicited,
    /// Sequence matched but kind or source id did not; the entry stays pending.
    Mismatch(ProtocolError),
}

struct Pending {
    expected: MessageKind,
    generation: u64,
    completion: oneshot::Sender<Message>,
}

#[derive(Default)]
struct TrackerState {
    last_sequence: u8,
    next_generation: u64,
    pending: HashMap<u8, Pending>,
}

/// Maps sequence numbers to pending requests.
pub struct RequestTracker {
    source_id: u32,
    state: Mutex<TrackerState>,
}

impl RequestTracker {
    pub fn new(source_id: u32) -> Self {
        Self {
            source_id,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next free sequence number and register a request
    /// expecting `expected` under it.
    ///
    /// Returns `None` when every sequence number is outstanding.
    pub fn register(&self, expected: MessageKind) -> Option<(Ticket, oneshot::Receiver<Message>)> {
        let mut state = self.lock();

        let mut candidate = state.last_sequence;
        let sequence = (0..MAX_SEQUENCE).find_map(|_| {
            candidate = candidate % MAX_SEQUENCE + 1;
            (!state.pending.contains_key(&candidate)).then_some(candidate)
        })?;

        let generation = state.next_generation;
        state.next_generation += 1;
        state.last_sequence = sequence;

        let (completion, receiver) = oneshot::channel();
        state.pending.insert(
            sequence,
            Pending {
                expected,
                generation,
                completion,
            },
        );

        Some((
            Ticket {
                sequence,
                generation,
            },
            receiver,
        ))
    }

    /// Match an inbound message against the outstanding requests.
    pub fn resolve(&self, reply: Message) -> Correlation {
        let mut state = self.lock();

        let Some(pending) = state.pending.get(&reply.sequence) else {
            return Correlation::Unsolicited;
        };

        if pending.expected != reply.kind() {
            return Correlation::Mismatch(ProtocolError::Mismatch {
                sequence: reply.sequence,
                reason: format!("expected {:?}, got {:?}", pending.expected, reply.kind()),
            });
        }

        if reply.source != self.source_id {
            return Correlation::Mismatch(ProtocolError::Mismatch {
                sequence: reply.sequence,
                reason: format!(
                    "source id {:#010x} is not ours ({:#010x})",
                    reply.source, self.source_id
                ),
            });
        }

        if let Some(pending) = state.pending.remove(&reply.sequence) {
            // The caller may have given up already; nothing to release then.
            let _ = pending.completion.send(reply);
        }
        Correlation::Accepted
    }

    /// Remove the request identified by `ticket`, if it is still the one
    /// registered under its sequence number.
    pub fn cancel(&self, ticket: Ticket) -> bool {
        let mut state = self.lock();
        match state.pending.get(&ticket.sequence) {
            Some(pending) if pending.generation == ticket.generation => {
                state.pending.remove(&ticket.sequence);
                true
            }
            _ => false,
        }
    }

    /// Drop every outstanding request. Waiting callers observe a closed
    /// channel. Returns how many were abandoned.
    pub fn abandon_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.pending.len();
        state.pending.clear();
        count
    }

    pub fn is_outstanding(&self, sequence: u8) -> bool {
        self.lock().pending.contains_key(&sequence)
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
