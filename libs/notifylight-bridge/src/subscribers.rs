//! Subscriber fan-out with replay for late listeners
//!
//! Events published while no subscriber is attached are held in a bounded
//! buffer and flushed, in order, to the first subscriber that attaches. Once a
//! subscriber is attached, later subscribers only see future events.

use chrono::Utc;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::{BridgeEvent, EventEnvelope};

pub type EventSender = mpsc::UnboundedSender<EventEnvelope>;

pub struct SubscriberRegistry {
    subscribers: Vec<EventSender>,
    pending: VecDeque<EventEnvelope>,
    capacity: usize,
    next_sequence: u64,
    dropped: u64,
}

impl SubscriberRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            pending: VecDeque::new(),
            capacity,
            next_sequence: 1,
            dropped: 0,
        }
    }

    /// Attach a subscriber, replaying buffered events first
    pub fn attach(&mut self, sender: EventSender) {
        self.prune();

        if !self.pending.is_empty() {
            debug!("Replaying {} buffered events to new subscriber", self.pending.len());
        }
        while let Some(envelope) = self.pending.pop_front() {
            if let Err(mpsc::error::SendError(envelope)) = sender.send(envelope) {
                // Receiver already gone; keep the event for the next subscriber
                self.pending.push_front(envelope);
                return;
            }
        }

        self.subscribers.push(sender);
    }

    /// Deliver an event to every live subscriber, or buffer it
    pub fn publish(&mut self, event: BridgeEvent) -> u64 {
        let envelope = EventEnvelope {
            sequence: self.next_sequence,
            emitted_at: Utc::now(),
            event,
        };
        self.next_sequence += 1;
        let sequence = envelope.sequence;

        self.subscribers
            .retain(|subscriber| subscriber.send(envelope.clone()).is_ok());

        if self.subscribers.is_empty() {
            self.buffer(envelope);
        }

        sequence
    }

    fn buffer(&mut self, envelope: EventEnvelope) {
        if self.capacity == 0 {
            self.dropped += 1;
            warn!(
                "No subscriber attached, dropping {} event #{}",
                envelope.kind().event_name(),
                envelope.sequence
            );
            return;
        }

        if self.pending.len() >= self.capacity {
            if let Some(oldest) = self.pending.pop_front() {
                self.dropped += 1;
                warn!(
                    "Replay buffer full ({}), dropping oldest {} event #{}",
                    self.capacity,
                    oldest.kind().event_name(),
                    oldest.sequence
                );
            }
        }
        self.pending.push_back(envelope);
    }

    fn prune(&mut self) {
        self.subscribers.retain(|subscriber| !subscriber.is_closed());
    }

    pub fn subscriber_count(&mut self) -> usize {
        self.prune();
        self.subscribers.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Close every subscriber channel
    pub fn close(&mut self) {
        self.subscribers.clear();
        self.pending.clear();
    }
}

/// Receiving end handed to the host
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl EventSubscription {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<EventEnvelope>) -> Self {
        Self { receiver }
    }

    /// Next event; `None` once the bridge has shut down
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.try_recv().ok()
    }

    /// Everything currently queued
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.receiver.try_recv() {
            events.push(envelope);
        }
        events
    }

    pub fn into_stream(self) -> impl Stream<Item = EventEnvelope> {
        stream::unfold(self.receiver, |mut receiver| async move {
            receiver.recv().await.map(|envelope| (envelope, receiver))
        })
    }
}
