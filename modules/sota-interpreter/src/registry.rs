//! Subscription registry: the broadcast fan-out list.
//!
//! Owned by the GlobalInterpreter's run loop. Subscribers never touch it
//! directly; they send Subscribe / Unsubscribe requests through the
//! submission queue and the dispatcher applies them in order.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::InterpretError;
use crate::in_flight::{InFlight, Ticket};
use crate::traits::{EventLike, Inlet, Outlet};

/// Identifies one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// The receiving side of a subscription.
///
/// Dropping it unregisters the subscriber lazily: the next broadcast that
/// finds the inbox closed removes it.
///
/// A tracked subscription counts each event as in-flight work from the moment
/// it is buffered until the consumer asks for the next one.
#[derive(Debug)]
pub struct Subscription<E> {
    id: SubscriberId,
    inbox: mpsc::Receiver<E>,
    in_flight: Option<InFlight>,
    current: Option<Ticket>,
}

impl<E> Subscription<E> {
    pub(crate) fn new(
        id: SubscriberId,
        inbox: mpsc::Receiver<E>,
        in_flight: Option<InFlight>,
    ) -> Self {
        Self {
            id,
            inbox,
            in_flight,
            current: None,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_tracked(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Wait for the next event. `None` once the dispatcher has stopped and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<E> {
        self.current = None;
        let event = self.inbox.recv().await?;
        self.current = self.in_flight.as_ref().map(InFlight::adopt);
        Some(event)
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.current = None;
        let event = self.inbox.try_recv().ok()?;
        self.current = self.in_flight.as_ref().map(InFlight::adopt);
        Some(event)
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        // Buffered events will never be interpreted; give their units back.
        if let Some(in_flight) = &self.in_flight {
            self.inbox.close();
            while self.inbox.try_recv().is_ok() {
                drop(in_flight.adopt());
            }
        }
    }
}

#[async_trait]
impl<E: Send> Inlet<E> for Subscription<E> {
    async fn next(&mut self) -> Option<E> {
        self.recv().await
    }
}

/// What the dispatcher asks the registry to do, applied in order.
#[derive(Debug)]
pub(crate) enum Delivery<E> {
    /// Send to every registered subscriber.
    Broadcast(E),
    /// Send the terminal event to the envelope's reply channel.
    Reply(oneshot::Sender<E>, E),
    Subscribe {
        inbox: mpsc::Sender<E>,
        ack: oneshot::Sender<SubscriberId>,
        tracked: bool,
    },
    Unsubscribe(SubscriberId),
    /// The dispatched envelope's work is done.
    Settle(Ticket),
}

struct Subscriber<E> {
    id: SubscriberId,
    inbox: mpsc::Sender<E>,
    tracked: bool,
    dropped: u64,
}

pub(crate) struct Registry<E> {
    subscribers: Vec<Subscriber<E>>,
    next_id: u64,
    in_flight: InFlight,
}

impl<E: EventLike> Registry<E> {
    pub(crate) fn new(in_flight: InFlight) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
            in_flight,
        }
    }

    pub(crate) fn subscribe(&mut self, inbox: mpsc::Sender<E>, tracked: bool) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            inbox,
            tracked,
            dropped: 0,
        });
        debug!(
            subscriber = %id,
            tracked,
            total = self.subscribers.len(),
            "Subscriber registered"
        );
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        let removed = self.subscribers.len() < before;
        if removed {
            debug!(subscriber = %id, "Subscriber unregistered");
        }
        removed
    }

    /// Non-blocking fan-out. A full inbox loses this event; a closed inbox
    /// loses its registration. Returns how many subscribers got the event.
    pub(crate) fn broadcast(&mut self, event: &E) -> usize {
        let mut delivered = 0;
        let in_flight = &self.in_flight;
        self.subscribers.retain_mut(|sub| {
            // Taken before the send so the consumer can never release it first.
            let ticket = sub.tracked.then(|| in_flight.ticket());
            match sub.inbox.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    if let Some(ticket) = ticket {
                        ticket.hand_off();
                    }
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.dropped += 1;
                    warn!(
                        subscriber = %sub.id,
                        event = event.event_type(),
                        dropped_total = sub.dropped,
                        "Subscriber inbox full, dropping event"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = %sub.id, "Subscriber gone, removing");
                    false
                }
            }
        });
        delivered
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}

#[async_trait]
impl<E: EventLike> Outlet<Delivery<E>> for Registry<E> {
    async fn forward(&mut self, delivery: Delivery<E>) -> Result<(), InterpretError> {
        match delivery {
            Delivery::Broadcast(event) => {
                self.broadcast(&event);
            }
            Delivery::Reply(reply, event) => {
                if reply.send(event).is_err() {
                    debug!("Reply receiver dropped before the terminal event arrived");
                }
            }
            Delivery::Subscribe {
                inbox,
                ack,
                tracked,
            } => {
                let id = self.subscribe(inbox, tracked);
                if ack.send(id).is_err() {
                    // Requester went away; its inbox is gone too.
                    self.unsubscribe(id);
                }
            }
            Delivery::Unsubscribe(id) => {
                self.unsubscribe(id);
            }
            Delivery::Settle(ticket) => drop(ticket),
        }
        Ok(())
    }
}
