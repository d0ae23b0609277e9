//! The `Interpret` envelope: one command plus an optional reply channel.

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::in_flight::Ticket;

/// A command on its way to the `GlobalInterpreter`.
///
/// If a reply channel is attached, it receives the terminal event of the
/// dispatch exactly once. The envelope is consumed by the dispatch, so it can
/// never be dispatched twice.
#[derive(Debug)]
pub struct Interpret<C, E> {
    id: Uuid,
    command: C,
    reply: Option<oneshot::Sender<E>>,
    ticket: Option<Ticket>,
}

impl<C, E> Interpret<C, E> {
    /// Fire-and-forget envelope.
    pub fn new(command: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
            reply: None,
            ticket: None,
        }
    }

    /// Envelope with a reply channel; await the receiver for the terminal event.
    pub fn with_reply(command: C) -> (Self, oneshot::Receiver<E>) {
        let (tx, rx) = oneshot::channel();
        let envelope = Self {
            id: Uuid::new_v4(),
            command,
            reply: Some(tx),
            ticket: None,
        };
        (envelope, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Keep the loop's in-flight count up until this envelope is dispatched.
    pub(crate) fn with_ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub(crate) fn into_parts(self) -> Parts<C, E> {
        Parts {
            id: self.id,
            command: self.command,
            reply: self.reply,
            ticket: self.ticket,
        }
    }
}

pub(crate) struct Parts<C, E> {
    pub id: Uuid,
    pub command: C,
    pub reply: Option<oneshot::Sender<E>>,
    pub ticket: Option<Ticket>,
}
