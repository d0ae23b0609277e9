//! The CommandInterpreter: fire-and-forget command submission.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::envelope::Interpret;
use crate::error::InterpretError;
use crate::global::GlobalHandle;
use crate::in_flight::InFlight;
use crate::interpreter;
use crate::traits::{CommandLike, EventLike, Interpreter, Outlet};

/// Cloneable input side of a CommandInterpreter.
///
/// Commands sent through a handle from `CommandInterpreter::new` count as
/// in-flight work until the dispatcher has executed them.
pub struct CommandHandle<C> {
    tx: mpsc::Sender<C>,
    in_flight: Option<InFlight>,
}

impl<C> Clone for CommandHandle<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<C: CommandLike> CommandHandle<C> {
    /// An untracked handle paired with a bare receiver, for wiring a custom
    /// consumer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<C>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, in_flight: None }, rx)
    }

    /// Queue a command, waiting for room if the input is full.
    pub async fn send(&self, command: C) -> Result<(), InterpretError> {
        let ticket = self.in_flight.as_ref().map(InFlight::ticket);
        self.tx
            .send(command)
            .await
            .map_err(|_| InterpretError::Shutdown)?;
        if let Some(ticket) = ticket {
            ticket.hand_off();
        }
        Ok(())
    }
}

#[async_trait]
impl<C: CommandLike> Outlet<C> for CommandHandle<C> {
    async fn forward(&mut self, command: C) -> Result<(), InterpretError> {
        self.send(command).await
    }
}

/// Wraps a bare command in an envelope with no reply channel. The envelope
/// carries the command's in-flight unit to the dispatcher.
struct Wrap<C, E> {
    in_flight: InFlight,
    _phantom: PhantomData<fn() -> (C, E)>,
}

#[async_trait]
impl<C: CommandLike, E: EventLike> Interpreter<C, Interpret<C, E>> for Wrap<C, E> {
    async fn interpret(&mut self, command: C) -> Result<Vec<Interpret<C, E>>, InterpretError> {
        debug!(command = command.command_type(), "Wrapping command");
        Ok(vec![Interpret::new(command).with_ticket(self.in_flight.adopt())])
    }
}

/// Forwards every command it receives to the GlobalInterpreter.
///
/// Stops once every `CommandHandle` is dropped and the input is drained, or
/// with `Shutdown` if the dispatcher is gone.
pub struct CommandInterpreter<C, E> {
    inbox: mpsc::Receiver<C>,
    global: GlobalHandle<C, E>,
}

impl<C: CommandLike, E: EventLike> CommandInterpreter<C, E> {
    pub fn new(global: GlobalHandle<C, E>, capacity: usize) -> (Self, CommandHandle<C>) {
        let (tx, inbox) = mpsc::channel(capacity.max(1));
        let handle = CommandHandle {
            tx,
            in_flight: Some(global.in_flight().clone()),
        };
        (Self { inbox, global }, handle)
    }

    pub async fn run(mut self) -> Result<(), InterpretError> {
        info!("CommandInterpreter started");
        let in_flight = self.global.in_flight().clone();
        let mut wrap: Wrap<C, E> = Wrap {
            in_flight: in_flight.clone(),
            _phantom: PhantomData,
        };
        let result = interpreter::run(&mut wrap, &mut self.inbox, &mut self.global).await;

        // Whatever is still buffered will never reach the dispatcher.
        self.inbox.close();
        let mut abandoned = 0usize;
        while self.inbox.try_recv().is_ok() {
            drop(in_flight.adopt());
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!(abandoned, "CommandInterpreter stopped with undelivered commands");
        }

        info!(ok = result.is_ok(), "CommandInterpreter stopped");
        result
    }

    pub fn spawn(self) -> JoinHandle<Result<(), InterpretError>> {
        tokio::spawn(self.run())
    }
}
