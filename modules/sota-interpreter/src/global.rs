//! The GlobalInterpreter: the single dispatcher that executes commands.
//!
//! Receive envelope → execute → broadcast every event → reply with the last.
//! One envelope is handled completely before the next is dequeued, so every
//! subscriber observes events in submission order.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{EngineConfig, SubmitPolicy};
use crate::envelope::{Interpret, Parts};
use crate::error::{ExecuteError, InterpretError};
use crate::in_flight::InFlight;
use crate::interpreter;
use crate::registry::{Delivery, Registry, SubscriberId, Subscription};
use crate::traits::{CommandLike, EventLike, Executor, Inlet, Interpreter, Outlet};

/// Messages on the submission queue. Everything goes through the same FIFO so
/// registry changes are ordered relative to dispatches.
#[derive(Debug)]
pub(crate) enum Control<C, E> {
    Interpret(Interpret<C, E>),
    Subscribe {
        inbox: mpsc::Sender<E>,
        ack: oneshot::Sender<SubscriberId>,
        tracked: bool,
    },
    Unsubscribe(SubscriberId),
    Close,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable submission side of a GlobalInterpreter.
pub struct GlobalHandle<C, E> {
    tx: mpsc::Sender<Control<C, E>>,
    subscriber_capacity: usize,
    policy: SubmitPolicy,
    in_flight: InFlight,
}

impl<C, E> Clone for GlobalHandle<C, E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscriber_capacity: self.subscriber_capacity,
            policy: self.policy,
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<C: CommandLike, E: EventLike> GlobalHandle<C, E> {
    /// Enqueue an envelope. Under `SubmitPolicy::Block` this waits for room;
    /// under `Reject` a full queue fails with `QueueFull`.
    pub async fn submit(&self, envelope: Interpret<C, E>) -> Result<(), InterpretError> {
        match self.policy {
            SubmitPolicy::Block => self.submit_blocking(envelope).await,
            SubmitPolicy::Reject => self.try_submit(envelope),
        }
    }

    /// Enqueue without waiting, whatever the configured policy.
    pub fn try_submit(&self, envelope: Interpret<C, E>) -> Result<(), InterpretError> {
        self.tx
            .try_send(Control::Interpret(envelope))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => InterpretError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => InterpretError::Shutdown,
            })
    }

    async fn submit_blocking(&self, envelope: Interpret<C, E>) -> Result<(), InterpretError> {
        self.tx
            .send(Control::Interpret(envelope))
            .await
            .map_err(|_| InterpretError::Shutdown)
    }

    /// Submit `command` with a reply channel and wait for its terminal event.
    pub async fn interpret(&self, command: C) -> Result<E, InterpretError> {
        let (envelope, reply) = Interpret::with_reply(command);
        self.submit(envelope).await?;
        reply.await.map_err(|_| InterpretError::Shutdown)
    }

    /// Register a subscriber with the configured buffer size.
    pub async fn subscribe(&self) -> Result<Subscription<E>, InterpretError> {
        self.subscribe_with_capacity(self.subscriber_capacity).await
    }

    /// Register a subscriber with its own buffer size. Events arriving while
    /// the buffer is full are dropped for this subscriber only.
    pub async fn subscribe_with_capacity(
        &self,
        capacity: usize,
    ) -> Result<Subscription<E>, InterpretError> {
        self.register(capacity, false).await
    }

    /// Register a subscriber whose events count as in-flight work until it
    /// has interpreted them. Used by EventInterpreters so that `wait_idle`
    /// covers the follow-up commands they derive.
    pub async fn subscribe_tracked(&self) -> Result<Subscription<E>, InterpretError> {
        self.register(self.subscriber_capacity, true).await
    }

    async fn register(
        &self,
        capacity: usize,
        tracked: bool,
    ) -> Result<Subscription<E>, InterpretError> {
        let (inbox, rx) = mpsc::channel(capacity.max(1));
        let (ack, acked) = oneshot::channel();
        self.tx
            .send(Control::Subscribe {
                inbox,
                ack,
                tracked,
            })
            .await
            .map_err(|_| InterpretError::Shutdown)?;
        let id = acked.await.map_err(|_| InterpretError::Shutdown)?;
        let in_flight = tracked.then(|| self.in_flight.clone());
        Ok(Subscription::new(id, rx, in_flight))
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<(), InterpretError> {
        self.tx
            .send(Control::Unsubscribe(id))
            .await
            .map_err(|_| InterpretError::Shutdown)
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Resolve once no command is queued in a CommandInterpreter or waiting
    /// for dispatch, and no tracked subscriber holds an uninterpreted event.
    /// Rules that keep deriving commands forever never reach this point.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await
    }

    /// Close the submission queue. Already-queued work is drained, then the
    /// dispatcher exits and every subscription ends.
    pub async fn close(&self) {
        if self.tx.send(Control::Close).await.is_err() {
            debug!("Dispatcher already stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Internal forwarding (CommandInterpreter → dispatcher) always waits for room.
#[async_trait]
impl<C: CommandLike, E: EventLike> Outlet<Interpret<C, E>> for GlobalHandle<C, E> {
    async fn forward(&mut self, envelope: Interpret<C, E>) -> Result<(), InterpretError> {
        self.submit_blocking(envelope).await
    }
}

// ---------------------------------------------------------------------------
// Submission queue
// ---------------------------------------------------------------------------

struct ControlInlet<C, E> {
    rx: mpsc::Receiver<Control<C, E>>,
}

#[async_trait]
impl<C: CommandLike, E: EventLike> Inlet<Control<C, E>> for ControlInlet<C, E> {
    async fn next(&mut self) -> Option<Control<C, E>> {
        loop {
            match self.rx.recv().await? {
                Control::Close => {
                    // Refuse new sends; keep draining what is buffered.
                    info!("Submission queue closed, draining");
                    self.rx.close();
                }
                other => return Some(other),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Dispatcher<C, E, S, X> {
    executor: X,
    state: S,
    dispatched: u64,
    _phantom: PhantomData<fn() -> (C, E)>,
}

impl<C, E, S, X> Dispatcher<C, E, S, X>
where
    C: CommandLike,
    E: EventLike,
    S: Send,
    X: Executor<C, E, S>,
{
    async fn dispatch(
        &mut self,
        envelope: Interpret<C, E>,
    ) -> Result<Vec<Delivery<E>>, InterpretError> {
        let Parts {
            id,
            command,
            reply,
            ticket,
        } = envelope.into_parts();
        let span = info_span!("dispatch", envelope = %id, command = command.command_type());

        async move {
            let mut events = match self.executor.execute(&command, &mut self.state).await {
                Ok(events) => events,
                Err(ExecuteError::Domain(e)) => {
                    warn!(error = %format!("{e:#}"), "Command failed");
                    vec![self.executor.failed(&command, format!("{e:#}"))]
                }
                Err(ExecuteError::Fatal(reason)) => {
                    error!(reason = reason.as_str(), "Dispatcher state is unrecoverable");
                    return Err(InterpretError::Fatal(reason));
                }
            };

            if events.is_empty() {
                warn!("Executor produced no events");
                events.push(
                    self.executor
                        .failed(&command, "command produced no events".to_string()),
                );
            }

            self.dispatched += 1;
            let terminal = events[events.len() - 1].clone();
            debug!(
                events = events.len(),
                terminal = terminal.event_type(),
                "Command dispatched"
            );

            let mut deliveries: Vec<Delivery<E>> =
                events.into_iter().map(Delivery::Broadcast).collect();
            if let Some(reply) = reply {
                deliveries.push(Delivery::Reply(reply, terminal));
            }
            if let Some(ticket) = ticket {
                deliveries.push(Delivery::Settle(ticket));
            }
            Ok(deliveries)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl<C, E, S, X> Interpreter<Control<C, E>, Delivery<E>> for Dispatcher<C, E, S, X>
where
    C: CommandLike,
    E: EventLike,
    S: Send,
    X: Executor<C, E, S>,
{
    async fn interpret(
        &mut self,
        control: Control<C, E>,
    ) -> Result<Vec<Delivery<E>>, InterpretError> {
        match control {
            Control::Interpret(envelope) => self.dispatch(envelope).await,
            Control::Subscribe {
                inbox,
                ack,
                tracked,
            } => Ok(vec![Delivery::Subscribe {
                inbox,
                ack,
                tracked,
            }]),
            Control::Unsubscribe(id) => Ok(vec![Delivery::Unsubscribe(id)]),
            // Consumed by ControlInlet; nothing to do if one slips through.
            Control::Close => Ok(vec![]),
        }
    }
}

// ---------------------------------------------------------------------------
// GlobalInterpreter
// ---------------------------------------------------------------------------

/// Owns the executor, the domain state and the subscription registry for the
/// lifetime of its run loop.
pub struct GlobalInterpreter<C, E, S, X> {
    dispatcher: Dispatcher<C, E, S, X>,
    inlet: ControlInlet<C, E>,
    registry: Registry<E>,
}

impl<C, E, S, X> GlobalInterpreter<C, E, S, X>
where
    C: CommandLike,
    E: EventLike,
    S: Send + 'static,
    X: Executor<C, E, S> + 'static,
{
    pub fn new(executor: X, state: S, config: &EngineConfig) -> (Self, GlobalHandle<C, E>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let in_flight = InFlight::new();
        let interpreter = Self {
            dispatcher: Dispatcher {
                executor,
                state,
                dispatched: 0,
                _phantom: PhantomData,
            },
            inlet: ControlInlet { rx },
            registry: Registry::new(in_flight.clone()),
        };
        let handle = GlobalHandle {
            tx,
            subscriber_capacity: config.subscriber_capacity,
            policy: config.submit_policy,
            in_flight,
        };
        (interpreter, handle)
    }

    /// Run until the queue is closed (returning the final state) or a fatal
    /// error stops the loop. Either way every subscription ends afterwards, and
    /// after a fatal error every queued envelope's reply channel is dropped.
    pub async fn run(mut self) -> Result<S, InterpretError> {
        info!("GlobalInterpreter started");
        let result =
            interpreter::run(&mut self.dispatcher, &mut self.inlet, &mut self.registry).await;

        match result {
            Ok(()) => {
                info!(
                    dispatched = self.dispatcher.dispatched,
                    subscribers = self.registry.len(),
                    "GlobalInterpreter stopped"
                );
                Ok(self.dispatcher.state)
            }
            Err(e) => {
                error!(
                    error = %e,
                    dispatched = self.dispatcher.dispatched,
                    "GlobalInterpreter terminated"
                );
                Err(e)
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<S, InterpretError>> {
        tokio::spawn(self.run())
    }
}
