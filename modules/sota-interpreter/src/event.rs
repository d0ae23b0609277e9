//! The EventInterpreter: observed events in, follow-up commands out.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::CommandHandle;
use crate::error::InterpretError;
use crate::interpreter;
use crate::registry::Subscription;
use crate::traits::{CommandLike, EventLike, EventRules, Interpreter};

struct Derive<R, E, C> {
    rules: R,
    recover: bool,
    _phantom: PhantomData<fn() -> (E, C)>,
}

#[async_trait]
impl<R, E, C> Interpreter<E, C> for Derive<R, E, C>
where
    R: EventRules<E, C>,
    E: EventLike,
    C: CommandLike,
{
    async fn interpret(&mut self, event: E) -> Result<Vec<C>, InterpretError> {
        match self.rules.derive(&event).await {
            Ok(commands) => {
                if !commands.is_empty() {
                    debug!(
                        event = event.event_type(),
                        commands = commands.len(),
                        "Derived follow-up commands"
                    );
                }
                Ok(commands)
            }
            Err(e) if self.recover => {
                warn!(
                    event = event.event_type(),
                    error = %format!("{e:#}"),
                    "Event rules failed, skipping"
                );
                Ok(vec![])
            }
            Err(e) => Err(InterpretError::Fatal(format!(
                "event rules failed on {}: {e:#}",
                event.event_type()
            ))),
        }
    }
}

/// Subscribes to the broadcast stream and feeds derived commands to a
/// CommandInterpreter, in the order the rules produced them.
///
/// Rule errors end the loop unless recovery is enabled. The loop also ends
/// when the dispatcher stops (its subscription closes).
pub struct EventInterpreter<E, C, R> {
    subscription: Subscription<E>,
    commands: CommandHandle<C>,
    derive: Derive<R, E, C>,
}

impl<E, C, R> EventInterpreter<E, C, R>
where
    E: EventLike,
    C: CommandLike,
    R: EventRules<E, C> + 'static,
{
    pub fn new(rules: R, subscription: Subscription<E>, commands: CommandHandle<C>) -> Self {
        Self {
            subscription,
            commands,
            derive: Derive {
                rules,
                recover: false,
                _phantom: PhantomData,
            },
        }
    }

    /// Log and skip rule errors instead of stopping.
    pub fn with_recovery(mut self, recover: bool) -> Self {
        self.derive.recover = recover;
        self
    }

    pub async fn run(mut self) -> Result<(), InterpretError> {
        let subscriber = self.subscription.id();
        info!(subscriber = %subscriber, "EventInterpreter started");
        let result =
            interpreter::run(&mut self.derive, &mut self.subscription, &mut self.commands).await;
        info!(subscriber = %subscriber, ok = result.is_ok(), "EventInterpreter stopped");
        result
    }

    pub fn spawn(self) -> JoinHandle<Result<(), InterpretError>> {
        tokio::spawn(self.run())
    }
}
