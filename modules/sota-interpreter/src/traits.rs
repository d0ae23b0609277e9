//! Core traits for the interpreter loops.

use async_trait::async_trait;

use crate::error::{ExecuteError, InterpretError};

/// Commands carry a type string used in logs and failure events.
pub trait CommandLike: std::fmt::Debug + Clone + Send + Sync + 'static {
    /// The snake_case command type, e.g. `install_package`.
    fn command_type(&self) -> &'static str;
}

/// Events carry a type string used in logs and by observers.
pub trait EventLike: std::fmt::Debug + Clone + Send + Sync + 'static {
    /// The snake_case event type, e.g. `install_completed`.
    fn event_type(&self) -> &'static str;
}

/// Turns one input into zero or more outputs.
///
/// May perform I/O but must terminate. Errors are not caught by `run`: an
/// `Err` ends the loop that drives this interpreter.
#[async_trait]
pub trait Interpreter<I: Send + 'static, O: Send + 'static>: Send {
    async fn interpret(&mut self, input: I) -> Result<Vec<O>, InterpretError>;
}

/// Where an interpreter loop pulls its input from. `None` means closed for good.
#[async_trait]
pub trait Inlet<I: Send>: Send {
    async fn next(&mut self) -> Option<I>;
}

/// Where an interpreter loop forwards its output to.
#[async_trait]
pub trait Outlet<O: Send>: Send {
    async fn forward(&mut self, output: O) -> Result<(), InterpretError>;
}

/// Executes a command against the dispatcher-owned state.
///
/// Must return every event the command produced, in order; the last one is the
/// terminal outcome. Business failures are `ExecuteError::Domain` and are turned
/// into the event built by `failed`. `ExecuteError::Fatal` stops the dispatcher.
#[async_trait]
pub trait Executor<C: CommandLike, E: EventLike, S: Send>: Send + Sync {
    async fn execute(&self, command: &C, state: &mut S) -> Result<Vec<E>, ExecuteError>;

    /// Build the failure event reported when `command` could not be executed.
    fn failed(&self, command: &C, reason: String) -> E;
}

/// Reacts to an observed event with follow-up commands.
#[async_trait]
pub trait EventRules<E: EventLike, C: CommandLike>: Send + Sync {
    async fn derive(&self, event: &E) -> anyhow::Result<Vec<C>>;
}
