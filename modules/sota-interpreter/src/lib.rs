//! Command/event interpretation engine.
//!
//! A handful of cooperating loops: commands are wrapped in `Interpret`
//! envelopes, executed by the `GlobalInterpreter`, and the resulting events
//! are broadcast to every subscriber. `EventInterpreter`s turn observed events
//! back into commands, which re-enter through a `CommandInterpreter`.
//!
//! ```text
//! caller ──Interpret──▶ GlobalInterpreter ──Event──▶ subscribers
//!                            ▲                         │
//!                            │                 EventInterpreter
//!                  CommandInterpreter ◀──Command───────┘
//! ```
//!
//! Consumers define their domain by implementing `Executor` (command → events)
//! and `EventRules` (event → follow-up commands).
//!
//! Graceful shutdown is `wait_idle` then `close`: the first waits until the
//! feedback loop has no commands or tracked events left in flight, the second
//! drains the submission queue and stops every loop.

pub mod command;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod global;
pub mod in_flight;
pub mod interpreter;
pub mod registry;
pub mod traits;

pub use command::{CommandHandle, CommandInterpreter};
pub use config::{EngineConfig, SubmitPolicy};
pub use envelope::Interpret;
pub use error::{ExecuteError, InterpretError};
pub use event::EventInterpreter;
pub use global::{GlobalHandle, GlobalInterpreter};
pub use in_flight::InFlight;
pub use interpreter::run;
pub use registry::{SubscriberId, Subscription};
pub use traits::{CommandLike, EventLike, EventRules, Executor, Inlet, Interpreter, Outlet};
