//! SOTA core: the interpreter engine wired to the vehicle registry.
//!
//! `SotaExecutor` turns commands into events, `SotaRules` turns events into
//! follow-up commands, and `Sota` runs the whole loop.

pub mod bridge;
pub mod executor;
pub mod journal;
pub mod rules;
pub mod runtime;
pub mod state;

pub use bridge::{serve_lines, BridgeStats};
pub use executor::SotaExecutor;
pub use journal::{EventJournal, JournalEntry};
pub use rules::SotaRules;
pub use runtime::Sota;
pub use state::{VehicleRecord, VehicleRegistry};
