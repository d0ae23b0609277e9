pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use commands::Command;
pub use config::Config;
pub use error::DomainError;
pub use events::Event;
pub use types::{HistoryEntry, PackageId, Vin};
