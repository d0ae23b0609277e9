//! Follow-up commands derived from observed events.

use anyhow::Result;
use async_trait::async_trait;
use sota_common::{Command, Event};
use sota_interpreter::EventRules;

/// - a queued install is carried out right away;
/// - every finished install on a known vehicle is written to its history.
pub struct SotaRules;

#[async_trait]
impl EventRules<Event, Command> for SotaRules {
    async fn derive(&self, event: &Event) -> Result<Vec<Command>> {
        let commands = match event {
            Event::InstallQueued { vin, package } => vec![Command::InstallPackage {
                vin: vin.clone(),
                package: package.clone(),
            }],
            Event::InstallCompleted { vin, package } => vec![Command::RecordHistory {
                vin: vin.clone(),
                package: package.clone(),
                success: true,
            }],
            Event::InstallFailed {
                vin,
                package,
                vehicle_known: true,
                ..
            } => vec![Command::RecordHistory {
                vin: vin.clone(),
                package: package.clone(),
                success: false,
            }],
            Event::InstallFailed {
                vehicle_known: false,
                ..
            }
            | Event::VehicleRegistered { .. }
            | Event::PackageAdded { .. }
            | Event::ComponentAdded { .. }
            | Event::InstallStarted { .. }
            | Event::HistoryRecorded { .. }
            | Event::VehiclesFound { .. }
            | Event::VehiclesForPackage { .. }
            | Event::AffectedVinsResolved { .. }
            | Event::PackageQueueListed { .. }
            | Event::PackageHistoryListed { .. }
            | Event::ComponentsListed { .. }
            | Event::CommandFailed { .. } => vec![],
        };
        Ok(commands)
    }
}
