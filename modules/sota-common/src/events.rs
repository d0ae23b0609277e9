//! Events: outcomes of executed commands. Only the dispatcher creates them.

use serde::{Deserialize, Serialize};
use sota_interpreter::EventLike;

use crate::types::{HistoryEntry, PackageId, Vin};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    VehicleRegistered {
        vin: Vin,
    },
    PackageAdded {
        package: PackageId,
    },
    ComponentAdded {
        vin: Vin,
        part_number: String,
    },
    InstallQueued {
        vin: Vin,
        package: PackageId,
    },
    /// Intermediate: broadcast, never sent as a reply.
    InstallStarted {
        vin: Vin,
        package: PackageId,
    },
    InstallCompleted {
        vin: Vin,
        package: PackageId,
    },
    InstallFailed {
        vin: Vin,
        package: PackageId,
        reason: String,
        /// Whether the vehicle was known when the install failed.
        #[serde(default)]
        vehicle_known: bool,
    },
    HistoryRecorded {
        vin: Vin,
        entry: HistoryEntry,
    },
    VehiclesFound {
        vins: Vec<Vin>,
    },
    VehiclesForPackage {
        package: PackageId,
        vins: Vec<Vin>,
    },
    AffectedVinsResolved {
        package: PackageId,
        vins: Vec<Vin>,
    },
    PackageQueueListed {
        vin: Vin,
        packages: Vec<PackageId>,
    },
    PackageHistoryListed {
        vin: Vin,
        entries: Vec<HistoryEntry>,
    },
    ComponentsListed {
        vin: Vin,
        parts: Vec<String>,
    },
    /// Any command that failed for a business reason, other than installs.
    CommandFailed {
        command: String,
        reason: String,
    },
}

impl EventLike for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::VehicleRegistered { .. } => "vehicle_registered",
            Event::PackageAdded { .. } => "package_added",
            Event::ComponentAdded { .. } => "component_added",
            Event::InstallQueued { .. } => "install_queued",
            Event::InstallStarted { .. } => "install_started",
            Event::InstallCompleted { .. } => "install_completed",
            Event::InstallFailed { .. } => "install_failed",
            Event::HistoryRecorded { .. } => "history_recorded",
            Event::VehiclesFound { .. } => "vehicles_found",
            Event::VehiclesForPackage { .. } => "vehicles_for_package",
            Event::AffectedVinsResolved { .. } => "affected_vins_resolved",
            Event::PackageQueueListed { .. } => "package_queue_listed",
            Event::PackageHistoryListed { .. } => "package_history_listed",
            Event::ComponentsListed { .. } => "components_listed",
            Event::CommandFailed { .. } => "command_failed",
        }
    }
}

impl Event {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::InstallFailed { .. } | Event::CommandFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let event = Event::InstallCompleted {
            vin: Vin::from("VIN123"),
            package: PackageId::new("nav", "1.2"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert!(!event.is_failure());
    }

    #[test]
    fn failures_are_flagged() {
        let event = Event::CommandFailed {
            command: "register_vehicle".into(),
            reason: "vehicle VIN1 is already registered".into(),
        };
        assert!(event.is_failure());
    }
}
