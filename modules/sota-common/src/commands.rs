//! Commands: requested state transitions.

use serde::{Deserialize, Serialize};
use sota_interpreter::CommandLike;

use crate::types::{PackageId, Vin};

/// Every state transition the SOTA core can be asked to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------
    RegisterVehicle {
        vin: Vin,
    },
    AddPackage {
        package: PackageId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    AddComponent {
        vin: Vin,
        part_number: String,
    },

    // -----------------------------------------------------------------------
    // Installs
    // -----------------------------------------------------------------------
    /// Put a package in a vehicle's install queue.
    QueueInstall {
        vin: Vin,
        package: PackageId,
    },
    /// Install a package now. Yields a started event and then the outcome.
    InstallPackage {
        vin: Vin,
        package: PackageId,
    },
    RecordHistory {
        vin: Vin,
        package: PackageId,
        success: bool,
    },

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------
    /// All vehicles, or those whose VIN matches `regex`.
    SearchVehicles {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regex: Option<String>,
    },
    /// Vehicles with the package installed.
    VehiclesForPackage {
        package: PackageId,
    },
    /// Vehicles with the package installed or queued.
    ResolveAffectedVins {
        package: PackageId,
    },
    ListPackageQueue {
        vin: Vin,
    },
    ListPackageHistory {
        vin: Vin,
    },
    ListComponents {
        vin: Vin,
    },
}

impl CommandLike for Command {
    fn command_type(&self) -> &'static str {
        match self {
            Command::RegisterVehicle { .. } => "register_vehicle",
            Command::AddPackage { .. } => "add_package",
            Command::AddComponent { .. } => "add_component",
            Command::QueueInstall { .. } => "queue_install",
            Command::InstallPackage { .. } => "install_package",
            Command::RecordHistory { .. } => "record_history",
            Command::SearchVehicles { .. } => "search_vehicles",
            Command::VehiclesForPackage { .. } => "vehicles_for_package",
            Command::ResolveAffectedVins { .. } => "resolve_affected_vins",
            Command::ListPackageQueue { .. } => "list_package_queue",
            Command::ListPackageHistory { .. } => "list_package_history",
            Command::ListComponents { .. } => "list_components",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_matches_serde_tag() {
        let command = Command::InstallPackage {
            vin: Vin::from("VIN123"),
            package: PackageId::new("nav", "1.2"),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["type"], command.command_type());
        assert_eq!(json["vin"], "VIN123");
        assert_eq!(json["package"], "nav-1.2");
    }

    #[test]
    fn install_line_parses_with_name_version_package() {
        let command: Command = serde_json::from_str(
            r#"{"type":"install_package","vin":"VIN123","package":"nav-1.2"}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            Command::InstallPackage {
                vin: Vin::from("VIN123"),
                package: PackageId::new("nav", "1.2"),
            }
        );

        let malformed = r#"{"type":"install_package","vin":"VIN123","package":"nav"}"#;
        assert!(serde_json::from_str::<Command>(malformed).is_err());
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let command: Command = serde_json::from_str(r#"{"type":"search_vehicles"}"#).unwrap();
        assert_eq!(command, Command::SearchVehicles { regex: None });
    }
}
