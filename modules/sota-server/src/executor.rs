//! Executes SOTA commands against the vehicle registry.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sota_common::{Command, DomainError, Event, PackageId, Vin};
use sota_interpreter::{CommandLike, ExecuteError, Executor};
use tracing::{info, warn};

use crate::state::VehicleRegistry;

/// Command → events for the SOTA domain.
///
/// Installs always report `InstallStarted` first, then the outcome. Every
/// other command yields exactly one event. After each command the registry's
/// integrity is checked; a violation is fatal for the dispatcher.
#[derive(Debug, Default, Clone)]
pub struct SotaExecutor {
    rejected_packages: BTreeSet<PackageId>,
}

impl SotaExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate vehicles refusing these packages: installs of them fail.
    pub fn rejecting(packages: impl IntoIterator<Item = PackageId>) -> Self {
        Self {
            rejected_packages: packages.into_iter().collect(),
        }
    }

    fn install(&self, state: &mut VehicleRegistry, vin: &Vin, package: &PackageId) -> Vec<Event> {
        let started = Event::InstallStarted {
            vin: vin.clone(),
            package: package.clone(),
        };

        let outcome = if self.rejected_packages.contains(package) && state.has_vehicle(vin) {
            Err(format!("vehicle {vin} rejected package {package}"))
        } else {
            state.install(vin, package).map_err(|e| e.to_string())
        };

        let terminal = match outcome {
            Ok(()) => {
                info!(vin = %vin, package = %package, "Install completed");
                Event::InstallCompleted {
                    vin: vin.clone(),
                    package: package.clone(),
                }
            }
            Err(reason) => {
                warn!(vin = %vin, package = %package, reason = reason.as_str(), "Install failed");
                Event::InstallFailed {
                    vin: vin.clone(),
                    package: package.clone(),
                    reason,
                    vehicle_known: state.has_vehicle(vin),
                }
            }
        };

        vec![started, terminal]
    }

    fn apply(
        &self,
        state: &mut VehicleRegistry,
        command: &Command,
    ) -> Result<Vec<Event>, DomainError> {
        let event = match command {
            Command::RegisterVehicle { vin } => {
                state.register_vehicle(vin)?;
                Event::VehicleRegistered { vin: vin.clone() }
            }
            Command::AddPackage {
                package,
                description,
            } => {
                state.add_package(package, description.clone())?;
                Event::PackageAdded {
                    package: package.clone(),
                }
            }
            Command::AddComponent { vin, part_number } => {
                state.add_component(vin, part_number)?;
                Event::ComponentAdded {
                    vin: vin.clone(),
                    part_number: part_number.clone(),
                }
            }
            Command::QueueInstall { vin, package } => {
                state.queue_install(vin, package)?;
                Event::InstallQueued {
                    vin: vin.clone(),
                    package: package.clone(),
                }
            }
            Command::InstallPackage { vin, package } => {
                return Ok(self.install(state, vin, package));
            }
            Command::RecordHistory {
                vin,
                package,
                success,
            } => {
                let entry = state.record_history(vin, package, *success)?;
                Event::HistoryRecorded {
                    vin: vin.clone(),
                    entry,
                }
            }
            Command::SearchVehicles { regex } => Event::VehiclesFound {
                vins: state.search(regex.as_deref())?,
            },
            Command::VehiclesForPackage { package } => Event::VehiclesForPackage {
                package: package.clone(),
                vins: state.vehicles_with_package(package),
            },
            Command::ResolveAffectedVins { package } => Event::AffectedVinsResolved {
                package: package.clone(),
                vins: state.affected_vins(package),
            },
            Command::ListPackageQueue { vin } => Event::PackageQueueListed {
                vin: vin.clone(),
                packages: state.queue(vin)?,
            },
            Command::ListPackageHistory { vin } => Event::PackageHistoryListed {
                vin: vin.clone(),
                entries: state.history(vin)?,
            },
            Command::ListComponents { vin } => Event::ComponentsListed {
                vin: vin.clone(),
                parts: state.components(vin)?,
            },
        };
        Ok(vec![event])
    }
}

#[async_trait]
impl Executor<Command, Event, VehicleRegistry> for SotaExecutor {
    async fn execute(
        &self,
        command: &Command,
        state: &mut VehicleRegistry,
    ) -> Result<Vec<Event>, ExecuteError> {
        let events = self.apply(state, command).map_err(ExecuteError::domain)?;
        state.check_integrity().map_err(ExecuteError::fatal)?;
        Ok(events)
    }

    fn failed(&self, command: &Command, reason: String) -> Event {
        match command {
            Command::InstallPackage { vin, package } => Event::InstallFailed {
                vin: vin.clone(),
                package: package.clone(),
                reason,
                vehicle_known: false,
            },
            other => Event::CommandFailed {
                command: other.command_type().to_string(),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vin() -> Vin {
        Vin::from("VIN123")
    }

    fn nav() -> PackageId {
        PackageId::new("nav", "1.2")
    }

    async fn seeded() -> (SotaExecutor, VehicleRegistry) {
        let executor = SotaExecutor::new();
        let mut state = VehicleRegistry::new();
        executor
            .execute(&Command::RegisterVehicle { vin: vin() }, &mut state)
            .await
            .unwrap();
        executor
            .execute(
                &Command::AddPackage {
                    package: nav(),
                    description: None,
                },
                &mut state,
            )
            .await
            .unwrap();
        (executor, state)
    }

    #[tokio::test]
    async fn install_yields_started_then_completed() {
        let (executor, mut state) = seeded().await;
        let events = executor
            .execute(
                &Command::InstallPackage {
                    vin: vin(),
                    package: nav(),
                },
                &mut state,
            )
            .await
            .unwrap();
        assert_eq!(
            events,
            vec![
                Event::InstallStarted {
                    vin: vin(),
                    package: nav()
                },
                Event::InstallCompleted {
                    vin: vin(),
                    package: nav()
                },
            ]
        );
    }

    #[tokio::test]
    async fn install_on_unknown_vehicle_fails_without_history() {
        let (executor, mut state) = seeded().await;
        let events = executor
            .execute(
                &Command::InstallPackage {
                    vin: Vin::from("NOPE"),
                    package: nav(),
                },
                &mut state,
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            Event::InstallFailed {
                reason,
                vehicle_known,
                ..
            } => {
                assert!(reason.contains("not registered"));
                assert!(!vehicle_known);
            }
            other => panic!("expected InstallFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_package_fails_on_known_vehicle() {
        let (_, mut state) = seeded().await;
        let executor = SotaExecutor::rejecting([nav()]);
        let events = executor
            .execute(
                &Command::InstallPackage {
                    vin: vin(),
                    package: nav(),
                },
                &mut state,
            )
            .await
            .unwrap();
        assert!(matches!(
            events.last(),
            Some(Event::InstallFailed {
                vehicle_known: true,
                ..
            })
        ));
        assert!(state.vehicles_with_package(&nav()).is_empty());
    }

    #[tokio::test]
    async fn business_failure_is_a_domain_error() {
        let (executor, mut state) = seeded().await;
        let err = executor
            .execute(&Command::RegisterVehicle { vin: vin() }, &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Domain(_)));
        assert_eq!(err.to_string(), "vehicle VIN123 is already registered");

        let event = executor.failed(&Command::RegisterVehicle { vin: vin() }, err.to_string());
        assert_eq!(
            event,
            Event::CommandFailed {
                command: "register_vehicle".into(),
                reason: "vehicle VIN123 is already registered".into(),
            }
        );
    }

    #[tokio::test]
    async fn integrity_violation_is_fatal() {
        let (executor, mut state) = seeded().await;
        state.corrupt_for_test(&vin(), PackageId::new("ghost", "0.1"));
        let err = executor
            .execute(&Command::SearchVehicles { regex: None }, &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Fatal(ref r) if r.contains("ghost-0.1")));
    }
}
