//! Vehicle registry: the state the dispatcher executes commands against.
//!
//! Owned exclusively by the GlobalInterpreter; nothing else mutates it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use regex::Regex;
use sota_common::{DomainError, HistoryEntry, PackageId, Vin};

#[derive(Debug, Default, Clone)]
pub struct VehicleRecord {
    pub components: BTreeSet<String>,
    pub installed: BTreeSet<PackageId>,
    pub queue: Vec<PackageId>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Default)]
pub struct VehicleRegistry {
    vehicles: BTreeMap<Vin, VehicleRecord>,
    packages: BTreeMap<PackageId, Option<String>>,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vehicle(&self, vin: &Vin) -> Option<&VehicleRecord> {
        self.vehicles.get(vin)
    }

    pub fn has_vehicle(&self, vin: &Vin) -> bool {
        self.vehicles.contains_key(vin)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn register_vehicle(&mut self, vin: &Vin) -> Result<(), DomainError> {
        require_vin(vin)?;
        if self.vehicles.contains_key(vin) {
            return Err(DomainError::VehicleExists(vin.clone()));
        }
        self.vehicles.insert(vin.clone(), VehicleRecord::default());
        Ok(())
    }

    pub fn add_package(
        &mut self,
        package: &PackageId,
        description: Option<String>,
    ) -> Result<(), DomainError> {
        if self.packages.contains_key(package) {
            return Err(DomainError::PackageExists(package.clone()));
        }
        self.packages.insert(package.clone(), description);
        Ok(())
    }

    pub fn add_component(&mut self, vin: &Vin, part_number: &str) -> Result<(), DomainError> {
        if part_number.trim().is_empty() {
            return Err(DomainError::EmptyIdentifier("part number"));
        }
        let record = self.record_mut(vin)?;
        if !record.components.insert(part_number.to_string()) {
            return Err(DomainError::ComponentExists {
                vin: vin.clone(),
                part_number: part_number.to_string(),
            });
        }
        Ok(())
    }

    pub fn queue_install(&mut self, vin: &Vin, package: &PackageId) -> Result<(), DomainError> {
        self.require_package(package)?;
        let record = self.record_mut(vin)?;
        if record.installed.contains(package) {
            return Err(DomainError::AlreadyInstalled {
                vin: vin.clone(),
                package: package.clone(),
            });
        }
        if record.queue.contains(package) {
            return Err(DomainError::AlreadyQueued {
                vin: vin.clone(),
                package: package.clone(),
            });
        }
        record.queue.push(package.clone());
        Ok(())
    }

    /// Mark a package installed and take it off the vehicle's queue.
    pub fn install(&mut self, vin: &Vin, package: &PackageId) -> Result<(), DomainError> {
        self.require_package(package)?;
        let record = self.record_mut(vin)?;
        if record.installed.contains(package) {
            return Err(DomainError::AlreadyInstalled {
                vin: vin.clone(),
                package: package.clone(),
            });
        }
        record.queue.retain(|p| p != package);
        record.installed.insert(package.clone());
        Ok(())
    }

    /// History logs every attempt, including ones for uncatalogued packages.
    pub fn record_history(
        &mut self,
        vin: &Vin,
        package: &PackageId,
        success: bool,
    ) -> Result<HistoryEntry, DomainError> {
        let record = self.record_mut(vin)?;
        let entry = HistoryEntry {
            package: package.clone(),
            success,
            completed_at: Utc::now(),
        };
        record.history.push(entry.clone());
        Ok(entry)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn search(&self, pattern: Option<&str>) -> Result<Vec<Vin>, DomainError> {
        let regex = match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => {
                Some(Regex::new(p).map_err(|e| DomainError::InvalidPattern(e.to_string()))?)
            }
            None => None,
        };
        Ok(self
            .vehicles
            .keys()
            .filter(|vin| regex.as_ref().map_or(true, |r| r.is_match(vin.as_str())))
            .cloned()
            .collect())
    }

    pub fn vehicles_with_package(&self, package: &PackageId) -> Vec<Vin> {
        self.vehicles
            .iter()
            .filter(|(_, r)| r.installed.contains(package))
            .map(|(vin, _)| vin.clone())
            .collect()
    }

    pub fn affected_vins(&self, package: &PackageId) -> Vec<Vin> {
        self.vehicles
            .iter()
            .filter(|(_, r)| r.installed.contains(package) || r.queue.contains(package))
            .map(|(vin, _)| vin.clone())
            .collect()
    }

    pub fn queue(&self, vin: &Vin) -> Result<Vec<PackageId>, DomainError> {
        Ok(self.record(vin)?.queue.clone())
    }

    pub fn history(&self, vin: &Vin) -> Result<Vec<HistoryEntry>, DomainError> {
        Ok(self.record(vin)?.history.clone())
    }

    pub fn components(&self, vin: &Vin) -> Result<Vec<String>, DomainError> {
        Ok(self.record(vin)?.components.iter().cloned().collect())
    }

    /// Every queued or installed package must be in the catalog, and never
    /// both queued and installed. Returns the first violation found.
    pub fn check_integrity(&self) -> Result<(), String> {
        for (vin, record) in &self.vehicles {
            for package in record.queue.iter().chain(record.installed.iter()) {
                if !self.packages.contains_key(package) {
                    return Err(format!("{vin} references uncatalogued package {package}"));
                }
            }
            if let Some(dup) = record.queue.iter().find(|p| record.installed.contains(*p)) {
                return Err(format!("{vin} has {dup} both queued and installed"));
            }
        }
        Ok(())
    }

    fn record(&self, vin: &Vin) -> Result<&VehicleRecord, DomainError> {
        require_vin(vin)?;
        self.vehicles
            .get(vin)
            .ok_or_else(|| DomainError::UnknownVehicle(vin.clone()))
    }

    fn record_mut(&mut self, vin: &Vin) -> Result<&mut VehicleRecord, DomainError> {
        require_vin(vin)?;
        self.vehicles
            .get_mut(vin)
            .ok_or_else(|| DomainError::UnknownVehicle(vin.clone()))
    }

    fn require_package(&self, package: &PackageId) -> Result<(), DomainError> {
        if self.packages.contains_key(package) {
            Ok(())
        } else {
            Err(DomainError::UnknownPackage(package.clone()))
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&mut self, vin: &Vin, package: PackageId) {
        if let Some(record) = self.vehicles.get_mut(vin) {
            record.installed.insert(package);
        }
    }
}

fn require_vin(vin: &Vin) -> Result<(), DomainError> {
    if vin.is_blank() {
        Err(DomainError::EmptyIdentifier("vin"))
    } else {
        Ok(())
    }
}
