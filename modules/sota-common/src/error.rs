use thiserror::Error;

use crate::types::{PackageId, Vin};

/// Business failures. Reported as failure events, never as crashes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("vehicle {0} is not registered")]
    UnknownVehicle(Vin),

    #[error("vehicle {0} is already registered")]
    VehicleExists(Vin),

    #[error("package {0} is not in the catalog")]
    UnknownPackage(PackageId),

    #[error("package {0} is already in the catalog")]
    PackageExists(PackageId),

    #[error("package {package} is already installed on {vin}")]
    AlreadyInstalled { vin: Vin, package: PackageId },

    #[error("package {package} is already queued for {vin}")]
    AlreadyQueued { vin: Vin, package: PackageId },

    #[error("component {part_number} is already on {vin}")]
    ComponentExists { vin: Vin, part_number: String },

    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid package id '{0}' (expected name-version)")]
    InvalidPackageId(String),

    #[error("{0} must not be empty")]
    EmptyIdentifier(&'static str),
}
