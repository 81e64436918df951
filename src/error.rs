//! Error types for the device assembly core.
//!
//! This module provides a unified error type [`DeviceError`] that covers
//! usage errors during device setup, numbering and update, consistency
//! errors raised while assembling, and failures of the reference solver.

use thiserror::Error;

/// Result type alias using [`DeviceError`].
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Unified error type for all device operations.
#[derive(Error, Debug)]
pub enum DeviceError {
    // ============ Setup Errors ============
    /// Device dimension outside 1..=3
    #[error("Invalid dimension {dimension} for device '{device}' (expected 1, 2 or 3)")]
    InvalidDimension { device: String, dimension: usize },

    /// An entity with this name is already registered
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    /// Region lookup failed
    #[error("Region '{region}' not found")]
    RegionNotFound { region: String },

    /// Coordinate index was never registered
    #[error("Coordinate {index} referenced by '{owner}' is not registered on the device")]
    CoordinateNotFound { owner: String, index: usize },

    /// Coordinate is registered but not a node of the referenced region
    #[error("Coordinate {index} referenced by '{owner}' is not a node of region '{region}'")]
    CoordinateNotInRegion {
        owner: String,
        region: String,
        index: usize,
    },

    /// A region, contact or interface was given no coordinates
    #[error("'{owner}' must reference at least one coordinate")]
    EmptyCoordinateSet { owner: String },

    /// The same coordinate appears twice in a region's node list
    #[error("Coordinate {index} listed more than once in region '{region}'")]
    DuplicateCoordinate { region: String, index: usize },

    /// An interface was bound to a single region twice
    #[error("Interface '{interface}' must join two distinct regions, got '{region}' twice")]
    SameRegionInterface { interface: String, region: String },

    // ============ Numbering / Update Errors ============
    /// Operation requires state that has not been established yet
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Solution vector length does not match the equation count
    #[error("{operation}: expected vector of length {expected}, got {actual}")]
    SizeMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Permutation vector entry points outside the solution vector
    #[error("Permutation vector entry {position} maps to {target}, outside 0..{size}")]
    PermutationIndexOutOfRange {
        position: usize,
        target: usize,
        size: usize,
    },

    /// AC or noise update attempted without a DC operating point
    #[error("Region '{region}' has no DC solution to superimpose a small-signal result on")]
    MissingDcSolution { region: String },

    /// Unknown solution variable on a region
    #[error("Region '{region}' has no solution variable '{variable}'")]
    VariableNotFound { region: String, variable: String },

    /// Restore requested for a tag that was never backed up; `owner` is the
    /// device or region lacking it
    #[error("No backup with tag '{tag}' on '{owner}'")]
    UnknownBackup { tag: String, owner: String },

    // ============ Assembly Errors ============
    /// Two registrations claim the same global row with different entries
    #[error("Permutation conflict on equation {index}: {message}")]
    PermutationConflict { index: usize, message: String },

    /// A contribution addresses a row or column outside the system
    #[error("Equation {index} contributed by '{source_name}' is outside 0..{size}")]
    EquationOutOfRange {
        source_name: String,
        index: usize,
        size: usize,
    },

    /// A collaborator failed while producing its contribution
    #[error("Assembly of {kind} '{name}' failed: {message}")]
    AssemblyFailure {
        kind: &'static str,
        name: String,
        message: String,
    },

    // ============ Solver Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular matrix at pivot {pivot} - check that every equation is constrained")]
    SingularMatrix { pivot: usize },

    /// Newton iteration did not converge
    #[error("Newton iteration did not converge after {iterations} iterations (abs: {abs_error:.2e}, rel: {rel_error:.2e})")]
    ConvergenceFailure {
        iterations: usize,
        abs_error: f64,
        rel_error: f64,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl DeviceError {
    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a size mismatch error
    pub fn size_mismatch(operation: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            operation,
            expected,
            actual,
        }
    }

    /// Create a permutation conflict error
    pub fn permutation_conflict(index: usize, message: impl Into<String>) -> Self {
        Self::PermutationConflict {
            index,
            message: message.into(),
        }
    }

    /// Create a collaborator assembly failure
    pub fn assembly_failure(
        kind: &'static str,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AssemblyFailure {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a convergence failure error
    pub fn convergence_failure(iterations: usize, abs_error: f64, rel_error: f64) -> Self {
        Self::ConvergenceFailure {
            iterations,
            abs_error,
            rel_error,
        }
    }
}
