//! # Semidev Core
//!
//! Device-level orchestration for semiconductor device simulation.
//!
//! This library provides:
//! - A [`Device`] container that owns regions, contacts, interfaces and
//!   mesh coordinates for the lifetime of a simulation
//! - Global equation numbering across regions
//! - Three-pass sparse assembly (Contact → Interface → Region) with row
//!   elimination and redirection through a permutation registry
//! - Distribution of DC, small-signal and noise solutions back to regions
//! - Named solution snapshots for rollback of rejected solver steps
//!
//! ## Architecture
//!
//! - [`device`] - Device container, regions, contacts, interfaces, coordinate indices
//! - [`assembly`] - Contribution buffers, triplets and the permutation registry
//! - [`models`] - Physics hook traits plus simple reference models
//! - [`solver`] - Dense reference LU and a DC Newton driver
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```no_run
//! use semidev_core::models::{ConductionModel, OhmicContact};
//! use semidev_core::solver::NewtonSolver;
//! use semidev_core::{Contact, Device, Region};
//!
//! let mut device = Device::new("resistor", 1)?;
//! let ids = device.add_coordinate_list((0..5).map(|i| [i as f64, 0.0, 0.0]));
//! let model = ConductionModel::chain(5).with_variable("Potential", 1.0);
//! device.add_region(Region::new("bulk", ids.clone(), model)?)?;
//! device.add_contact(Contact::new("left", "bulk", vec![ids[0]], OhmicContact::new("Potential", 1.0)))?;
//! device.add_contact(Contact::new("right", "bulk", vec![ids[4]], OhmicContact::new("Potential", 0.0)))?;
//!
//! device.set_base_equation_number(0);
//! let report = NewtonSolver::new().solve(&mut device)?;
//! println!("converged in {} iterations", report.iterations);
//! # Ok::<(), semidev_core::DeviceError>(())
//! ```
//!
//! ## Equation Numbering
//!
//! Regions are numbered in registration order. A region with `N` nodes and
//! `V` variables owns `N·V` consecutive equations starting at its offset,
//! and variable `v` on node `n` maps to `offset + n·V + v`.

pub mod assembly;
pub mod device;
pub mod error;
pub mod models;
pub mod solver;

// Re-export main types for convenience
pub use assembly::{
    Assembly, AssemblyConfig, Contributions, PermutationEntry, PermutationMap, RhsEntry,
    TimeMode, Triplet, WhatToLoad,
};
pub use device::{
    Contact, ContactId, Coordinate, CoordinateId, Device, Interface, InterfaceId, Region,
};
pub use error::{DeviceError, Result};

/// Floor added to `|u|` when computing relative update errors.
pub const REL_ERROR_FLOOR: f64 = 1e-10;

/// Default minimum collaborators in a pass before assembling in parallel.
pub const DEFAULT_MIN_PARALLEL_ITEMS: usize = 4;
