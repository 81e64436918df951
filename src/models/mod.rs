//! Physics models plugged into regions, contacts and interfaces.
//!
//! The device core never knows the equations it assembles. Each collaborator
//! carries a model implementing one of three capability traits:
//!
//! - [`RegionModel`] - bulk equations of a subdomain
//! - [`ContactModel`] - boundary conditions on a region's nodes
//! - [`InterfaceModel`] - coupling between two regions at shared nodes
//!
//! Hooks receive a local [`Contributions`] buffer addressed by global
//! equation number; the device merges the buffers in registration order.
//!
//! Reference models:
//! - [`ConductionModel`] - edge-conductance bulk with optional cubic term
//!   and node capacitance
//! - [`OhmicContact`] - fixed-value (Dirichlet) contact
//! - [`FluxContact`] - fixed injected current
//! - [`ContinuityInterface`] - value continuity with flux merging

mod conduction;
mod contacts;
mod continuity;

pub use conduction::{ConductionModel, ConductionVariable};
pub use contacts::{FluxContact, OhmicContact};
pub use continuity::ContinuityInterface;

use std::fmt;

use crate::assembly::{Contributions, TimeMode};
use crate::device::{ContactSite, InterfaceSite, Region};
use crate::error::Result;

/// Bulk equations of a region.
pub trait RegionModel: fmt::Debug + Send + Sync {
    /// Model name, for diagnostics.
    fn model_name(&self) -> &str;

    /// Names of the per-node solution variables, in equation order.
    fn variables(&self) -> Vec<String>;

    /// Check the model against the region's node count.
    fn validate(&self, _num_nodes: usize) -> Result<()> {
        Ok(())
    }

    /// Stamp the region's contributions.
    fn assemble(&self, region: &Region, out: &mut Contributions, time_mode: TimeMode)
        -> Result<()>;

    /// Net flux of `variable` leaving `node` through the bulk.
    fn node_flux(&self, _region: &Region, _variable: usize, _node: usize) -> f64 {
        0.0
    }
}

/// Boundary condition attached to one region.
pub trait ContactModel: fmt::Debug + Send + Sync {
    fn model_name(&self) -> &str;

    /// Stamp boundary rows and register eliminations.
    fn assemble(
        &self,
        site: &ContactSite<'_>,
        region: &Region,
        out: &mut Contributions,
        time_mode: TimeMode,
    ) -> Result<()>;

    /// Recompute derived quantities after a solution update.
    fn update(&mut self, _site: &ContactSite<'_>, _region: &Region) -> Result<()> {
        Ok(())
    }

    /// A derived quantity by name.
    fn quantity(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Coupling between two regions.
pub trait InterfaceModel: fmt::Debug + Send + Sync {
    fn model_name(&self) -> &str;

    /// Stamp coupling rows and register merges.
    fn assemble(
        &self,
        site: &InterfaceSite<'_>,
        region0: &Region,
        region1: &Region,
        out: &mut Contributions,
        time_mode: TimeMode,
    ) -> Result<()>;

    /// Invalidate anything cached from `quantity` on `region`.
    fn signal(&mut self, _quantity: &str, _region: &str) {}
}
