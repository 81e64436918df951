//! Newton iteration over a device, with rollback on failure.

use log::{info, warn};

use crate::assembly::{TimeMode, WhatToLoad};
use crate::device::Device;
use crate::error::{DeviceError, Result};

use super::dense::LinearSystem;
use super::{
    DEFAULT_ABS_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_REL_TOLERANCE, NEWTON_BACKUP_TAG,
};

/// Configuration for the Newton driver.
#[derive(Debug, Clone)]
pub struct NewtonConfig {
    /// Maximum Newton iterations.
    pub max_iterations: usize,
    /// Converged when the largest correction is below this.
    pub abs_tolerance: f64,
    /// Converged when the largest relative correction is below this.
    pub rel_tolerance: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            abs_tolerance: DEFAULT_ABS_TOLERANCE,
            rel_tolerance: DEFAULT_REL_TOLERANCE,
        }
    }
}

impl NewtonConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum Newton iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the absolute tolerance.
    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }

    /// Set the relative tolerance.
    pub fn with_rel_tolerance(mut self, rel_tolerance: f64) -> Self {
        self.rel_tolerance = rel_tolerance;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(DeviceError::InvalidConfig {
                message: "max_iterations must be at least 1".to_string(),
            });
        }
        if !(self.abs_tolerance > 0.0) || !(self.rel_tolerance > 0.0) {
            return Err(DeviceError::InvalidConfig {
                message: "tolerances must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of a converged solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonReport {
    pub iterations: usize,
    pub abs_error: f64,
    pub rel_error: f64,
}

/// DC Newton driver.
///
/// Backs up every region before iterating and restores that state if the
/// linear solve fails or the iteration does not converge, so a rejected
/// solve leaves the device as it found it.
#[derive(Debug, Clone, Default)]
pub struct NewtonSolver {
    config: NewtonConfig,
}

impl NewtonSolver {
    /// Create a new Newton driver with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Newton driver with custom configuration.
    pub fn with_config(config: NewtonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    /// Solve the device's DC operating point.
    pub fn solve(&self, device: &mut Device) -> Result<NewtonReport> {
        self.config.validate()?;
        device.calc_max_equation_number()?;
        device.backup_solutions(NEWTON_BACKUP_TAG);

        match self.iterate(device) {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(
                    "device '{}': newton failed ({}), restoring '{}'",
                    device.name(),
                    err,
                    NEWTON_BACKUP_TAG
                );
                device.restore_solutions(NEWTON_BACKUP_TAG)?;
                Err(err)
            }
        }
    }

    fn iterate(&self, device: &mut Device) -> Result<NewtonReport> {
        let base = device.base_equation_number()?;
        for iter in 0..self.config.max_iterations {
            let assembly = device.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc)?;
            // equations below the base are not owned by this device
            let mut system = LinearSystem::from_assembly_window(&assembly, base)?;
            system.factor()?;
            let mut correction = vec![0.0; assembly.size];
            correction[base..].copy_from_slice(system.solve()?);
            device.update(&correction)?;
            device.update_contacts()?;

            let abs_error = device.abs_error();
            let rel_error = device.rel_error();
            info!(
                "device '{}': iteration {} abs {:.3e} rel {:.3e}",
                device.name(),
                iter,
                abs_error,
                rel_error
            );

            if abs_error < self.config.abs_tolerance || rel_error < self.config.rel_tolerance {
                return Ok(NewtonReport {
                    iterations: iter + 1,
                    abs_error,
                    rel_error,
                });
            }
        }

        Err(DeviceError::convergence_failure(
            self.config.max_iterations,
            device.abs_error(),
            device.rel_error(),
        ))
    }
}
