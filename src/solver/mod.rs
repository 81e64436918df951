//! Reference solver for exercising the assembly contract.
//!
//! Production factorization lives outside this crate. This module provides a
//! dense LU [`LinearSystem`] and a DC [`NewtonSolver`] that drive a
//! [`Device`](crate::Device) through the full cycle:
//!
//! ```text
//! backup -> { assemble -> factor/solve -> update -> update_contacts }* -> done
//!                                                          | failure
//!                                                          v
//!                                                       restore
//! ```
//!
//! The assembled system is `J·x = f` with `f` the residual, and each unknown
//! is corrected as `u <- u - x`.

mod dense;
mod newton;

pub use dense::LinearSystem;
pub use newton::{NewtonConfig, NewtonReport, NewtonSolver};

/// Default absolute tolerance on the Newton correction.
pub const DEFAULT_ABS_TOLERANCE: f64 = 1e-10;

/// Default relative tolerance on the Newton correction.
pub const DEFAULT_REL_TOLERANCE: f64 = 1e-8;

/// Default maximum Newton iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 30;

/// Pivot magnitude below which the matrix is treated as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-15;

/// Backup tag used by the Newton driver for rollback.
pub const NEWTON_BACKUP_TAG: &str = "newton";
