//! Global system assembly.
//!
//! Every Region, Contact and Interface contributes to one global sparse
//! system `J·x = f` through the same hook shape: it fills a local
//! [`Contributions`] buffer with matrix triplets, right-hand-side entries and
//! permutation registrations, all addressed by global equation number.
//!
//! The [`Device`](crate::Device) runs three passes in a fixed order:
//!
//! ```text
//! Contact   -> triplets/rhs appended as-is, permutations registered
//! Interface -> triplets/rhs appended as-is, permutations registered
//! Region    -> triplets/rhs routed through the permutation registry
//! ```
//!
//! Region rows claimed by a Contact or Interface are therefore eliminated or
//! redirected before they reach the shared lists, while the claiming
//! collaborator supplies the replacement equation for that row.

mod permutation;

pub use permutation::{PermutationEntry, PermutationMap};

use std::fmt;

use crate::error::{DeviceError, Result};

/// Selects which parts of the system an assembly call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhatToLoad {
    /// Jacobian triplets only.
    MatrixOnly,
    /// Residual entries only (e.g. a pure residual evaluation).
    RhsOnly,
    /// Both Jacobian and residual.
    MatrixAndRhs,
}

impl WhatToLoad {
    /// Whether matrix triplets are produced.
    pub fn loads_matrix(self) -> bool {
        matches!(self, WhatToLoad::MatrixOnly | WhatToLoad::MatrixAndRhs)
    }

    /// Whether right-hand-side entries are produced.
    pub fn loads_rhs(self) -> bool {
        matches!(self, WhatToLoad::RhsOnly | WhatToLoad::MatrixAndRhs)
    }
}

/// Selects static or time-derivative terms.
///
/// `Dc` loads the static (steady-state) terms. `Time` loads only the
/// time-derivative (charge) terms so a time integrator can scale and
/// combine them with the static system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeMode {
    Dc,
    Time,
}

/// The three assembly passes, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssemblyPass {
    Contact,
    Interface,
    Region,
}

impl fmt::Display for AssemblyPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyPass::Contact => write!(f, "contact"),
            AssemblyPass::Interface => write!(f, "interface"),
            AssemblyPass::Region => write!(f, "region"),
        }
    }
}

/// One real contribution to the global sparse matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

impl Triplet {
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Self { row, col, value }
    }
}

/// One contribution to the global right-hand side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhsEntry {
    pub index: usize,
    pub value: f64,
}

impl RhsEntry {
    pub fn new(index: usize, value: f64) -> Self {
        Self { index, value }
    }
}

/// Local output buffer handed to a single collaborator's assembly hook.
///
/// Matrix and RHS additions honour the [`WhatToLoad`] the buffer was created
/// with, so hooks can stamp unconditionally and only use the flag to skip
/// expensive derivative work.
#[derive(Debug, Clone)]
pub struct Contributions {
    what: WhatToLoad,
    triplets: Vec<Triplet>,
    rhs: Vec<RhsEntry>,
    permutations: Vec<(usize, PermutationEntry)>,
}

impl Contributions {
    /// Create an empty buffer.
    pub fn new(what: WhatToLoad) -> Self {
        Self {
            what,
            triplets: Vec::new(),
            rhs: Vec::new(),
            permutations: Vec::new(),
        }
    }

    /// The load selector this buffer honours.
    pub fn what_to_load(&self) -> WhatToLoad {
        self.what
    }

    /// Add a Jacobian entry at (row, col).
    pub fn add_matrix(&mut self, row: usize, col: usize, value: f64) {
        if self.what.loads_matrix() {
            self.triplets.push(Triplet::new(row, col, value));
        }
    }

    /// Add a residual entry at `index`.
    pub fn add_rhs(&mut self, index: usize, value: f64) {
        if self.what.loads_rhs() {
            self.rhs.push(RhsEntry::new(index, value));
        }
    }

    /// Register a permutation for global row `index`.
    ///
    /// Registrations are recorded regardless of [`WhatToLoad`] so that a
    /// residual-only evaluation eliminates exactly the same rows.
    pub fn register_permutation(&mut self, index: usize, entry: PermutationEntry) {
        self.permutations.push((index, entry));
    }

    pub fn triplets(&self) -> &[Triplet] {
        &self.triplets
    }

    pub fn rhs(&self) -> &[RhsEntry] {
        &self.rhs
    }

    pub fn permutations(&self) -> &[(usize, PermutationEntry)] {
        &self.permutations
    }

    /// Split into (triplets, rhs, permutations).
    pub fn into_parts(self) -> (Vec<Triplet>, Vec<RhsEntry>, Vec<(usize, PermutationEntry)>) {
        (self.triplets, self.rhs, self.permutations)
    }
}

/// The output of a full Contact → Interface → Region assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Sparse matrix contributions; duplicates are summed by the consumer.
    pub triplets: Vec<Triplet>,
    /// Right-hand-side contributions; duplicates are summed by the consumer.
    pub rhs: Vec<RhsEntry>,
    /// Rows eliminated or redirected during assembly.
    pub permutations: PermutationMap,
    /// System dimension (the device's max equation number).
    pub size: usize,
}

impl Assembly {
    /// Create an empty assembly for a system of `size` equations.
    pub fn new(size: usize) -> Self {
        Self {
            triplets: Vec::new(),
            rhs: Vec::new(),
            permutations: PermutationMap::new(),
            size,
        }
    }

    /// Sum the RHS entries into a dense vector of length `size`.
    ///
    /// Entries produced by a device pass are range-checked already; an entry
    /// pushed by hand at or beyond `size` is an error.
    pub fn dense_rhs(&self) -> Result<Vec<f64>> {
        let mut out = vec![0.0; self.size];
        for entry in &self.rhs {
            let slot = out
                .get_mut(entry.index)
                .ok_or_else(|| DeviceError::EquationOutOfRange {
                    source_name: "assembly rhs".to_string(),
                    index: entry.index,
                    size: self.size,
                })?;
            *slot += entry.value;
        }
        Ok(out)
    }

    /// Permutation vector for the noise code path.
    pub fn permutation_vector(&self) -> Vec<usize> {
        self.permutations.permutation_vector(self.size)
    }
}

/// Configuration for within-pass assembly.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Compute collaborator contributions on the rayon pool.
    pub parallel: bool,
    /// Minimum collaborators in a pass before going parallel.
    pub min_parallel_items: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            min_parallel_items: crate::DEFAULT_MIN_PARALLEL_ITEMS,
        }
    }
}

impl AssemblyConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable fork-join assembly within a pass.
    ///
    /// The concatenated output is identical to the sequential path; only
    /// the computation of each collaborator's slice is spread across threads.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the minimum collaborator count for parallel passes.
    pub fn with_min_parallel_items(mut self, min_parallel_items: usize) -> Self {
        self.min_parallel_items = min_parallel_items.max(1);
        self
    }

    pub(crate) fn use_parallel(&self, items: usize) -> bool {
        self.parallel && items >= self.min_parallel_items && rayon::current_num_threads() > 1
    }
}
