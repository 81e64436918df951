//! Permutation registry: row elimination and redirection.

use std::collections::BTreeMap;

use super::{AssemblyPass, RhsEntry, Triplet};
use crate::error::{DeviceError, Result};

/// How one global row is rewritten before its region contributions reach
/// the shared system.
///
/// - `target == Some(t)`: region contributions to the row are moved into
///   row `t`, multiplied by `scale`.
/// - `target == None`: region contributions to the row are dropped; the row
///   is owned by an explicit constraint equation assembled by the claimant.
///
/// With `keep_copy` the original row retains its contributions as well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PermutationEntry {
    target: Option<usize>,
    scale: f64,
    keep_copy: bool,
}

impl PermutationEntry {
    /// Move the row's region contributions into `target`.
    pub fn redirect(target: usize) -> Self {
        Self {
            target: Some(target),
            scale: 1.0,
            keep_copy: false,
        }
    }

    /// Drop the row's region contributions.
    pub fn eliminate() -> Self {
        Self {
            target: None,
            scale: 1.0,
            keep_copy: false,
        }
    }

    /// Scale (or flip the sign of) redirected values.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Keep the original row's contributions in addition to the redirect.
    pub fn with_keep_copy(mut self, keep_copy: bool) -> Self {
        self.keep_copy = keep_copy;
        self
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn keep_copy(&self) -> bool {
        self.keep_copy
    }
}

/// A registered entry together with who claimed it.
#[derive(Debug, Clone)]
struct Claim {
    entry: PermutationEntry,
    pass: AssemblyPass,
    owner: String,
}

/// Accumulates permutation entries across the assembly passes.
///
/// Each global row may be claimed once. A second registration for the same
/// row is accepted only when it comes from the same pass with an identical
/// entry; anything else is a consistency error, since two collaborators
/// would otherwise both replace the row's equation.
#[derive(Debug, Clone, Default)]
pub struct PermutationMap {
    claims: BTreeMap<usize, Claim>,
    /// Latest pass that started or registered, even with no entries
    latest_pass: Option<AssemblyPass>,
}

impl PermutationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `pass` is running.
    ///
    /// Passes may repeat but never go backwards.
    pub fn begin_pass(&mut self, pass: AssemblyPass) -> Result<()> {
        if let Some(latest) = self.latest_pass {
            if pass < latest {
                return Err(DeviceError::invalid_state(format!(
                    "{} pass started after the {} pass on the same permutation map",
                    pass, latest
                )));
            }
        }
        self.latest_pass = Some(pass);
        Ok(())
    }

    /// The latest pass recorded by [`PermutationMap::begin_pass`] or
    /// [`PermutationMap::insert`].
    pub fn latest_pass(&self) -> Option<AssemblyPass> {
        self.latest_pass
    }

    /// Register `entry` for `index` on behalf of `owner` during `pass`.
    pub fn insert(
        &mut self,
        index: usize,
        entry: PermutationEntry,
        pass: AssemblyPass,
        owner: &str,
    ) -> Result<()> {
        self.begin_pass(pass)?;
        if entry.target == Some(index) && !entry.keep_copy {
            return Err(DeviceError::permutation_conflict(
                index,
                format!("{} '{}' redirects the row onto itself", pass, owner),
            ));
        }

        match self.claims.get(&index) {
            Some(existing) if existing.pass == pass && existing.entry == entry => Ok(()),
            Some(existing) => Err(DeviceError::permutation_conflict(
                index,
                format!(
                    "already claimed by {} '{}' ({:?}), {} '{}' requested {:?}",
                    existing.pass, existing.owner, existing.entry, pass, owner, entry
                ),
            )),
            None => {
                self.claims.insert(
                    index,
                    Claim {
                        entry,
                        pass,
                        owner: owner.to_string(),
                    },
                );
                Ok(())
            }
        }
    }

    /// The entry registered for `index`, if any.
    pub fn get(&self, index: usize) -> Option<&PermutationEntry> {
        self.claims.get(&index).map(|c| &c.entry)
    }

    /// Name of the collaborator that claimed `index`.
    pub fn owner(&self, index: usize) -> Option<&str> {
        self.claims.get(&index).map(|c| c.owner.as_str())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.claims.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Iterate over (row, entry) in ascending row order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PermutationEntry)> {
        self.claims.iter().map(|(k, c)| (*k, &c.entry))
    }

    /// Follow a redirect to its final row and accumulated scale.
    ///
    /// A redirect into a row that is itself redirected (without a kept copy)
    /// continues to that row; landing on an eliminated row drops the value.
    fn resolve(&self, entry: &PermutationEntry) -> Option<(usize, f64)> {
        let mut target = entry.target?;
        let mut scale = entry.scale;
        for _ in 0..self.claims.len() {
            match self.get(target) {
                Some(next) if !next.keep_copy => {
                    target = next.target?;
                    scale *= next.scale;
                }
                _ => return Some((target, scale)),
            }
        }
        // redirect cycle: nothing retains the row
        None
    }

    /// Route region triplets through the registry into `out`.
    ///
    /// Only rows are rewritten; columns (unknowns) are untouched.
    pub fn apply_triplets(&self, input: &[Triplet], out: &mut Vec<Triplet>) {
        out.reserve(input.len());
        for t in input {
            match self.get(t.row) {
                None => out.push(*t),
                Some(entry) => {
                    if let Some((target, scale)) = self.resolve(entry) {
                        out.push(Triplet::new(target, t.col, t.value * scale));
                    }
                    if entry.keep_copy {
                        out.push(*t);
                    }
                }
            }
        }
    }

    /// Route region RHS entries through the registry into `out`.
    pub fn apply_rhs(&self, input: &[RhsEntry], out: &mut Vec<RhsEntry>) {
        out.reserve(input.len());
        for r in input {
            match self.get(r.index) {
                None => out.push(*r),
                Some(entry) => {
                    if let Some((target, scale)) = self.resolve(entry) {
                        out.push(RhsEntry::new(target, r.value * scale));
                    }
                    if entry.keep_copy {
                        out.push(*r);
                    }
                }
            }
        }
    }

    /// Concrete permutation vector for a system of `size` equations.
    ///
    /// Identity except that each redirected row maps to its target. The
    /// noise update reads `result[perm[eq]]` for equation `eq`.
    pub fn permutation_vector(&self, size: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..size).collect();
        for (index, entry) in self.iter() {
            if let Some((target, _)) = self.resolve(entry) {
                if index < size && target < size {
                    perm[index] = target;
                }
            }
        }
        perm
    }
}
