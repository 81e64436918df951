//! Dense reference linear system built from assembled triplets.

use crate::assembly::Assembly;
use crate::error::{DeviceError, Result};

use super::PIVOT_TOLERANCE;

/// Dense system `J·x = f`.
#[derive(Debug)]
pub struct LinearSystem {
    /// System matrix J (row-major)
    pub a: Vec<f64>,
    /// Right-hand side f
    pub z: Vec<f64>,
    /// Solution x
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// LU decomposition of J
    lu: Vec<f64>,
    /// Pivot indices for the LU decomposition
    pivots: Vec<usize>,
}

impl LinearSystem {
    /// Create a zero system of the given size.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            z: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    /// Load an assembly, summing duplicate entries.
    pub fn from_assembly(assembly: &Assembly) -> Result<Self> {
        Self::from_assembly_window(assembly, 0)
    }

    /// Load equations `base..assembly.size` of an assembly, shifted down by
    /// `base`. Any entry outside the window is an error.
    pub fn from_assembly_window(assembly: &Assembly, base: usize) -> Result<Self> {
        let size = assembly.size;
        let local = |index: usize| -> Result<usize> {
            if index < base || index >= size {
                return Err(DeviceError::EquationOutOfRange {
                    source_name: format!("assembly window {}..{}", base, size),
                    index,
                    size,
                });
            }
            Ok(index - base)
        };

        let mut system = Self::new(size.saturating_sub(base));
        for t in &assembly.triplets {
            system.add(local(t.row)?, local(t.col)?, t.value);
        }
        for r in &assembly.rhs {
            system.z[local(r.index)?] += r.value;
        }
        Ok(system)
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }

        for k in 0..n {
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val < PIVOT_TOLERANCE {
                return Err(DeviceError::SingularMatrix { pivot: k });
            }

            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve using the factorization from [`LinearSystem::factor`].
    pub fn solve(&mut self) -> Result<&[f64]> {
        let n = self.size;

        for i in 0..n {
            self.x[i] = self.z[self.pivots[i]];
        }

        // Forward substitution (L·y = P·f)
        for i in 0..n {
            for j in 0..i {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
        }

        // Back substitution (U·x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
            let diag = self.lu[i * n + i];
            if diag.abs() < PIVOT_TOLERANCE {
                return Err(DeviceError::SingularMatrix { pivot: i });
            }
            self.x[i] /= diag;
        }

        Ok(&self.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{RhsEntry, Triplet};
    use approx::assert_relative_eq;

    #[test]
    fn test_duplicates_are_summed() {
        let mut assembly = Assembly::new(2);
        assembly.triplets.push(Triplet::new(0, 0, 1.0));
        assembly.triplets.push(Triplet::new(0, 0, 2.0));
        assembly.triplets.push(Triplet::new(1, 1, 4.0));
        assembly.rhs.push(RhsEntry::new(0, 3.0));
        assembly.rhs.push(RhsEntry::new(1, 8.0));
        let mut system = LinearSystem::from_assembly(&assembly).unwrap();
        assert_relative_eq!(system.get(0, 0), 3.0);
        system.factor().unwrap();
        let x = system.solve().unwrap();
        assert_relative_eq!(x[0], 1.0);
        assert_relative_eq!(x[1], 2.0);
    }

    #[test]
    fn test_window_shifts_indices() {
        let mut assembly = Assembly::new(12);
        assembly.triplets.push(Triplet::new(10, 10, 2.0));
        assembly.triplets.push(Triplet::new(11, 10, -1.0));
        assembly.triplets.push(Triplet::new(11, 11, 1.0));
        assembly.rhs.push(RhsEntry::new(10, 4.0));
        let mut system = LinearSystem::from_assembly_window(&assembly, 10).unwrap();
        assert_eq!(system.size, 2);
        assert_relative_eq!(system.get(1, 0), -1.0);
        system.factor().unwrap();
        let x = system.solve().unwrap();
        assert_relative_eq!(x[0], 2.0);
        assert_relative_eq!(x[1], 2.0);
    }

    #[test]
    fn test_entry_outside_window() {
        let mut assembly = Assembly::new(4);
        assembly.triplets.push(Triplet::new(1, 1, 1.0));
        assert!(matches!(
            LinearSystem::from_assembly_window(&assembly, 2),
            Err(DeviceError::EquationOutOfRange { index: 1, .. })
        ));
        assembly.triplets.clear();
        assembly.rhs.push(RhsEntry::new(9, 1.0));
        assert!(LinearSystem::from_assembly(&assembly).is_err());
    }

    #[test]
    fn test_pivoting() {
        let mut system = LinearSystem::new(2);
        system.add(0, 1, 1.0);
        system.add(1, 0, 2.0);
        system.z = vec![3.0, 4.0];
        system.factor().unwrap();
        let x = system.solve().unwrap();
        assert_relative_eq!(x[0], 2.0);
        assert_relative_eq!(x[1], 3.0);
    }

    #[test]
    fn test_singular() {
        let mut system = LinearSystem::new(2);
        system.add(0, 0, 1.0);
        assert!(matches!(
            system.factor(),
            Err(DeviceError::SingularMatrix { pivot: 1 })
        ));
    }
}
