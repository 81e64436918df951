//! Regions: numbered subdomains owning a contiguous block of unknowns.

use std::collections::{BTreeMap, HashMap};

use num_complex::Complex64;

use super::types::CoordinateId;
use crate::assembly::{Contributions, TimeMode};
use crate::error::{DeviceError, Result};
use crate::models::RegionModel;
use crate::REL_ERROR_FLOOR;

/// Mutable solution state of a region, as captured by backups.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionState {
    /// DC / transient solution, `[variable][node]`.
    pub dc: Vec<Vec<f64>>,
    /// Small-signal solution, `[variable][node]`.
    pub ac: Vec<Vec<Complex64>>,
    /// Noise solutions keyed by output name, `[variable][node]`.
    pub noise: BTreeMap<String, Vec<Vec<Complex64>>>,
    /// Set once the DC state came from an update or was set explicitly.
    pub dc_valid: bool,
}

impl RegionState {
    fn zeros(variables: usize, nodes: usize) -> Self {
        Self {
            dc: vec![vec![0.0; nodes]; variables],
            ac: vec![vec![Complex64::new(0.0, 0.0); nodes]; variables],
            noise: BTreeMap::new(),
            dc_valid: false,
        }
    }
}

/// A subdomain of the device.
///
/// A region with `V` solution variables over `N` nodes owns `V·N` equations.
/// Equation `(v, n)` has global number `offset + n·V + v`.
#[derive(Debug)]
pub struct Region {
    name: String,
    coordinates: Vec<CoordinateId>,
    node_lookup: HashMap<CoordinateId, usize>,
    variables: Vec<String>,
    offset: Option<usize>,
    state: RegionState,
    backups: HashMap<String, RegionState>,
    abs_error: f64,
    rel_error: f64,
    model: Box<dyn RegionModel>,
}

impl Region {
    /// Create a region over `coordinates` whose physics is `model`.
    ///
    /// Local node `n` is `coordinates[n]`.
    pub fn new(
        name: impl Into<String>,
        coordinates: Vec<CoordinateId>,
        model: impl RegionModel + 'static,
    ) -> Result<Self> {
        let name = name.into();
        if coordinates.is_empty() {
            return Err(DeviceError::EmptyCoordinateSet { owner: name });
        }

        let mut node_lookup = HashMap::with_capacity(coordinates.len());
        for (node, &coord) in coordinates.iter().enumerate() {
            if node_lookup.insert(coord, node).is_some() {
                return Err(DeviceError::DuplicateCoordinate {
                    region: name,
                    index: coord.0,
                });
            }
        }

        model
            .validate(coordinates.len())
            .map_err(|e| DeviceError::assembly_failure("region", &name, e.to_string()))?;

        let variables = model.variables();
        let state = RegionState::zeros(variables.len(), coordinates.len());

        Ok(Self {
            name,
            coordinates,
            node_lookup,
            variables,
            offset: None,
            state,
            backups: HashMap::new(),
            abs_error: 0.0,
            rel_error: 0.0,
            model: Box::new(model),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physics model name.
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn coordinates(&self) -> &[CoordinateId] {
        &self.coordinates
    }

    pub fn num_nodes(&self) -> usize {
        self.coordinates.len()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Local equation count.
    pub fn equation_count(&self) -> usize {
        self.num_nodes() * self.num_variables()
    }

    /// Global offset, once the device has been numbered.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = Some(offset);
    }

    /// Local node index of a coordinate, if it belongs to this region.
    pub fn node_of(&self, coordinate: CoordinateId) -> Option<usize> {
        self.node_lookup.get(&coordinate).copied()
    }

    pub fn contains(&self, coordinate: CoordinateId) -> bool {
        self.node_lookup.contains_key(&coordinate)
    }

    /// Index of a solution variable by name.
    pub fn variable_index(&self, variable: &str) -> Result<usize> {
        self.variables
            .iter()
            .position(|v| v == variable)
            .ok_or_else(|| DeviceError::VariableNotFound {
                region: self.name.clone(),
                variable: variable.to_string(),
            })
    }

    /// Global equation number of `(variable, node)`.
    pub fn equation_number(&self, variable: usize, node: usize) -> Result<usize> {
        let offset = self.offset.ok_or_else(|| {
            DeviceError::invalid_state(format!("region '{}' has not been numbered", self.name))
        })?;
        if variable >= self.num_variables() || node >= self.num_nodes() {
            return Err(DeviceError::invalid_state(format!(
                "region '{}' has no equation for variable {} at node {}",
                self.name, variable, node
            )));
        }
        Ok(offset + node * self.num_variables() + variable)
    }

    /// Current DC value of `variable` at `node`.
    pub fn value(&self, variable: usize, node: usize) -> Result<f64> {
        self.state
            .dc
            .get(variable)
            .and_then(|values| values.get(node))
            .copied()
            .ok_or_else(|| {
                DeviceError::invalid_state(format!(
                    "region '{}' has no value for variable {} at node {}",
                    self.name, variable, node
                ))
            })
    }

    /// DC solution of a variable over all nodes.
    pub fn solution(&self, variable: &str) -> Result<&[f64]> {
        let v = self.variable_index(variable)?;
        Ok(&self.state.dc[v])
    }

    /// Overwrite the DC solution of a variable, e.g. with an initial guess.
    pub fn set_solution(&mut self, variable: &str, values: &[f64]) -> Result<()> {
        let v = self.variable_index(variable)?;
        if values.len() != self.num_nodes() {
            return Err(DeviceError::size_mismatch(
                "Region::set_solution",
                self.num_nodes(),
                values.len(),
            ));
        }
        self.state.dc[v].copy_from_slice(values);
        self.state.dc_valid = true;
        Ok(())
    }

    /// Small-signal solution of a variable.
    pub fn ac_solution(&self, variable: &str) -> Result<&[Complex64]> {
        let v = self.variable_index(variable)?;
        Ok(&self.state.ac[v])
    }

    /// Noise solution of a variable for a named output.
    pub fn noise_solution(&self, output: &str, variable: &str) -> Option<&[Complex64]> {
        let v = self.variable_index(variable).ok()?;
        self.state.noise.get(output).map(|n| n[v].as_slice())
    }

    /// Whether the region holds a DC operating point.
    pub fn has_dc_solution(&self) -> bool {
        self.state.dc_valid
    }

    pub fn state(&self) -> &RegionState {
        &self.state
    }

    pub fn abs_error(&self) -> f64 {
        self.abs_error
    }

    pub fn rel_error(&self) -> f64 {
        self.rel_error
    }

    /// Net flux of `variable` leaving `node` through the region's bulk.
    pub fn node_flux(&self, variable: usize, node: usize) -> f64 {
        self.model.node_flux(self, variable, node)
    }

    /// Run the physics model's assembly hook.
    pub fn assemble(&self, out: &mut Contributions, time_mode: TimeMode) -> Result<()> {
        self.model.assemble(self, out, time_mode)
    }

    fn check_numbered(&self) -> Result<usize> {
        self.offset.ok_or_else(|| {
            DeviceError::invalid_state(format!("region '{}' has not been numbered", self.name))
        })
    }

    /// Apply a Newton correction: `u <- u - result[eq]`.
    pub(crate) fn update(&mut self, result: &[f64]) -> Result<()> {
        let offset = self.check_numbered()?;
        let nv = self.num_variables();
        let mut abs_error = 0.0f64;
        let mut rel_error = 0.0f64;

        for (v, values) in self.state.dc.iter_mut().enumerate() {
            for (n, u) in values.iter_mut().enumerate() {
                let delta = result[offset + n * nv + v];
                *u -= delta;
                abs_error = abs_error.max(delta.abs());
                rel_error = rel_error.max(delta.abs() / (u.abs() + REL_ERROR_FLOOR));
            }
        }

        self.abs_error = abs_error;
        self.rel_error = rel_error;
        self.state.dc_valid = true;
        Ok(())
    }

    /// Store a small-signal solution superimposed on the DC point.
    pub(crate) fn ac_update(&mut self, result: &[Complex64]) -> Result<()> {
        let offset = self.check_numbered()?;
        if !self.state.dc_valid {
            return Err(DeviceError::MissingDcSolution {
                region: self.name.clone(),
            });
        }
        let nv = self.num_variables();
        for (v, values) in self.state.ac.iter_mut().enumerate() {
            for (n, z) in values.iter_mut().enumerate() {
                *z = result[offset + n * nv + v];
            }
        }
        Ok(())
    }

    /// Store a noise solution for `output`, reading through `permvec`.
    pub(crate) fn noise_update(
        &mut self,
        output: &str,
        permvec: &[usize],
        result: &[Complex64],
    ) -> Result<()> {
        let offset = self.check_numbered()?;
        if !self.state.dc_valid {
            return Err(DeviceError::MissingDcSolution {
                region: self.name.clone(),
            });
        }
        let nv = self.num_variables();
        let nodes = self.num_nodes();
        let mut values = vec![vec![Complex64::new(0.0, 0.0); nodes]; nv];
        for (v, column) in values.iter_mut().enumerate() {
            for (n, z) in column.iter_mut().enumerate() {
                *z = result[permvec[offset + n * nv + v]];
            }
        }
        self.state.noise.insert(output.to_string(), values);
        Ok(())
    }

    /// Snapshot the solution state under `tag`, replacing any previous one.
    pub(crate) fn backup(&mut self, tag: &str) {
        self.backups.insert(tag.to_string(), self.state.clone());
    }

    pub fn has_backup(&self, tag: &str) -> bool {
        self.backups.contains_key(tag)
    }

    /// Roll back to the snapshot taken under `tag`. The snapshot is kept.
    pub(crate) fn restore(&mut self, tag: &str) -> Result<()> {
        let saved = self
            .backups
            .get(tag)
            .ok_or_else(|| DeviceError::UnknownBackup {
                tag: tag.to_string(),
                owner: self.name.clone(),
            })?;
        self.state = saved.clone();
        Ok(())
    }
}
