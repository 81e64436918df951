//! Edge-conductance bulk model.
//!
//! For each variable `u` with conductance `g`, cubic coefficient `k` and
//! generation `s`, the residual at node `i` is
//!
//! ```text
//! f_i = Σ_{edges (i,j)} g (u_i - u_j) + k u_i³ - s
//! ```
//!
//! In [`TimeMode::Time`] only the charge term `c u_i` is assembled.

use crate::assembly::{Contributions, TimeMode};
use crate::device::Region;
use crate::error::{DeviceError, Result};

use super::RegionModel;

/// Parameters of one solution variable.
#[derive(Debug, Clone)]
pub struct ConductionVariable {
    pub name: String,
    /// Edge conductance.
    pub conductance: f64,
    /// Uniform generation per node.
    pub generation: f64,
    /// Coefficient of the cubic node term.
    pub nonlinear: f64,
    /// Node capacitance for the time-derivative term.
    pub capacitance: f64,
}

impl ConductionVariable {
    pub fn new(name: impl Into<String>, conductance: f64) -> Self {
        Self {
            name: name.into(),
            conductance,
            generation: 0.0,
            nonlinear: 0.0,
            capacitance: 0.0,
        }
    }

    pub fn with_generation(mut self, generation: f64) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_nonlinear(mut self, nonlinear: f64) -> Self {
        self.nonlinear = nonlinear;
        self
    }

    pub fn with_capacitance(mut self, capacitance: f64) -> Self {
        self.capacitance = capacitance;
        self
    }
}

/// Bulk model over an explicit edge list of region-local nodes.
#[derive(Debug, Clone)]
pub struct ConductionModel {
    edges: Vec<(usize, usize)>,
    variables: Vec<ConductionVariable>,
}

impl ConductionModel {
    /// Create a model over `edges`.
    pub fn new(edges: Vec<(usize, usize)>) -> Self {
        Self {
            edges,
            variables: Vec::new(),
        }
    }

    /// A 1-D chain `0-1-2-...-(nodes-1)`.
    pub fn chain(nodes: usize) -> Self {
        let edges = (1..nodes).map(|i| (i - 1, i)).collect();
        Self::new(edges)
    }

    /// Add a variable with default parameters and conductance `g`.
    pub fn with_variable(self, name: impl Into<String>, conductance: f64) -> Self {
        self.with_params(ConductionVariable::new(name, conductance))
    }

    /// Add a fully parameterised variable.
    pub fn with_params(mut self, variable: ConductionVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    fn assemble_static(&self, region: &Region, out: &mut Contributions) -> Result<()> {
        let load_matrix = out.what_to_load().loads_matrix();

        for (v, var) in self.variables.iter().enumerate() {
            let g = var.conductance;
            for &(a, b) in &self.edges {
                let ea = region.equation_number(v, a)?;
                let eb = region.equation_number(v, b)?;
                let flux = g * (region.value(v, a)? - region.value(v, b)?);

                out.add_rhs(ea, flux);
                out.add_rhs(eb, -flux);
                if load_matrix {
                    out.add_matrix(ea, ea, g);
                    out.add_matrix(ea, eb, -g);
                    out.add_matrix(eb, eb, g);
                    out.add_matrix(eb, ea, -g);
                }
            }

            if var.nonlinear == 0.0 && var.generation == 0.0 {
                continue;
            }
            for node in 0..region.num_nodes() {
                let e = region.equation_number(v, node)?;
                let u = region.value(v, node)?;
                out.add_rhs(e, var.nonlinear * u * u * u - var.generation);
                if load_matrix && var.nonlinear != 0.0 {
                    out.add_matrix(e, e, 3.0 * var.nonlinear * u * u);
                }
            }
        }
        Ok(())
    }

    fn assemble_time(&self, region: &Region, out: &mut Contributions) -> Result<()> {
        for (v, var) in self.variables.iter().enumerate() {
            if var.capacitance == 0.0 {
                continue;
            }
            for node in 0..region.num_nodes() {
                let e = region.equation_number(v, node)?;
                out.add_rhs(e, var.capacitance * region.value(v, node)?);
                out.add_matrix(e, e, var.capacitance);
            }
        }
        Ok(())
    }
}

impl RegionModel for ConductionModel {
    fn model_name(&self) -> &str {
        "conduction"
    }

    fn variables(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    fn validate(&self, num_nodes: usize) -> Result<()> {
        if self.variables.is_empty() {
            return Err(DeviceError::InvalidConfig {
                message: "conduction model has no variables".to_string(),
            });
        }
        for &(a, b) in &self.edges {
            if a >= num_nodes || b >= num_nodes || a == b {
                return Err(DeviceError::InvalidConfig {
                    message: format!("edge ({}, {}) invalid for {} nodes", a, b, num_nodes),
                });
            }
        }
        Ok(())
    }

    fn assemble(&self, region: &Region, out: &mut Contributions, time_mode: TimeMode) -> Result<()> {
        match time_mode {
            TimeMode::Dc => self.assemble_static(region, out),
            TimeMode::Time => self.assemble_time(region, out),
        }
    }

    fn node_flux(&self, region: &Region, variable: usize, node: usize) -> f64 {
        let (g, u) = match (self.variables.get(variable), region.state().dc.get(variable)) {
            (Some(var), Some(values)) => (var.conductance, values),
            _ => return 0.0,
        };
        // edges were checked against the node count in `validate`
        self.edges
            .iter()
            .filter_map(|&(a, b)| {
                if a == node {
                    Some(g * (u[a] - u[b]))
                } else if b == node {
                    Some(g * (u[b] - u[a]))
                } else {
                    None
                }
            })
            .sum()
    }
}
