//! Contact models: fixed value and fixed current.

use crate::assembly::{Contributions, PermutationEntry, TimeMode};
use crate::device::{ContactSite, Region};
use crate::error::Result;

use super::ContactModel;

/// Fixed-value contact.
///
/// Eliminates the region's row for `variable` at every contact node and
/// replaces it with `u - value = 0`. After an update, `"current"` holds the
/// summed bulk flux leaving the contact nodes.
#[derive(Debug, Clone)]
pub struct OhmicContact {
    variable: String,
    value: f64,
    current: f64,
}

impl OhmicContact {
    pub fn new(variable: impl Into<String>, value: f64) -> Self {
        Self {
            variable: variable.into(),
            value,
            current: 0.0,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

impl ContactModel for OhmicContact {
    fn model_name(&self) -> &str {
        "ohmic"
    }

    fn assemble(
        &self,
        site: &ContactSite<'_>,
        region: &Region,
        out: &mut Contributions,
        time_mode: TimeMode,
    ) -> Result<()> {
        let v = region.variable_index(&self.variable)?;
        for &node in site.nodes {
            let eq = region.equation_number(v, node)?;
            out.register_permutation(eq, PermutationEntry::eliminate());
            if time_mode == TimeMode::Dc {
                out.add_matrix(eq, eq, 1.0);
                out.add_rhs(eq, region.value(v, node)? - self.value);
            }
        }
        Ok(())
    }

    fn update(&mut self, site: &ContactSite<'_>, region: &Region) -> Result<()> {
        let v = region.variable_index(&self.variable)?;
        self.current = site.nodes.iter().map(|&n| region.node_flux(v, n)).sum();
        Ok(())
    }

    fn quantity(&self, name: &str) -> Option<f64> {
        match name {
            "current" => Some(self.current),
            "value" => Some(self.value),
            _ => None,
        }
    }
}

/// Fixed-current contact.
///
/// Injects `current` split evenly across the contact nodes; no rows are
/// eliminated. After an update, `"value"` holds the mean of `variable` over
/// the contact nodes.
#[derive(Debug, Clone)]
pub struct FluxContact {
    variable: String,
    current: f64,
    mean_value: f64,
}

impl FluxContact {
    pub fn new(variable: impl Into<String>, current: f64) -> Self {
        Self {
            variable: variable.into(),
            current,
            mean_value: 0.0,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn mean_value(&self) -> f64 {
        self.mean_value
    }
}

impl ContactModel for FluxContact {
    fn model_name(&self) -> &str {
        "flux"
    }

    fn assemble(
        &self,
        site: &ContactSite<'_>,
        region: &Region,
        out: &mut Contributions,
        time_mode: TimeMode,
    ) -> Result<()> {
        if time_mode == TimeMode::Time || site.nodes.is_empty() {
            return Ok(());
        }
        let v = region.variable_index(&self.variable)?;
        let share = self.current / site.nodes.len() as f64;
        for &node in site.nodes {
            let eq = region.equation_number(v, node)?;
            out.add_rhs(eq, -share);
        }
        Ok(())
    }

    fn update(&mut self, site: &ContactSite<'_>, region: &Region) -> Result<()> {
        let v = region.variable_index(&self.variable)?;
        if site.nodes.is_empty() {
            return Ok(());
        }
        let sum = site
            .nodes
            .iter()
            .map(|&n| region.value(v, n))
            .sum::<Result<f64>>()?;
        self.mean_value = sum / site.nodes.len() as f64;
        Ok(())
    }

    fn quantity(&self, name: &str) -> Option<f64> {
        match name {
            "current" => Some(self.current),
            "value" => Some(self.mean_value),
            _ => None,
        }
    }
}
