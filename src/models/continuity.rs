//! Continuity interface: one physical value at coincident nodes.

use crate::assembly::{Contributions, PermutationEntry, TimeMode};
use crate::device::{InterfaceSite, Region};
use crate::error::{DeviceError, Result};

use super::InterfaceModel;

/// Merges the two regions' unknowns of `variable` at each shared node.
///
/// The second region's row is redirected into the first region's row, so
/// the retained row carries the summed flux (scaled by `flux_scale`). The
/// freed row is replaced by `u1 - u0 = 0`.
#[derive(Debug, Clone)]
pub struct ContinuityInterface {
    variable: String,
    flux_scale: f64,
    signals: usize,
}

impl ContinuityInterface {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            flux_scale: 1.0,
            signals: 0,
        }
    }

    /// Scale applied to the second region's flux when merged.
    pub fn with_flux_scale(mut self, flux_scale: f64) -> Self {
        self.flux_scale = flux_scale;
        self
    }

    /// Number of invalidation signals received.
    pub fn signals(&self) -> usize {
        self.signals
    }
}

impl InterfaceModel for ContinuityInterface {
    fn model_name(&self) -> &str {
        "continuity"
    }

    fn assemble(
        &self,
        site: &InterfaceSite<'_>,
        region0: &Region,
        region1: &Region,
        out: &mut Contributions,
        time_mode: TimeMode,
    ) -> Result<()> {
        if site.nodes0.len() != site.nodes1.len() {
            return Err(DeviceError::assembly_failure(
                "interface",
                site.name,
                "node lists of the two regions differ in length",
            ));
        }
        let v0 = region0.variable_index(&self.variable)?;
        let v1 = region1.variable_index(&self.variable)?;

        for (&n0, &n1) in site.nodes0.iter().zip(site.nodes1) {
            let e0 = region0.equation_number(v0, n0)?;
            let e1 = region1.equation_number(v1, n1)?;
            out.register_permutation(e1, PermutationEntry::redirect(e0).with_scale(self.flux_scale));
            if time_mode == TimeMode::Dc {
                out.add_matrix(e1, e1, 1.0);
                out.add_matrix(e1, e0, -1.0);
                out.add_rhs(e1, region1.value(v1, n1)? - region0.value(v0, n0)?);
            }
        }
        Ok(())
    }

    fn signal(&mut self, _quantity: &str, _region: &str) {
        self.signals += 1;
    }
}
