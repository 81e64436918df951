//! Interfaces: coupling objects joining two regions at shared nodes.

use super::region::Region;
use super::types::CoordinateId;
use crate::assembly::{Contributions, TimeMode};
use crate::error::Result;
use crate::models::InterfaceModel;

/// Where an interface sits: both regions and the local node pairs it joins.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceSite<'a> {
    pub name: &'a str,
    pub regions: [&'a str; 2],
    pub coordinates: &'a [CoordinateId],
    /// Local node in the first region of each shared coordinate.
    pub nodes0: &'a [usize],
    /// Local node in the second region of each shared coordinate.
    pub nodes1: &'a [usize],
}

/// A coupling object bound to exactly two regions.
#[derive(Debug)]
pub struct Interface {
    name: String,
    regions: [String; 2],
    coordinates: Vec<CoordinateId>,
    nodes0: Vec<usize>,
    nodes1: Vec<usize>,
    model: Box<dyn InterfaceModel>,
}

impl Interface {
    /// Create an interface between `region0` and `region1` over shared
    /// `coordinates`.
    pub fn new(
        name: impl Into<String>,
        region0: impl Into<String>,
        region1: impl Into<String>,
        coordinates: Vec<CoordinateId>,
        model: impl InterfaceModel + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            regions: [region0.into(), region1.into()],
            coordinates,
            nodes0: Vec::new(),
            nodes1: Vec::new(),
            model: Box::new(model),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region_names(&self) -> [&str; 2] {
        [&self.regions[0], &self.regions[1]]
    }

    /// Whether `region` is one of the two joined regions.
    pub fn touches_region(&self, region: &str) -> bool {
        self.regions[0] == region || self.regions[1] == region
    }

    pub fn coordinates(&self) -> &[CoordinateId] {
        &self.coordinates
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub(crate) fn coordinates_mut(&mut self) -> &mut Vec<CoordinateId> {
        &mut self.coordinates
    }

    pub(crate) fn bind(&mut self, nodes0: Vec<usize>, nodes1: Vec<usize>) {
        self.nodes0 = nodes0;
        self.nodes1 = nodes1;
    }

    /// Run the model's assembly hook against both regions.
    pub fn assemble(
        &self,
        region0: &Region,
        region1: &Region,
        out: &mut Contributions,
        time_mode: TimeMode,
    ) -> Result<()> {
        let site = InterfaceSite {
            name: &self.name,
            regions: self.region_names(),
            coordinates: &self.coordinates,
            nodes0: &self.nodes0,
            nodes1: &self.nodes1,
        };
        self.model.assemble(&site, region0, region1, out, time_mode)
    }

    /// Tell the model that `quantity` on `region` changed.
    pub(crate) fn signal_callbacks(&mut self, quantity: &str, region: &str) {
        self.model.signal(quantity, region);
    }
}
