//! Contacts: boundary-condition objects attached to one region.

use super::region::Region;
use super::types::CoordinateId;
use crate::assembly::{Contributions, TimeMode};
use crate::error::Result;
use crate::models::ContactModel;

/// Where a contact sits: its region and the region-local nodes it touches.
#[derive(Debug, Clone, Copy)]
pub struct ContactSite<'a> {
    pub name: &'a str,
    pub region: &'a str,
    pub coordinates: &'a [CoordinateId],
    /// Region-local node of each coordinate, same order.
    pub nodes: &'a [usize],
}

/// A boundary object bound to exactly one region.
#[derive(Debug)]
pub struct Contact {
    name: String,
    region: String,
    coordinates: Vec<CoordinateId>,
    nodes: Vec<usize>,
    model: Box<dyn ContactModel>,
}

impl Contact {
    /// Create a contact on `region` over `coordinates`.
    ///
    /// The coordinates are checked against the region when the contact is
    /// added to a device.
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        coordinates: Vec<CoordinateId>,
        model: impl ContactModel + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            coordinates,
            nodes: Vec::new(),
            model: Box::new(model),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region_name(&self) -> &str {
        &self.region
    }

    pub fn coordinates(&self) -> &[CoordinateId] {
        &self.coordinates
    }

    /// Region-local nodes, resolved at registration.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// A derived quantity, refreshed by `Device::update_contacts`.
    pub fn quantity(&self, name: &str) -> Option<f64> {
        self.model.quantity(name)
    }

    pub(crate) fn coordinates_mut(&mut self) -> &mut Vec<CoordinateId> {
        &mut self.coordinates
    }

    pub(crate) fn bind(&mut self, nodes: Vec<usize>) {
        self.nodes = nodes;
    }

    fn site(&self) -> ContactSite<'_> {
        make_site(&self.name, &self.region, &self.coordinates, &self.nodes)
    }

    /// Run the model's assembly hook against the contact's region.
    pub fn assemble(
        &self,
        region: &Region,
        out: &mut Contributions,
        time_mode: TimeMode,
    ) -> Result<()> {
        self.model.assemble(&self.site(), region, out, time_mode)
    }

    /// Refresh derived quantities from the region's latest state.
    pub(crate) fn update(&mut self, region: &Region) -> Result<()> {
        // borrow the site fields apart from the model
        let site = make_site(&self.name, &self.region, &self.coordinates, &self.nodes);
        self.model.update(&site, region)
    }
}

fn make_site<'a>(
    name: &'a str,
    region: &'a str,
    coordinates: &'a [CoordinateId],
    nodes: &'a [usize],
) -> ContactSite<'a> {
    ContactSite {
        name,
        region,
        coordinates,
        nodes,
    }
}
