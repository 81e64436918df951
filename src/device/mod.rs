//! Device representation and orchestration.
//!
//! A [`Device`] owns every [`Region`], [`Contact`], [`Interface`] and
//! [`Coordinate`] for its whole lifetime; nothing is ever removed, so ids and
//! equation ranges handed out stay valid. The device assigns each region a
//! contiguous block of global equation numbers, drives the three assembly
//! passes, and fans solved vectors back out to the regions.

mod contact;
mod index;
mod interface;
mod region;
mod types;
mod validate;

pub use contact::{Contact, ContactSite};
pub use index::CoordinateIndex;
pub use interface::{Interface, InterfaceSite};
pub use region::{Region, RegionState};
pub use types::*;
pub use validate::validate_device;

use std::collections::HashSet;

use indexmap::IndexMap;
use log::{debug, warn};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::assembly::{
    Assembly, AssemblyConfig, AssemblyPass, Contributions, PermutationMap, RhsEntry, TimeMode,
    Triplet, WhatToLoad,
};
use crate::error::{DeviceError, Result};

/// A spatially decomposed device model.
#[derive(Debug)]
pub struct Device {
    name: String,
    dimension: usize,
    config: AssemblyConfig,

    /// Regions by name, in registration order
    regions: IndexMap<String, Region>,
    /// Contacts by name; position is the `ContactId`
    contacts: IndexMap<String, Contact>,
    /// Interfaces by name; position is the `InterfaceId`
    interfaces: IndexMap<String, Interface>,
    coordinates: Vec<Coordinate>,

    coordinate_to_contact: CoordinateIndex<ContactId>,
    coordinate_to_interface: CoordinateIndex<InterfaceId>,

    /// Unset until `set_base_equation_number`
    base_equation: Option<usize>,
    /// Every tag passed to `backup_solutions`
    backup_tags: HashSet<String>,

    abs_error: f64,
    rel_error: f64,
}

impl Device {
    /// Create an empty device with the default assembly configuration.
    pub fn new(name: impl Into<String>, dimension: usize) -> Result<Self> {
        Self::with_config(name, dimension, AssemblyConfig::default())
    }

    /// Create an empty device with a custom assembly configuration.
    pub fn with_config(
        name: impl Into<String>,
        dimension: usize,
        config: AssemblyConfig,
    ) -> Result<Self> {
        let name = name.into();
        if !(1..=3).contains(&dimension) {
            return Err(DeviceError::InvalidDimension {
                device: name,
                dimension,
            });
        }
        Ok(Self {
            name,
            dimension,
            config,
            regions: IndexMap::new(),
            contacts: IndexMap::new(),
            interfaces: IndexMap::new(),
            coordinates: Vec::new(),
            coordinate_to_contact: CoordinateIndex::new(),
            coordinate_to_interface: CoordinateIndex::new(),
            base_equation: None,
            backup_tags: HashSet::new(),
            abs_error: 0.0,
            rel_error: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    // ============ Setup ============

    /// Register a coordinate; indices are assigned `0, 1, 2, ...`.
    pub fn add_coordinate(&mut self, position: [f64; 3]) -> CoordinateId {
        let id = CoordinateId(self.coordinates.len());
        self.coordinates.push(Coordinate::new(id, position));
        id
    }

    /// Register several coordinates in order.
    pub fn add_coordinate_list<I>(&mut self, positions: I) -> Vec<CoordinateId>
    where
        I: IntoIterator<Item = [f64; 3]>,
    {
        positions
            .into_iter()
            .map(|p| self.add_coordinate(p))
            .collect()
    }

    fn check_coordinate(&self, owner: &str, coordinate: CoordinateId) -> Result<()> {
        if coordinate.0 < self.coordinates.len() {
            Ok(())
        } else {
            Err(DeviceError::CoordinateNotFound {
                owner: owner.to_string(),
                index: coordinate.0,
            })
        }
    }

    /// Register a region. Its coordinates must already be registered.
    pub fn add_region(&mut self, region: Region) -> Result<()> {
        if self.regions.contains_key(region.name()) {
            return Err(DeviceError::DuplicateName {
                kind: "region",
                name: region.name().to_string(),
            });
        }
        for &c in region.coordinates() {
            self.check_coordinate(region.name(), c)?;
        }

        debug!(
            "device '{}': add region '{}' ({} nodes, {} equations)",
            self.name,
            region.name(),
            region.num_nodes(),
            region.equation_count()
        );
        self.regions.insert(region.name().to_string(), region);

        if self.base_equation.is_some() {
            self.renumber();
        }
        Ok(())
    }

    /// Resolve `coordinates` to local nodes of `region`, collapsing repeats.
    fn resolve_nodes(
        &self,
        owner: &str,
        region: &Region,
        coordinates: &mut Vec<CoordinateId>,
    ) -> Result<Vec<usize>> {
        if coordinates.is_empty() {
            return Err(DeviceError::EmptyCoordinateSet {
                owner: owner.to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(coordinates.len());
        coordinates.retain(|c| seen.insert(*c));

        coordinates
            .iter()
            .map(|&c| {
                self.check_coordinate(owner, c)?;
                region
                    .node_of(c)
                    .ok_or_else(|| DeviceError::CoordinateNotInRegion {
                        owner: owner.to_string(),
                        region: region.name().to_string(),
                        index: c.0,
                    })
            })
            .collect()
    }

    fn lookup_region(&self, name: &str) -> Result<&Region> {
        self.regions
            .get(name)
            .ok_or_else(|| DeviceError::RegionNotFound {
                region: name.to_string(),
            })
    }

    /// Register a contact on an existing region.
    pub fn add_contact(&mut self, mut contact: Contact) -> Result<ContactId> {
        if self.contacts.contains_key(contact.name()) {
            return Err(DeviceError::DuplicateName {
                kind: "contact",
                name: contact.name().to_string(),
            });
        }
        let region = self.lookup_region(contact.region_name())?;
        let name = contact.name().to_string();
        let nodes = self.resolve_nodes(&name, region, contact.coordinates_mut())?;
        contact.bind(nodes);

        let id = ContactId(self.contacts.len());
        self.coordinate_to_contact
            .insert_all(id, contact.coordinates());
        debug!(
            "device '{}': add contact '{}' on region '{}' ({} nodes)",
            self.name,
            name,
            contact.region_name(),
            contact.coordinates().len()
        );
        self.contacts.insert(name, contact);
        Ok(id)
    }

    /// Register an interface between two distinct existing regions.
    pub fn add_interface(&mut self, mut interface: Interface) -> Result<InterfaceId> {
        if self.interfaces.contains_key(interface.name()) {
            return Err(DeviceError::DuplicateName {
                kind: "interface",
                name: interface.name().to_string(),
            });
        }
        let [r0, r1] = interface.region_names();
        if r0 == r1 {
            return Err(DeviceError::SameRegionInterface {
                interface: interface.name().to_string(),
                region: r0.to_string(),
            });
        }
        let (r0, r1) = (r0.to_string(), r1.to_string());
        let region0 = self.lookup_region(&r0)?;
        let region1 = self.lookup_region(&r1)?;

        let name = interface.name().to_string();
        let nodes0 = self.resolve_nodes(&name, region0, interface.coordinates_mut())?;
        let nodes1 = self.resolve_nodes(&name, region1, interface.coordinates_mut())?;
        interface.bind(nodes0, nodes1);

        let id = InterfaceId(self.interfaces.len());
        self.coordinate_to_interface
            .insert_all(id, interface.coordinates());
        debug!(
            "device '{}': add interface '{}' between '{}' and '{}' ({} nodes)",
            self.name,
            name,
            r0,
            r1,
            interface.coordinates().len()
        );
        self.interfaces.insert(name, interface);
        Ok(id)
    }

    // ============ Numbering ============

    /// Set the global offset regions are numbered from.
    pub fn set_base_equation_number(&mut self, base: usize) {
        self.base_equation = Some(base);
        self.renumber();
    }

    /// The global offset; an error before it has been set.
    pub fn base_equation_number(&self) -> Result<usize> {
        self.base_equation.ok_or_else(|| {
            DeviceError::invalid_state(format!(
                "base equation number of device '{}' read before being set",
                self.name
            ))
        })
    }

    pub fn is_numbered(&self) -> bool {
        self.base_equation.is_some()
    }

    /// Assign region offsets in registration order and return
    /// `base + Σ equation counts`.
    pub fn calc_max_equation_number(&mut self) -> Result<usize> {
        self.base_equation_number()?;
        Ok(self.renumber())
    }

    /// `base + Σ equation counts` without touching region offsets.
    pub fn max_equation_number(&self) -> Result<usize> {
        let base = self.base_equation_number()?;
        Ok(base + self.regions.values().map(Region::equation_count).sum::<usize>())
    }

    fn renumber(&mut self) -> usize {
        let mut next = self.base_equation.unwrap_or(0);
        for region in self.regions.values_mut() {
            region.set_offset(next);
            next += region.equation_count();
        }
        debug!(
            "device '{}': numbered {} regions, equations {}..{}",
            self.name,
            self.regions.len(),
            self.base_equation.unwrap_or(0),
            next
        );
        next
    }

    // ============ Assembly ============

    /// Run `hook` for every item, sequentially or on the rayon pool.
    ///
    /// Output order always follows `items`.
    fn run_pass<'a, T, F>(
        &self,
        items: &[&'a T],
        what: WhatToLoad,
        hook: F,
    ) -> Result<Vec<Contributions>>
    where
        T: Sync + ?Sized,
        F: Fn(&'a T, &mut Contributions) -> Result<()> + Send + Sync,
    {
        let work = |item: &&'a T| -> Result<Contributions> {
            let mut out = Contributions::new(what);
            hook(*item, &mut out)?;
            Ok(out)
        };
        if self.config.use_parallel(items.len()) {
            items.par_iter().map(work).collect()
        } else {
            items.iter().map(work).collect()
        }
    }

    fn check_range(kind: &str, name: &str, out: &Contributions, size: usize) -> Result<()> {
        let bad = out
            .triplets()
            .iter()
            .flat_map(|t| [t.row, t.col])
            .chain(out.rhs().iter().map(|r| r.index))
            .chain(
                out.permutations()
                    .iter()
                    .flat_map(|(i, e)| std::iter::once(*i).chain(e.target())),
            )
            .find(|&i| i >= size);
        match bad {
            Some(index) => Err(DeviceError::EquationOutOfRange {
                source_name: format!("{} '{}'", kind, name),
                index,
                size,
            }),
            None => Ok(()),
        }
    }

    fn register_all(
        permutations: &mut PermutationMap,
        pass: AssemblyPass,
        name: &str,
        out: &Contributions,
    ) -> Result<()> {
        for (index, entry) in out.permutations() {
            permutations.insert(*index, *entry, pass, name)?;
        }
        Ok(())
    }

    /// Contact pass: boundary rows appended as-is, eliminations registered.
    pub fn contact_assemble(
        &self,
        triplets: &mut Vec<Triplet>,
        rhs: &mut Vec<RhsEntry>,
        permutations: &mut PermutationMap,
        what: WhatToLoad,
        time_mode: TimeMode,
    ) -> Result<()> {
        let size = self.max_equation_number()?;
        permutations.begin_pass(AssemblyPass::Contact)?;
        let items: Vec<&Contact> = self.contacts.values().collect();
        let outputs = self.run_pass(&items, what, |contact, out| {
            let region = self.lookup_region(contact.region_name())?;
            contact
                .assemble(region, out, time_mode)
                .map_err(|e| wrap_failure("contact", contact.name(), e))
        })?;

        for (contact, out) in items.iter().zip(outputs) {
            Self::check_range("contact", contact.name(), &out, size)?;
            Self::register_all(permutations, AssemblyPass::Contact, contact.name(), &out)?;
            let (t, r, _) = out.into_parts();
            triplets.extend(t);
            rhs.extend(r);
        }
        debug!(
            "device '{}': contact pass, {} contacts, {} permutations",
            self.name,
            items.len(),
            permutations.len()
        );
        Ok(())
    }

    /// Interface pass: coupling rows appended as-is, merges registered.
    pub fn interface_assemble(
        &self,
        triplets: &mut Vec<Triplet>,
        rhs: &mut Vec<RhsEntry>,
        permutations: &mut PermutationMap,
        what: WhatToLoad,
        time_mode: TimeMode,
    ) -> Result<()> {
        let size = self.max_equation_number()?;
        permutations.begin_pass(AssemblyPass::Interface)?;
        let items: Vec<&Interface> = self.interfaces.values().collect();
        let outputs = self.run_pass(&items, what, |interface, out| {
            let [n0, n1] = interface.region_names();
            let region0 = self.lookup_region(n0)?;
            let region1 = self.lookup_region(n1)?;
            interface
                .assemble(region0, region1, out, time_mode)
                .map_err(|e| wrap_failure("interface", interface.name(), e))
        })?;

        for (interface, out) in items.iter().zip(outputs) {
            Self::check_range("interface", interface.name(), &out, size)?;
            Self::register_all(
                permutations,
                AssemblyPass::Interface,
                interface.name(),
                &out,
            )?;
            let (t, r, _) = out.into_parts();
            triplets.extend(t);
            rhs.extend(r);
        }
        debug!(
            "device '{}': interface pass, {} interfaces, {} permutations",
            self.name,
            items.len(),
            permutations.len()
        );
        Ok(())
    }

    /// Region pass: bulk contributions routed through the registry.
    pub fn region_assemble(
        &self,
        triplets: &mut Vec<Triplet>,
        rhs: &mut Vec<RhsEntry>,
        permutations: &mut PermutationMap,
        what: WhatToLoad,
        time_mode: TimeMode,
    ) -> Result<()> {
        let size = self.max_equation_number()?;
        permutations.begin_pass(AssemblyPass::Region)?;
        let items: Vec<&Region> = self.regions.values().collect();
        let outputs = self.run_pass(&items, what, |region, out| {
            region
                .assemble(out, time_mode)
                .map_err(|e| wrap_failure("region", region.name(), e))
        })?;

        for (region, out) in items.iter().zip(&outputs) {
            Self::check_range("region", region.name(), out, size)?;
            Self::register_all(permutations, AssemblyPass::Region, region.name(), out)?;
        }
        let before = triplets.len();
        for out in &outputs {
            permutations.apply_triplets(out.triplets(), triplets);
            permutations.apply_rhs(out.rhs(), rhs);
        }
        debug!(
            "device '{}': region pass, {} regions, {} triplets",
            self.name,
            items.len(),
            triplets.len() - before
        );
        Ok(())
    }

    /// Run Contact → Interface → Region into a fresh [`Assembly`].
    pub fn assemble(&self, what: WhatToLoad, time_mode: TimeMode) -> Result<Assembly> {
        validate_device(self)?;
        let mut assembly = Assembly::new(self.max_equation_number()?);
        let Assembly {
            triplets,
            rhs,
            permutations,
            ..
        } = &mut assembly;

        self.contact_assemble(triplets, rhs, permutations, what, time_mode)?;
        self.interface_assemble(triplets, rhs, permutations, what, time_mode)?;
        self.region_assemble(triplets, rhs, permutations, what, time_mode)?;
        Ok(assembly)
    }

    // ============ Update ============

    fn check_len(&self, operation: &'static str, actual: usize) -> Result<usize> {
        let expected = self.max_equation_number()?;
        if expected != actual {
            return Err(DeviceError::size_mismatch(operation, expected, actual));
        }
        Ok(expected)
    }

    fn check_dc_state(&self) -> Result<()> {
        match self.regions.values().find(|r| !r.has_dc_solution()) {
            Some(region) => Err(DeviceError::MissingDcSolution {
                region: region.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Apply a real Newton correction to every region.
    pub fn update(&mut self, result: &[f64]) -> Result<()> {
        self.check_len("Device::update", result.len())?;
        self.abs_error = 0.0;
        self.rel_error = 0.0;
        for region in self.regions.values_mut() {
            region.update(result)?;
            self.abs_error = self.abs_error.max(region.abs_error());
            self.rel_error = self.rel_error.max(region.rel_error());
        }
        debug!(
            "device '{}': update abs {:.3e} rel {:.3e}",
            self.name, self.abs_error, self.rel_error
        );
        Ok(())
    }

    /// Store a small-signal solution in every region.
    pub fn ac_update(&mut self, result: &[Complex64]) -> Result<()> {
        self.check_len("Device::ac_update", result.len())?;
        self.check_dc_state()?;
        for region in self.regions.values_mut() {
            region.ac_update(result)?;
        }
        Ok(())
    }

    /// Store a noise solution for `output`, undoing the row permutation.
    pub fn noise_update(
        &mut self,
        output: &str,
        permvec: &[usize],
        result: &[Complex64],
    ) -> Result<()> {
        let size = self.check_len("Device::noise_update", result.len())?;
        if permvec.len() != size {
            return Err(DeviceError::size_mismatch(
                "Device::noise_update (permutation vector)",
                size,
                permvec.len(),
            ));
        }
        if let Some((position, &target)) = permvec.iter().enumerate().find(|(_, &t)| t >= size) {
            return Err(DeviceError::PermutationIndexOutOfRange {
                position,
                target,
                size,
            });
        }
        self.check_dc_state()?;
        for region in self.regions.values_mut() {
            region.noise_update(output, permvec, result)?;
        }
        debug!("device '{}': noise update for '{}'", self.name, output);
        Ok(())
    }

    /// Refresh contact-derived quantities from the latest region state.
    pub fn update_contacts(&mut self) -> Result<()> {
        if let Some(region) = self.regions.values().find(|r| !r.has_dc_solution()) {
            return Err(DeviceError::invalid_state(format!(
                "update_contacts before any update: region '{}' has no solution",
                region.name()
            )));
        }
        for contact in self.contacts.values_mut() {
            let region = self.regions.get(contact.region_name()).ok_or_else(|| {
                DeviceError::RegionNotFound {
                    region: contact.region_name().to_string(),
                }
            })?;
            contact.update(region)?;
        }
        Ok(())
    }

    /// Largest absolute correction of the last update.
    pub fn abs_error(&self) -> f64 {
        self.abs_error
    }

    /// Largest relative correction of the last update.
    pub fn rel_error(&self) -> f64 {
        self.rel_error
    }

    // ============ Backup / Restore ============

    /// Snapshot every region's solution state under `tag`.
    pub fn backup_solutions(&mut self, tag: &str) {
        for region in self.regions.values_mut() {
            region.backup(tag);
        }
        self.backup_tags.insert(tag.to_string());
        debug!("device '{}': backup '{}'", self.name, tag);
    }

    /// Roll every region back to `tag`. Fails without changes if any region
    /// lacks the snapshot.
    pub fn restore_solutions(&mut self, tag: &str) -> Result<()> {
        if !self.backup_tags.contains(tag) {
            return Err(DeviceError::UnknownBackup {
                tag: tag.to_string(),
                owner: self.name.clone(),
            });
        }
        // regions added after the backup lack the snapshot
        if let Some(region) = self.regions.values().find(|r| !r.has_backup(tag)) {
            return Err(DeviceError::UnknownBackup {
                tag: tag.to_string(),
                owner: region.name().to_string(),
            });
        }
        for region in self.regions.values_mut() {
            region.restore(tag)?;
        }
        debug!("device '{}': restore '{}'", self.name, tag);
        Ok(())
    }

    // ============ Coordinate queries ============

    pub fn number_of_interfaces_on_coordinate(&self, coordinate: CoordinateId) -> usize {
        self.coordinate_to_interface.count(coordinate)
    }

    pub fn number_of_contacts_on_coordinate(&self, coordinate: CoordinateId) -> usize {
        self.coordinate_to_contact.count(coordinate)
    }

    pub fn coordinate_index_to_contact(&self) -> &CoordinateIndex<ContactId> {
        &self.coordinate_to_contact
    }

    pub fn coordinate_index_to_interface(&self) -> &CoordinateIndex<InterfaceId> {
        &self.coordinate_to_interface
    }

    /// Contacts touching `coordinate`, in registration order.
    pub fn contacts_on_coordinate(
        &self,
        coordinate: CoordinateId,
    ) -> impl Iterator<Item = &Contact> + '_ {
        self.coordinate_to_contact
            .get(coordinate)
            .iter()
            .filter_map(move |id| self.contacts.get_index(id.0).map(|(_, c)| c))
    }

    /// Interfaces touching `coordinate`, in registration order.
    pub fn interfaces_on_coordinate(
        &self,
        coordinate: CoordinateId,
    ) -> impl Iterator<Item = &Interface> + '_ {
        self.coordinate_to_interface
            .get(coordinate)
            .iter()
            .filter_map(move |id| self.interfaces.get_index(id.0).map(|(_, i)| i))
    }

    // ============ Callbacks ============

    /// Tell every interface on `region` that `quantity` changed.
    pub fn signal_callbacks_on_interface(&mut self, quantity: &str, region: &str) {
        if !self.regions.contains_key(region) {
            warn!(
                "device '{}': signal '{}' for unknown region '{}' ignored",
                self.name, quantity, region
            );
            return;
        }
        let mut notified = 0usize;
        for interface in self
            .interfaces
            .values_mut()
            .filter(|i| i.touches_region(region))
        {
            interface.signal_callbacks(quantity, region);
            notified += 1;
        }
        debug!(
            "device '{}': signal '{}' on region '{}' reached {} interfaces",
            self.name, quantity, region, notified
        );
    }

    // ============ Accessors ============

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn coordinate(&self, id: CoordinateId) -> Option<&Coordinate> {
        self.coordinates.get(id.0)
    }

    pub fn regions(&self) -> &IndexMap<String, Region> {
        &self.regions
    }

    pub fn contacts(&self) -> &IndexMap<String, Contact> {
        &self.contacts
    }

    pub fn interfaces(&self) -> &IndexMap<String, Interface> {
        &self.interfaces
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    /// Mutable access for setting initial solutions.
    pub fn region_mut(&mut self, name: &str) -> Option<&mut Region> {
        self.regions.get_mut(name)
    }

    pub fn contact(&self, name: &str) -> Option<&Contact> {
        self.contacts.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }
}

/// Attach the collaborator's identity to a hook failure.
fn wrap_failure(kind: &'static str, name: &str, err: DeviceError) -> DeviceError {
    match err {
        e @ DeviceError::AssemblyFailure { .. } => e,
        other => DeviceError::assembly_failure(kind, name, other.to_string()),
    }
}
