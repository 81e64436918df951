//! Integration tests for device setup and three-pass assembly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use num_complex::Complex64;
use semidev_core::assembly::{Contributions, PermutationMap, TimeMode, WhatToLoad};
use semidev_core::device::{InterfaceSite, Region};
use semidev_core::models::{
    ConductionModel, ConductionVariable, ContinuityInterface, FluxContact, InterfaceModel,
    OhmicContact, RegionModel,
};
use semidev_core::solver::LinearSystem;
use semidev_core::{
    AssemblyConfig, Contact, CoordinateId, Device, DeviceError, Interface,
};

/// Two 1-D regions sharing the junction coordinate:
///
/// ```text
/// anode                junction                cathode
///   o----o----...----o====o----...----o----o
///   |<--- left (n) --->|<--- right (n) --->|
/// ```
fn two_region_device(n: usize, config: AssemblyConfig) -> (Device, Vec<CoordinateId>) {
    let mut device = Device::with_config("pn", 1, config).unwrap();
    let ids = device.add_coordinate_list((0..(2 * n - 1)).map(|i| [i as f64, 0.0, 0.0]));

    let left = ConductionModel::chain(n).with_variable("Potential", 2.0);
    let right = ConductionModel::chain(n).with_variable("Potential", 1.0);
    device
        .add_region(Region::new("left", ids[..n].to_vec(), left).unwrap())
        .unwrap();
    device
        .add_region(Region::new("right", ids[n - 1..].to_vec(), right).unwrap())
        .unwrap();
    (device, ids)
}

fn with_boundaries(device: &mut Device, ids: &[CoordinateId], n: usize) {
    device
        .add_contact(Contact::new(
            "anode",
            "left",
            vec![ids[0]],
            OhmicContact::new("Potential", 1.0),
        ))
        .unwrap();
    device
        .add_contact(Contact::new(
            "cathode",
            "right",
            vec![ids[2 * n - 2]],
            OhmicContact::new("Potential", 0.0),
        ))
        .unwrap();
    device
        .add_interface(Interface::new(
            "junction",
            "left",
            "right",
            vec![ids[n - 1]],
            ContinuityInterface::new("Potential"),
        ))
        .unwrap();
}

fn numbered_device(n: usize, config: AssemblyConfig) -> Device {
    let (mut device, ids) = two_region_device(n, config);
    with_boundaries(&mut device, &ids, n);
    device.set_base_equation_number(0);
    device
}

#[derive(Debug)]
struct FailingRegion;

impl RegionModel for FailingRegion {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn variables(&self) -> Vec<String> {
        vec!["Potential".to_string()]
    }

    fn assemble(&self, _region: &Region, _out: &mut Contributions, _time: TimeMode) -> semidev_core::Result<()> {
        Err(DeviceError::InvalidConfig {
            message: "mobility table missing".to_string(),
        })
    }
}

#[derive(Debug)]
struct CountingInterface {
    hits: Arc<AtomicUsize>,
}

impl InterfaceModel for CountingInterface {
    fn model_name(&self) -> &str {
        "counting"
    }

    fn assemble(
        &self,
        _site: &InterfaceSite<'_>,
        _region0: &Region,
        _region1: &Region,
        _out: &mut Contributions,
        _time: TimeMode,
    ) -> semidev_core::Result<()> {
        Ok(())
    }

    fn signal(&mut self, _quantity: &str, _region: &str) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_coordinate_reverse_indices() {
    let (mut device, ids) = two_region_device(3, AssemblyConfig::default());
    device
        .add_contact(Contact::new(
            "c1",
            "left",
            vec![ids[0], ids[0]],
            OhmicContact::new("Potential", 0.0),
        ))
        .unwrap();
    device
        .add_contact(Contact::new(
            "c2",
            "left",
            vec![ids[0], ids[1]],
            FluxContact::new("Potential", 1e-3),
        ))
        .unwrap();
    device
        .add_interface(Interface::new(
            "junction",
            "left",
            "right",
            vec![ids[2]],
            ContinuityInterface::new("Potential"),
        ))
        .unwrap();

    assert_eq!(device.contact("c1").unwrap().coordinates().len(), 1);
    assert_eq!(device.number_of_contacts_on_coordinate(ids[0]), 2);
    assert_eq!(device.number_of_contacts_on_coordinate(ids[1]), 1);
    assert_eq!(device.number_of_contacts_on_coordinate(ids[2]), 0);
    assert_eq!(device.number_of_interfaces_on_coordinate(ids[2]), 1);
    assert_eq!(device.number_of_interfaces_on_coordinate(ids[4]), 0);

    let names: Vec<&str> = device
        .contacts_on_coordinate(ids[0])
        .map(|c| c.name())
        .collect();
    assert_eq!(names, vec!["c1", "c2"]);
    let names: Vec<&str> = device
        .interfaces_on_coordinate(ids[2])
        .map(|i| i.name())
        .collect();
    assert_eq!(names, vec!["junction"]);

    // every listed contact really touches the coordinate
    for (coordinate, contacts) in device.coordinate_index_to_contact().iter() {
        for id in contacts {
            let (_, contact) = device.contacts().get_index(id.0).unwrap();
            assert!(contact.coordinates().contains(&coordinate));
        }
    }
}

#[test]
fn test_contact_setup_errors() {
    let (mut device, ids) = two_region_device(3, AssemblyConfig::default());

    let foreign = Contact::new("k", "left", vec![ids[4]], OhmicContact::new("Potential", 0.0));
    assert!(matches!(
        device.add_contact(foreign),
        Err(DeviceError::CoordinateNotInRegion { index: 4, .. })
    ));

    let missing = Contact::new("k", "bulk", vec![ids[0]], OhmicContact::new("Potential", 0.0));
    assert!(matches!(
        device.add_contact(missing),
        Err(DeviceError::RegionNotFound { .. })
    ));

    let empty = Contact::new("k", "left", vec![], OhmicContact::new("Potential", 0.0));
    assert!(matches!(
        device.add_contact(empty),
        Err(DeviceError::EmptyCoordinateSet { .. })
    ));

    let same = Interface::new("i", "left", "left", vec![ids[0]], ContinuityInterface::new("Potential"));
    assert!(matches!(
        device.add_interface(same),
        Err(DeviceError::SameRegionInterface { .. })
    ));

    assert!(device.contacts().is_empty());
    assert!(device.interfaces().is_empty());
    assert_eq!(device.number_of_contacts_on_coordinate(ids[0]), 0);
}

#[test]
fn test_assembly_is_deterministic() {
    let device = numbered_device(5, AssemblyConfig::default());
    let a = device.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc).unwrap();
    let b = device.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc).unwrap();
    assert_eq!(a.triplets, b.triplets);
    assert_eq!(a.rhs, b.rhs);
    assert_eq!(a.permutation_vector(), b.permutation_vector());
}

#[test]
fn test_parallel_assembly_matches_sequential() {
    let sequential = numbered_device(6, AssemblyConfig::new().with_parallel(false));
    let parallel = numbered_device(
        6,
        AssemblyConfig::new()
            .with_parallel(true)
            .with_min_parallel_items(1),
    );
    let s = sequential
        .assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc)
        .unwrap();
    let p = parallel
        .assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc)
        .unwrap();
    assert_eq!(s.triplets, p.triplets);
    assert_eq!(s.rhs, p.rhs);
    assert_eq!(s.size, p.size);
}

/// Equations for n = 3:
///
/// ```text
/// left  nodes 0 1 2 -> eq 0 1 2   (anode eliminates 0)
/// right nodes 0 1 2 -> eq 3 4 5   (junction redirects 3 -> 2, cathode eliminates 5)
/// ```
#[test]
fn test_eliminated_and_redirected_rows() {
    let device = numbered_device(3, AssemblyConfig::default());
    let assembly = device
        .assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc)
        .unwrap();
    assert_eq!(assembly.size, 6);

    // contact rows carry only the contact equation
    let row0: Vec<_> = assembly.triplets.iter().filter(|t| t.row == 0).collect();
    assert_eq!(row0.len(), 1);
    assert_eq!((row0[0].col, row0[0].value), (0, 1.0));

    let system = LinearSystem::from_assembly(&assembly).unwrap();
    // columns are not eliminated
    assert_eq!(system.get(1, 0), -2.0);
    // interface row replaced by u1 - u0
    assert_eq!(system.get(3, 3), 1.0);
    assert_eq!(system.get(3, 2), -1.0);
    assert_eq!(system.get(3, 4), 0.0);
    // right region's junction row merged into the left one
    assert_eq!(system.get(2, 2), 2.0);
    assert_eq!(system.get(2, 1), -2.0);
    assert_eq!(system.get(2, 3), 1.0);
    assert_eq!(system.get(2, 4), -1.0);

    assert_eq!(assembly.permutation_vector(), vec![0, 1, 2, 2, 4, 5]);
    assert_eq!(assembly.permutations.owner(0), Some("anode"));
    assert_eq!(assembly.permutations.owner(3), Some("junction"));
}

#[test]
fn test_cross_pass_permutation_conflict() {
    let (mut device, ids) = two_region_device(3, AssemblyConfig::default());
    // right region's junction node is claimed by both a contact and the interface
    device
        .add_contact(Contact::new(
            "tap",
            "right",
            vec![ids[2]],
            OhmicContact::new("Potential", 0.5),
        ))
        .unwrap();
    device
        .add_interface(Interface::new(
            "junction",
            "left",
            "right",
            vec![ids[2]],
            ContinuityInterface::new("Potential"),
        ))
        .unwrap();
    device.set_base_equation_number(0);

    assert!(matches!(
        device.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc),
        Err(DeviceError::PermutationConflict { index: 3, .. })
    ));
}

#[test]
fn test_identical_contact_claims_are_merged() {
    let (mut device, ids) = two_region_device(3, AssemblyConfig::default());
    for name in ["a", "b"] {
        device
            .add_contact(Contact::new(
                name,
                "left",
                vec![ids[0]],
                OhmicContact::new("Potential", 0.0),
            ))
            .unwrap();
    }
    device.set_base_equation_number(0);
    let assembly = device.assemble(WhatToLoad::MatrixOnly, TimeMode::Dc).unwrap();
    assert_eq!(assembly.permutations.owner(0), Some("a"));
}

#[test]
fn test_what_to_load() {
    let device = numbered_device(4, AssemblyConfig::default());
    let full = device.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc).unwrap();
    let rhs_only = device.assemble(WhatToLoad::RhsOnly, TimeMode::Dc).unwrap();
    let matrix_only = device.assemble(WhatToLoad::MatrixOnly, TimeMode::Dc).unwrap();

    assert!(rhs_only.triplets.is_empty());
    assert!(!rhs_only.rhs.is_empty());
    assert!(matrix_only.rhs.is_empty());
    assert_eq!(matrix_only.triplets, full.triplets);
    assert_eq!(rhs_only.rhs, full.rhs);
    assert_eq!(
        rhs_only.permutation_vector(),
        matrix_only.permutation_vector()
    );
}

#[test]
fn test_time_mode_loads_charge_only() {
    let mut device = Device::new("cap", 1).unwrap();
    let ids = device.add_coordinate_list((0..3).map(|i| [i as f64, 0.0, 0.0]));
    let model = ConductionModel::chain(3)
        .with_params(ConductionVariable::new("Potential", 1.0).with_capacitance(4.0));
    device
        .add_region(Region::new("bulk", ids.clone(), model).unwrap())
        .unwrap();
    device
        .add_contact(Contact::new(
            "gate",
            "bulk",
            vec![ids[0]],
            OhmicContact::new("Potential", 1.0),
        ))
        .unwrap();
    device.set_base_equation_number(0);

    let time = device.assemble(WhatToLoad::MatrixOnly, TimeMode::Time).unwrap();
    // node 0 is eliminated; nodes 1 and 2 keep their capacitance
    assert_eq!(time.triplets.len(), 2);
    assert!(time.triplets.iter().all(|t| t.row == t.col && t.value == 4.0));
    assert!(time.permutations.contains(0));
}

#[test]
fn test_collaborator_failure_is_attributed() {
    let mut device = Device::new("bad", 1).unwrap();
    let ids = device.add_coordinate_list([[0.0; 3], [1.0, 0.0, 0.0]]);
    device
        .add_region(Region::new("oxide", ids, FailingRegion).unwrap())
        .unwrap();
    device.set_base_equation_number(0);

    match device.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc) {
        Err(DeviceError::AssemblyFailure { kind, name, message }) => {
            assert_eq!(kind, "region");
            assert_eq!(name, "oxide");
            assert!(message.contains("mobility table missing"));
        }
        other => panic!("expected assembly failure, got {:?}", other),
    }
}

#[test]
fn test_assemble_before_numbering_fails() {
    let (device, _) = two_region_device(3, AssemblyConfig::default());
    assert!(matches!(
        device.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc),
        Err(DeviceError::InvalidState { .. })
    ));
}

#[test]
fn test_update_size_mismatch() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    assert!(matches!(
        device.update(&[0.0; 5]),
        Err(DeviceError::SizeMismatch {
            expected: 6,
            actual: 5,
            ..
        })
    ));
    assert!(!device.region("left").unwrap().has_dc_solution());
}

#[test]
fn test_ac_and_noise_length_checks() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    device.update(&[0.0; 6]).unwrap();
    let short = vec![Complex64::new(1.0, 0.0); 5];
    let full = vec![Complex64::new(1.0, 0.0); 6];
    let identity: Vec<usize> = (0..6).collect();

    assert!(matches!(
        device.ac_update(&short),
        Err(DeviceError::SizeMismatch {
            expected: 6,
            actual: 5,
            ..
        })
    ));
    assert!(matches!(
        device.noise_update("out", &identity, &short),
        Err(DeviceError::SizeMismatch {
            expected: 6,
            actual: 5,
            ..
        })
    ));
    assert!(matches!(
        device.noise_update("out", &identity[..4], &full),
        Err(DeviceError::SizeMismatch {
            expected: 6,
            actual: 4,
            ..
        })
    ));

    // nothing was stored by the rejected calls
    let left = device.region("left").unwrap();
    assert!(left.noise_solution("out", "Potential").is_none());
    assert_eq!(
        left.ac_solution("Potential").unwrap(),
        &[Complex64::new(0.0, 0.0); 3]
    );
}

#[test]
fn test_passes_out_of_order_are_rejected() {
    let device = numbered_device(3, AssemblyConfig::default());
    let mut triplets = Vec::new();
    let mut rhs = Vec::new();
    let mut permutations = PermutationMap::new();

    device
        .region_assemble(
            &mut triplets,
            &mut rhs,
            &mut permutations,
            WhatToLoad::MatrixAndRhs,
            TimeMode::Dc,
        )
        .unwrap();
    let before = triplets.len();
    assert!(matches!(
        device.contact_assemble(
            &mut triplets,
            &mut rhs,
            &mut permutations,
            WhatToLoad::MatrixAndRhs,
            TimeMode::Dc,
        ),
        Err(DeviceError::InvalidState { .. })
    ));
    assert!(matches!(
        device.interface_assemble(
            &mut triplets,
            &mut rhs,
            &mut permutations,
            WhatToLoad::MatrixAndRhs,
            TimeMode::Dc,
        ),
        Err(DeviceError::InvalidState { .. })
    ));
    assert_eq!(triplets.len(), before);
    assert!(!permutations.contains(0));
}

#[test]
fn test_passes_in_order_match_assemble() {
    let device = numbered_device(3, AssemblyConfig::default());
    let mut triplets = Vec::new();
    let mut rhs = Vec::new();
    let mut permutations = PermutationMap::new();
    let what = WhatToLoad::MatrixAndRhs;

    device
        .contact_assemble(&mut triplets, &mut rhs, &mut permutations, what, TimeMode::Dc)
        .unwrap();
    device
        .interface_assemble(&mut triplets, &mut rhs, &mut permutations, what, TimeMode::Dc)
        .unwrap();
    device
        .region_assemble(&mut triplets, &mut rhs, &mut permutations, what, TimeMode::Dc)
        .unwrap();

    let assembly = device.assemble(what, TimeMode::Dc).unwrap();
    assert_eq!(triplets, assembly.triplets);
    assert_eq!(rhs, assembly.rhs);
}

#[test]
fn test_update_applies_correction_and_errors() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    device
        .update(&[-1.0, -2.0, -3.0, 0.0, 0.0, 0.5])
        .unwrap();
    assert_eq!(
        device.region("left").unwrap().solution("Potential").unwrap(),
        &[1.0, 2.0, 3.0]
    );
    assert_eq!(
        device.region("right").unwrap().solution("Potential").unwrap(),
        &[0.0, 0.0, -0.5]
    );
    assert_eq!(device.abs_error(), 3.0);
    // |0.5| / (|-0.5| + floor)
    assert!((device.rel_error() - 1.0).abs() < 1e-9);
}

#[test]
fn test_ac_update_requires_dc_solution() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    let result: Vec<Complex64> = (0..6).map(|i| Complex64::new(i as f64, 1.0)).collect();
    assert!(matches!(
        device.ac_update(&result),
        Err(DeviceError::MissingDcSolution { .. })
    ));

    device.update(&[0.0; 6]).unwrap();
    device.ac_update(&result).unwrap();
    let ac = device.region("right").unwrap().ac_solution("Potential").unwrap();
    assert_eq!(ac[0], Complex64::new(3.0, 1.0));
    assert_eq!(ac[2], Complex64::new(5.0, 1.0));
}

#[test]
fn test_noise_update_reads_through_permutation() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    device.update(&[0.0; 6]).unwrap();
    let assembly = device.assemble(WhatToLoad::MatrixOnly, TimeMode::Dc).unwrap();
    let permvec = assembly.permutation_vector();
    let result: Vec<Complex64> = (0..6).map(|i| Complex64::new(i as f64, 0.0)).collect();

    device.noise_update("out", &permvec, &result).unwrap();
    let right = device
        .region("right")
        .unwrap()
        .noise_solution("out", "Potential")
        .unwrap();
    // junction node of the right region reads the merged row
    assert_eq!(right[0], Complex64::new(2.0, 0.0));
    assert_eq!(right[1], Complex64::new(4.0, 0.0));
    assert!(device
        .region("left")
        .unwrap()
        .noise_solution("other", "Potential")
        .is_none());

    let mut bad = permvec.clone();
    bad[1] = 99;
    assert!(matches!(
        device.noise_update("out", &bad, &result),
        Err(DeviceError::PermutationIndexOutOfRange { position: 1, .. })
    ));
}

#[test]
fn test_backup_restore_roundtrip() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    device.update(&[-1.0; 6]).unwrap();
    let before: Vec<_> = device.regions().values().map(|r| r.state().clone()).collect();

    device.backup_solutions("step");
    device.update(&[0.25; 6]).unwrap();
    device.restore_solutions("step").unwrap();

    let after: Vec<_> = device.regions().values().map(|r| r.state().clone()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_restore_unknown_tag_changes_nothing() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    device.update(&[-1.0; 6]).unwrap();
    let before: Vec<_> = device.regions().values().map(|r| r.state().clone()).collect();

    assert!(matches!(
        device.restore_solutions("never"),
        Err(DeviceError::UnknownBackup { .. })
    ));
    let after: Vec<_> = device.regions().values().map(|r| r.state().clone()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_update_contacts_requires_solution() {
    let mut device = numbered_device(3, AssemblyConfig::default());
    assert!(device.update_contacts().is_err());
    device.update(&[0.0; 6]).unwrap();
    device.update_contacts().unwrap();
}

#[test]
fn test_signal_reaches_interfaces_on_region() {
    let (mut device, ids) = two_region_device(3, AssemblyConfig::default());
    let hits = Arc::new(AtomicUsize::new(0));
    device
        .add_interface(Interface::new(
            "junction",
            "left",
            "right",
            vec![ids[2]],
            CountingInterface { hits: hits.clone() },
        ))
        .unwrap();

    device.signal_callbacks_on_interface("Potential", "left");
    device.signal_callbacks_on_interface("Potential", "right");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    device.signal_callbacks_on_interface("Potential", "substrate");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
