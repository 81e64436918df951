//! Semidev - device assembly demo
//!
//! Builds a 1-D two-region structure with an ohmic contact at each end and a
//! continuity interface at the junction, then solves the DC operating point.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info semidev --nodes 21 --bias 0.5 --g-left 2.0 --g-right 1.0
//! ```

use clap::Parser;
use log::info;
use semidev_core::{
    error::Result,
    models::{ConductionModel, ContinuityInterface, OhmicContact},
    solver::{NewtonConfig, NewtonSolver},
    AssemblyConfig, Contact, Device, Interface, Region,
};

/// Two-region device solver demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Nodes per region (the junction node is shared)
    #[arg(short, long, default_value_t = 11)]
    nodes: usize,

    /// Potential applied at the left contact
    #[arg(short, long, default_value_t = 1.0)]
    bias: f64,

    /// Edge conductance of the left region
    #[arg(long, default_value_t = 1.0)]
    g_left: f64,

    /// Edge conductance of the right region
    #[arg(long, default_value_t = 1.0)]
    g_right: f64,

    /// Maximum Newton iterations
    #[arg(long, default_value_t = semidev_core::solver::DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Assemble each pass on the rayon pool
    #[arg(long)]
    parallel: bool,
}

fn build_device(args: &Args) -> Result<Device> {
    let n = args.nodes.max(2);
    let config = AssemblyConfig::new()
        .with_parallel(args.parallel)
        .with_min_parallel_items(1);
    let mut device = Device::with_config("diode", 1, config)?;

    let ids = device.add_coordinate_list((0..(2 * n - 1)).map(|i| [i as f64, 0.0, 0.0]));
    let left = ids[..n].to_vec();
    let right = ids[n - 1..].to_vec();
    let junction = ids[n - 1];

    device.add_region(Region::new(
        "left",
        left,
        ConductionModel::chain(n).with_variable("Potential", args.g_left),
    )?)?;
    device.add_region(Region::new(
        "right",
        right,
        ConductionModel::chain(n).with_variable("Potential", args.g_right),
    )?)?;

    device.add_contact(Contact::new(
        "anode",
        "left",
        vec![ids[0]],
        OhmicContact::new("Potential", args.bias),
    ))?;
    device.add_contact(Contact::new(
        "cathode",
        "right",
        vec![ids[2 * n - 2]],
        OhmicContact::new("Potential", 0.0),
    ))?;
    device.add_interface(Interface::new(
        "junction",
        "left",
        "right",
        vec![junction],
        ContinuityInterface::new("Potential"),
    ))?;

    device.set_base_equation_number(0);
    Ok(device)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut device = build_device(&args)?;
    let size = device.calc_max_equation_number()?;
    info!("device '{}': {} equations", device.name(), size);

    let solver =
        NewtonSolver::with_config(NewtonConfig::new().with_max_iterations(args.max_iterations));
    let report = solver.solve(&mut device)?;

    println!(
        "converged in {} iterations (abs {:.3e}, rel {:.3e})",
        report.iterations, report.abs_error, report.rel_error
    );
    for region in device.regions().values() {
        let potential = region.solution("Potential")?;
        for (coordinate, value) in region.coordinates().iter().zip(potential) {
            println!("{:>8} {:>10} {:>14.6e}", region.name(), coordinate, value);
        }
    }
    for contact in device.contacts().values() {
        println!(
            "contact {:>8}: current {:>14.6e}",
            contact.name(),
            contact.quantity("current").unwrap_or(0.0)
        );
    }

    Ok(())
}
