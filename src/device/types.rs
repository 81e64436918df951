//! Core identifier types for device entities.

use std::fmt;

/// Stable index of a mesh node registered on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateId(pub usize);

impl fmt::Display for CoordinateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{}", self.0)
    }
}

/// Registration sequence number of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactId(pub usize);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// Registration sequence number of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub usize);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// An indexable mesh node.
///
/// Geometry is carried for collaborators that need it; the core itself only
/// uses the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub id: CoordinateId,
    pub position: [f64; 3],
}

impl Coordinate {
    pub fn new(id: CoordinateId, position: [f64; 3]) -> Self {
        Self { id, position }
    }

    pub fn index(&self) -> usize {
        self.id.0
    }

    pub fn x(&self) -> f64 {
        self.position[0]
    }

    pub fn y(&self) -> f64 {
        self.position[1]
    }

    pub fn z(&self) -> f64 {
        self.position[2]
    }

    /// Euclidean distance to another coordinate.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let dx = self.position[0] - other.position[0];
        let dy = self.position[1] - other.position[1];
        let dz = self.position[2] - other.position[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {}, {})",
            self.id, self.position[0], self.position[1], self.position[2]
        )
    }
}
