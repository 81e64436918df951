//! Coordinate reverse indices.

use std::collections::BTreeMap;

use super::types::CoordinateId;

/// Reverse lookup from a coordinate to the objects touching it.
///
/// Ids are registration sequence numbers, so each list is in ascending
/// registration order and identical across runs.
#[derive(Debug, Clone)]
pub struct CoordinateIndex<T> {
    map: BTreeMap<CoordinateId, Vec<T>>,
}

impl<T> Default for CoordinateIndex<T> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }
}

impl<T: Copy + Ord> CoordinateIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` touches every coordinate in `coordinates`.
    pub fn insert_all(&mut self, id: T, coordinates: &[CoordinateId]) {
        for &c in coordinates {
            let list = self.map.entry(c).or_default();
            if let Err(pos) = list.binary_search(&id) {
                list.insert(pos, id);
            }
        }
    }

    /// Objects touching `coordinate`; empty when untouched.
    pub fn get(&self, coordinate: CoordinateId) -> &[T] {
        self.map.get(&coordinate).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, coordinate: CoordinateId) -> usize {
        self.get(coordinate).len()
    }

    /// Number of coordinates touched by at least one object.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CoordinateId, &[T])> {
        self.map.iter().map(|(c, v)| (*c, v.as_slice()))
    }
}
