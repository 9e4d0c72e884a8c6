//! Named attribute arrays and per-association attribute sets.

use bitflags::bitflags;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which dataset elements an array (or a request) is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Association {
    Point,
    Cell,
    Row,
}

bitflags! {
    /// Per-element ghost markers. Any set bit excludes the element from
    /// every local contribution to a global result.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct GhostKind: u8 {
        /// Element is owned by a neighboring rank.
        const DUPLICATE = 0b0000_0001;
        /// Element is blanked out of the grid.
        const HIDDEN    = 0b0000_0010;
    }
}

static STAMP: AtomicU64 = AtomicU64::new(1);

/// Next value of the global modification counter.
pub(crate) fn next_stamp() -> u64 {
    STAMP.fetch_add(1, Ordering::Relaxed)
}

/// Typed storage of an attribute array, tuple-major.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValues {
    Int(Vec<i64>),
    Real(Vec<f64>),
}

/// A named array of fixed-width tuples attached to dataset elements.
///
/// The modification stamp is bumped on every mutation and is the cache key
/// ingredient the explode engine uses to detect a changed label array.
#[derive(Clone, Debug)]
pub struct AttributeArray {
    pub name: String,
    components: usize,
    values: ArrayValues,
    mtime: u64,
}

impl AttributeArray {
    pub fn int(name: &str, components: usize, data: Vec<i64>) -> Self {
        debug_assert!(components > 0 && data.len() % components == 0);
        AttributeArray {
            name: name.to_string(),
            components,
            values: ArrayValues::Int(data),
            mtime: next_stamp(),
        }
    }

    pub fn real(name: &str, components: usize, data: Vec<f64>) -> Self {
        debug_assert!(components > 0 && data.len() % components == 0);
        AttributeArray {
            name: name.to_string(),
            components,
            values: ArrayValues::Real(data),
            mtime: next_stamp(),
        }
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn tuples(&self) -> usize {
        match &self.values {
            ArrayValues::Int(v) => v.len() / self.components,
            ArrayValues::Real(v) => v.len() / self.components,
        }
    }

    pub fn values(&self) -> &ArrayValues {
        &self.values
    }

    /// Component `c` of tuple `t`, widened to f64.
    pub fn component(&self, t: usize, c: usize) -> f64 {
        let i = t * self.components + c;
        match &self.values {
            ArrayValues::Int(v) => v[i] as f64,
            ArrayValues::Real(v) => v[i],
        }
    }

    pub fn as_int(&self) -> Option<&[i64]> {
        match &self.values {
            ArrayValues::Int(v) => Some(v),
            ArrayValues::Real(_) => None,
        }
    }

    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Mutable access to the storage; bumps the modification stamp.
    pub fn values_mut(&mut self) -> &mut ArrayValues {
        self.mtime = next_stamp();
        &mut self.values
    }

    /// Bump the modification stamp without changing contents.
    pub fn touch(&mut self) {
        self.mtime = next_stamp();
    }
}

/// The arrays of one association (point, cell, or row), plus the optional
/// ghost flag array for that association.
#[derive(Clone, Debug, Default)]
pub struct AttributeSet {
    arrays: Vec<AttributeArray>,
    pub ghost: Option<Vec<u8>>,
}

impl AttributeSet {
    pub fn new() -> Self {
        AttributeSet { arrays: Vec::new(), ghost: None }
    }

    /// Insert an array, replacing any existing array of the same name.
    pub fn insert(&mut self, array: AttributeArray) {
        if let Some(slot) = self.arrays.iter_mut().find(|a| a.name == array.name) {
            *slot = array;
        } else {
            self.arrays.push(array);
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AttributeArray> {
        self.arrays.iter_mut().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeArray> {
        self.arrays.iter()
    }

    /// True when element `i` carries any ghost flag.
    pub fn is_ghost(&self, i: usize) -> bool {
        self.ghost.as_ref().map(|g| g[i] != 0).unwrap_or(false)
    }
}

/// One (array name, association) pair a caller wants in a statistical model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeRequest {
    pub name: String,
    pub association: Association,
}

impl AttributeRequest {
    pub fn new(name: &str, association: Association) -> Self {
        AttributeRequest { name: name.to_string(), association }
    }
}

/// An ordered request list with duplicate (name, association) suppression.
///
/// Every rank must build an identical list; this is a caller precondition and
/// is not validated across ranks.
#[derive(Clone, Debug, Default)]
pub struct RequestList {
    requests: Vec<AttributeRequest>,
}

impl RequestList {
    pub fn new() -> Self {
        RequestList { requests: Vec::new() }
    }

    /// Append a request unless the same (name, association) pair is present.
    pub fn add(&mut self, name: &str, association: Association) {
        let req = AttributeRequest::new(name, association);
        if !self.requests.contains(&req) {
            self.requests.push(req);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeRequest> {
        self.requests.iter()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_list_suppresses_duplicates() {
        let mut reqs = RequestList::new();
        reqs.add("A", Association::Point);
        reqs.add("A", Association::Point);
        reqs.add("A", Association::Cell);
        assert_eq!(reqs.len(), 2);
    }

    #[test]
    fn mutation_bumps_mtime() {
        let mut a = AttributeArray::int("L", 1, vec![1, 2, 3]);
        let before = a.mtime();
        a.touch();
        assert!(a.mtime() > before);
    }

    #[test]
    fn ghost_flags() {
        let mut set = AttributeSet::new();
        assert!(!set.is_ghost(0));
        set.ghost = Some(vec![0, GhostKind::DUPLICATE.bits()]);
        assert!(!set.is_ghost(0));
        assert!(set.is_ghost(1));
    }
}
