//! Cross-rank reconciliation of attribute-array component counts.
//!
//! Before a model is built, every rank must agree on how many components of
//! each requested array are usable. A rank that holds no elements at all must
//! not force an array to zero components, so it contributes a "no opinion"
//! sentinel instead; the element-wise minimum across ranks then yields a
//! count that is safe to index on every rank that does hold data.

use crate::data::{Association, AttributeRequest, DataSet, RequestList};
use crate::parallel::Comm;

/// Contribution of a rank that holds no elements of the requested
/// association anywhere in its composite dataset.
pub const NO_LOCAL_DATA: i64 = i32::MAX as i64;

/// The globally agreed component count per surviving request, in request
/// order. Identical on every rank after reconciliation.
#[derive(Clone, Debug, Default)]
pub struct GlobalComponentMap {
    entries: Vec<(AttributeRequest, usize)>,
}

impl GlobalComponentMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeRequest, usize)> {
        self.entries.iter().map(|(r, c)| (r, *c))
    }

    pub fn components(&self, name: &str, association: Association) -> Option<usize> {
        self.entries
            .iter()
            .find(|(r, _)| r.name == name && r.association == association)
            .map(|(_, c)| *c)
    }
}

/// Component count this rank can vouch for, or `NO_LOCAL_DATA` when the rank
/// holds no elements of the request's association at all.
fn local_components(data: &DataSet, request: &AttributeRequest) -> i64 {
    let mut saw_elements = false;
    for leaf in data.leaves() {
        if leaf.element_count(request.association) == 0 {
            continue;
        }
        saw_elements = true;
        if let Some(atts) = leaf.attributes(request.association) {
            if let Some(array) = atts.get(&request.name) {
                return array.components() as i64;
            }
        }
    }
    // Elements exist here but the array does not: the array is genuinely
    // narrower than requested on this rank.
    if saw_elements { 0 } else { NO_LOCAL_DATA }
}

/// Compute the global per-request component counts.
///
/// Requests must be identical (same entries, same order) on every rank;
/// violating that is undefined behavior at the reduction. Arrays whose
/// reduced count is zero — including those absent on every rank — are
/// dropped from the result without a diagnostic.
pub fn reconcile_components<C: Comm>(
    comm: &C,
    requests: &RequestList,
    data: &DataSet,
) -> GlobalComponentMap {
    if requests.is_empty() {
        return GlobalComponentMap::default();
    }
    let local: Vec<i64> = requests.iter().map(|r| local_components(data, r)).collect();
    let mut global = vec![0i64; local.len()];
    comm.all_reduce_min(&local, &mut global);

    let mut entries = Vec::new();
    for (request, &count) in requests.iter().zip(&global) {
        let count = if count == NO_LOCAL_DATA { 0 } else { count };
        if count > 0 {
            entries.push((request.clone(), count as usize));
        }
    }
    GlobalComponentMap { entries }
}
