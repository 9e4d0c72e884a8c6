//! Polygonal output meshes for the explode engine.

use crate::data::array::AttributeSet;
use crate::data::table::Table;

/// Points plus quadrilateral faces, with each point remembering the input
/// point it originated from so attribute data can be copied over.
#[derive(Clone, Debug, Default)]
pub struct PolyMesh {
    pub points: Vec<[f64; 3]>,
    pub quads: Vec<[usize; 4]>,
    /// Input point id each output point was generated from.
    pub source_points: Vec<usize>,
    pub point_data: AttributeSet,
    pub field_data: Table,
}

impl PolyMesh {
    pub fn new() -> Self {
        PolyMesh::default()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_quads(&self) -> usize {
        self.quads.len()
    }

    /// Append `other`, offsetting its point indices past this mesh's points.
    /// Points are concatenated, never merged.
    pub fn append(&mut self, other: PolyMesh) {
        let offset = self.points.len();
        self.points.extend(other.points);
        self.source_points.extend(other.source_points);
        self.quads.extend(
            other
                .quads
                .into_iter()
                .map(|q| [q[0] + offset, q[1] + offset, q[2] + offset, q[3] + offset]),
        );
    }
}
