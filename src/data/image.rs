//! Structured 3-D images and composite collections of them.
//!
//! An `ImageData` is a regular grid described by point dimensions, origin and
//! spacing. Geometry is implicit; only attribute arrays are stored. Datasets
//! may be composite, and a rank may legitimately hold a composite with zero
//! leaves (its contribution to global reductions is "no opinion", never zero).

use crate::data::array::{next_stamp, Association, AttributeSet};
use crate::data::table::Table;

/// A regular structured grid of `dims` points per axis.
#[derive(Clone, Debug)]
pub struct ImageData {
    dims: [usize; 3],
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    pub point_data: AttributeSet,
    pub cell_data: AttributeSet,
    pub field_data: Table,
    id: u64,
}

impl ImageData {
    pub fn new(dims: [usize; 3], origin: [f64; 3], spacing: [f64; 3]) -> Self {
        debug_assert!(dims.iter().all(|&d| d >= 1));
        ImageData {
            dims,
            origin,
            spacing,
            point_data: AttributeSet::new(),
            cell_data: AttributeSet::new(),
            field_data: Table::new(),
            id: next_stamp(),
        }
    }

    /// Identity of this dataset, stable across clones of the same object
    /// graph node. Used only for cache keying.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Cells per axis; an axis with a single point plane has no cells.
    pub fn cell_dims(&self) -> [usize; 3] {
        [
            self.dims[0].saturating_sub(1),
            self.dims[1].saturating_sub(1),
            self.dims[2].saturating_sub(1),
        ]
    }

    pub fn num_points(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn num_cells(&self) -> usize {
        let c = self.cell_dims();
        c[0] * c[1] * c[2]
    }

    pub fn element_count(&self, association: Association) -> usize {
        match association {
            Association::Point => self.num_points(),
            Association::Cell => self.num_cells(),
            Association::Row => 0,
        }
    }

    pub fn attributes(&self, association: Association) -> Option<&AttributeSet> {
        match association {
            Association::Point => Some(&self.point_data),
            Association::Cell => Some(&self.cell_data),
            Association::Row => None,
        }
    }

    pub fn attributes_mut(&mut self, association: Association) -> Option<&mut AttributeSet> {
        match association {
            Association::Point => Some(&mut self.point_data),
            Association::Cell => Some(&mut self.cell_data),
            Association::Row => None,
        }
    }

    pub fn point_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    pub fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        let c = self.cell_dims();
        (k * c[1] + j) * c[0] + i
    }

    pub fn cell_coords(&self, cell: usize) -> [usize; 3] {
        let c = self.cell_dims();
        [cell % c[0], (cell / c[0]) % c[1], cell / (c[0] * c[1])]
    }

    pub fn point_position(&self, point: usize) -> [f64; 3] {
        let i = point % self.dims[0];
        let j = (point / self.dims[0]) % self.dims[1];
        let k = point / (self.dims[0] * self.dims[1]);
        [
            self.origin[0] + self.spacing[0] * i as f64,
            self.origin[1] + self.spacing[1] * j as f64,
            self.origin[2] + self.spacing[2] * k as f64,
        ]
    }

    pub fn cell_center(&self, cell: usize) -> [f64; 3] {
        let ijk = self.cell_coords(cell);
        [
            self.origin[0] + self.spacing[0] * (ijk[0] as f64 + 0.5),
            self.origin[1] + self.spacing[1] * (ijk[1] as f64 + 0.5),
            self.origin[2] + self.spacing[2] * (ijk[2] as f64 + 0.5),
        ]
    }

    /// Center of the dataset bounding box.
    pub fn center(&self) -> [f64; 3] {
        [
            self.origin[0] + self.spacing[0] * (self.dims[0] - 1) as f64 * 0.5,
            self.origin[1] + self.spacing[1] * (self.dims[1] - 1) as f64 * 0.5,
            self.origin[2] + self.spacing[2] * (self.dims[2] - 1) as f64 * 0.5,
        ]
    }

    /// The structured neighbor of `cell` along `axis` in direction
    /// `positive`, or None at the global extent boundary.
    pub fn cell_neighbor(&self, cell: usize, axis: usize, positive: bool) -> Option<usize> {
        let c = self.cell_dims();
        let mut ijk = self.cell_coords(cell);
        if positive {
            if ijk[axis] + 1 >= c[axis] {
                return None;
            }
            ijk[axis] += 1;
        } else {
            if ijk[axis] == 0 {
                return None;
            }
            ijk[axis] -= 1;
        }
        Some(self.cell_index(ijk[0], ijk[1], ijk[2]))
    }

    /// Point ids of the four corners of the face of `cell` on `axis`, on the
    /// positive or negative side, ordered so the quad normal points outward.
    pub fn cell_face_points(&self, cell: usize, axis: usize, positive: bool) -> [usize; 4] {
        let ijk = self.cell_coords(cell);
        let (u, v) = match axis {
            0 => (1, 2),
            1 => (2, 0),
            _ => (0, 1),
        };
        let side = if positive { 1 } else { 0 };
        // (u,v) corner offsets, counter-clockwise seen from the positive side
        let corners = if positive {
            [(0, 0), (1, 0), (1, 1), (0, 1)]
        } else {
            [(0, 0), (0, 1), (1, 1), (1, 0)]
        };
        let mut out = [0usize; 4];
        for (slot, (du, dv)) in out.iter_mut().zip(corners) {
            let mut p = ijk;
            p[axis] += side;
            p[u] += du;
            p[v] += dv;
            *slot = self.point_index(p[0], p[1], p[2]);
        }
        out
    }
}

/// A dataset: a single structured image or a composite of sub-datasets.
#[derive(Clone, Debug)]
pub enum DataSet {
    Image(ImageData),
    Composite(Vec<DataSet>),
}

impl DataSet {
    /// All image leaves, in traversal order.
    pub fn leaves(&self) -> Vec<&ImageData> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ImageData>) {
        match self {
            DataSet::Image(img) => out.push(img),
            DataSet::Composite(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}
