//! Dataset containers: tables, attribute arrays, structured images, meshes.

pub mod array;
pub mod image;
pub mod mesh;
pub mod table;

pub use array::{
    Association, AttributeArray, AttributeRequest, AttributeSet, ArrayValues, GhostKind,
    RequestList,
};
pub use image::{DataSet, ImageData};
pub use mesh::PolyMesh;
pub use table::{Column, NamedTable, Table};
