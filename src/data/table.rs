//! Flat tables of named, typed columns.
//!
//! Tables are the transport and consumer-facing representation throughout the
//! crate: statistical models export into them, the cluster engines attach them
//! as field data, and cross-process payloads are unpacked back into them.
//! Consumers address columns by name, never by position.

use crate::error::VsError;

/// A single typed column.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Real(Vec<f64>),
    Vec3(Vec<[f64; 3]>),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Real(v) => v.len(),
            Column::Vec3(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A 2-D table of named columns, all of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Table { columns: Vec::new() }
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    /// Add a column, replacing any existing column of the same name.
    pub fn set_column(&mut self, name: &str, column: Column) {
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| n == name) {
            slot.1 = column;
        } else {
            self.columns.push((name.to_string(), column));
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn int_column(&self, name: &str) -> Result<&[i64], VsError> {
        match self.column(name) {
            Some(Column::Int(v)) => Ok(v),
            _ => Err(VsError::MissingColumn(name.to_string())),
        }
    }

    pub fn real_column(&self, name: &str) -> Result<&[f64], VsError> {
        match self.column(name) {
            Some(Column::Real(v)) => Ok(v),
            _ => Err(VsError::MissingColumn(name.to_string())),
        }
    }

    pub fn vec3_column(&self, name: &str) -> Result<&[[f64; 3]], VsError> {
        match self.column(name) {
            Some(Column::Vec3(v)) => Ok(v),
            _ => Err(VsError::MissingColumn(name.to_string())),
        }
    }
}

/// A table together with the name a consumer looks it up under.
#[derive(Clone, Debug)]
pub struct NamedTable {
    pub name: String,
    pub table: Table,
}

impl NamedTable {
    pub fn new(name: &str, table: Table) -> Self {
        NamedTable { name: name.to_string(), table }
    }
}
