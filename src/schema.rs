//! Property schema consumed from the data front-end.
//!
//! The schema is the interface between a style and the dataframes it can
//! render: a map from feature property name to its declared column type.
//! `Property` expressions resolve names against it at construction time, so
//! an unknown name fails before any codegen runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared type of a feature property column.
///
/// Categorical columns are encoded as small floats by the decoding layer, so
/// both variants surface as scalar attributes in shader code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Scalar,
    Category,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnSpec {
    #[serde(rename = "type")]
    ty: ColumnType,
}

/// Property name -> column type mapping.
///
/// Serializes as `{"population": {"type": "scalar"}, ...}` so the front-end
/// can hand it over as plain JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: BTreeMap<String, ColumnSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column registration.
    pub fn with_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.insert(name.into(), ColumnSpec { ty });
        self
    }

    pub fn column(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).map(|spec| spec.ty)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}
