//! Self-describing snapshot documents.
//!
//! A snapshot is an ordered map from column name to [`Scalar`]. Keys that start with
//! [`RESERVED_PREFIX`] never name columns; each holds the child rows of a one-to-many relation
//! (for example the lines of a purchase order under [`LINES_KEY`]).

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RESERVED_PREFIX: char = '_';
pub const LINES_KEY: &str = "_lines";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("unsupported entity type `{entity_type}`")]
    UnsupportedEntityType { entity_type: String },
    #[error("{entity_type} `{entity_id}` not found")]
    EntityNotFound {
        entity_type: String,
        entity_id: String,
    },
    #[error("{entity_type} `{entity_id}` matched more than one row")]
    MultipleRows {
        entity_type: String,
        entity_id: String,
    },
    #[error("column `{column}` collides with the reserved snapshot prefix `_`")]
    ReservedColumn { column: String },
    #[error("snapshot document could not be decoded: {message}")]
    Deserialization { message: String },
}

impl SnapshotError {
    pub fn unsupported(entity_type: impl Into<String>) -> Self {
        Self::UnsupportedEntityType {
            entity_type: entity_type.into(),
        }
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }
}

pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// A single column value.
///
/// Integers and reals stay distinct so a restored numeric column receives a number, never a
/// numeric-looking string. Non-finite reals encode as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Real(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_none(),
            Scalar::Integer(value) => serializer.serialize_i64(*value),
            Scalar::Real(value) => serializer.serialize_f64(*value),
            Scalar::Text(value) => serializer.serialize_str(value),
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, a number or null")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Scalar, E> {
        Ok(Scalar::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Scalar, E> {
        i64::try_from(value)
            .map(Scalar::Integer)
            .map_err(|_| E::custom(format!("integer {value} exceeds the 64-bit signed range")))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Scalar, E> {
        Ok(Scalar::Real(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Scalar, E> {
        Ok(Scalar::Text(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Scalar, E> {
        Ok(Scalar::Text(value))
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// One row with its driver-reported column order preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRow {
    columns: IndexMap<String, Scalar>,
}

impl DynamicRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: IndexMap::with_capacity(capacity),
        }
    }

    /// Append a column, rejecting names that collide with reserved child keys.
    pub fn insert(
        &mut self,
        column: impl Into<String>,
        value: impl Into<Scalar>,
    ) -> Result<(), SnapshotError> {
        let column = column.into();
        if is_reserved_key(&column) {
            return Err(SnapshotError::ReservedColumn { column });
        }
        self.columns.insert(column, value.into());
        Ok(())
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.columns.get(column)
    }

    /// Value for `column`, or `Null` when the snapshot predates the column.
    pub fn value_or_null(&self, column: &str) -> Scalar {
        self.columns.get(column).cloned().unwrap_or(Scalar::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for DynamicRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct DynamicRowVisitor;

impl<'de> Visitor<'de> for DynamicRowVisitor {
    type Value = DynamicRow;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of column names to scalar values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DynamicRow, A::Error> {
        let mut row = DynamicRow::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(column) = access.next_key::<String>()? {
            if row.columns.contains_key(&column) {
                return Err(de::Error::custom(format!("duplicate column `{column}`")));
            }
            let value = access.next_value::<Scalar>()?;
            row.insert(column, value).map_err(de::Error::custom)?;
        }
        Ok(row)
    }
}

impl<'de> Deserialize<'de> for DynamicRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DynamicRowVisitor)
    }
}

/// Parent row plus zero or more named child collections.
///
/// Serializes as one flat JSON object: the parent columns in order, followed by each reserved
/// child key holding an array of child rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDocument {
    row: DynamicRow,
    children: IndexMap<String, Vec<DynamicRow>>,
}

impl SnapshotDocument {
    pub fn new(row: DynamicRow) -> Self {
        Self {
            row,
            children: IndexMap::new(),
        }
    }

    pub fn with_children(
        mut self,
        key: impl Into<String>,
        rows: Vec<DynamicRow>,
    ) -> Result<Self, SnapshotError> {
        let key = key.into();
        if !is_reserved_key(&key) {
            return Err(SnapshotError::deserialization(format!(
                "child key `{key}` must start with `_`"
            )));
        }
        self.children.insert(key, rows);
        Ok(self)
    }

    pub fn row(&self) -> &DynamicRow {
        &self.row
    }

    pub fn children(&self, key: &str) -> Option<&[DynamicRow]> {
        self.children.get(key).map(Vec::as_slice)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|err| SnapshotError::deserialization(err.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(raw).map_err(|err| SnapshotError::deserialization(err.to_string()))
    }
}

impl Serialize for SnapshotDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.row.len() + self.children.len()))?;
        for (column, value) in self.row.columns() {
            map.serialize_entry(column, value)?;
        }
        for (key, rows) in &self.children {
            map.serialize_entry(key, rows)?;
        }
        map.end()
    }
}

struct SnapshotDocumentVisitor;

impl<'de> Visitor<'de> for SnapshotDocumentVisitor {
    type Value = SnapshotDocument;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a snapshot object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SnapshotDocument, A::Error> {
        let mut document = SnapshotDocument::default();
        while let Some(key) = access.next_key::<String>()? {
            if is_reserved_key(&key) {
                if document.children.contains_key(&key) {
                    return Err(de::Error::custom(format!("duplicate child key `{key}`")));
                }
                let rows = access.next_value::<Vec<DynamicRow>>()?;
                document.children.insert(key, rows);
            } else {
                if document.row.columns.contains_key(&key) {
                    return Err(de::Error::custom(format!("duplicate column `{key}`")));
                }
                let value = access.next_value::<Scalar>()?;
                document.row.columns.insert(key, value);
            }
        }
        Ok(document)
    }
}

impl<'de> Deserialize<'de> for SnapshotDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SnapshotDocumentVisitor)
    }
}

/// Snapshot text exactly as persisted. Decoding happens only when a restore needs it, so one
/// corrupt document cannot break listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StoredSnapshot(String);

impl StoredSnapshot {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn encode(document: &SnapshotDocument) -> Result<Self, SnapshotError> {
        document.to_json().map(Self)
    }

    pub fn decode(&self) -> Result<SnapshotDocument, SnapshotError> {
        SnapshotDocument::from_json(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
