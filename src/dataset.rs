//! Core value types describing the data space.
//!
//! Everything here is a plain, ordered, serializable value. The builder
//! never relies on hash-map iteration order; coordinates and references
//! compare and sort canonically, so two builds over the same rows produce
//! the same graph no matter how the rows arrived.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named kind of data product, e.g. `"calibrated-image"`.
///
/// Identity is the name alone; two values with the same name are the same
/// dataset type everywhere in the builder.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetType {
    name: String,
}

impl DatasetType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for DatasetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A single dimension-column value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimValue {
    Int(i64),
    Str(String),
}

impl From<i64> for DimValue {
    fn from(value: i64) -> Self {
        DimValue::Int(value)
    }
}

impl From<i32> for DimValue {
    fn from(value: i32) -> Self {
        DimValue::Int(value.into())
    }
}

impl From<&str> for DimValue {
    fn from(value: &str) -> Self {
        DimValue::Str(value.to_owned())
    }
}

impl From<String> for DimValue {
    fn from(value: String) -> Self {
        DimValue::Str(value)
    }
}

impl std::fmt::Display for DimValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimValue::Int(value) => write!(f, "{value}"),
            DimValue::Str(value) => f.write_str(value),
        }
    }
}

/// An ordered mapping from dimension-column name to value, locating one
/// position in the data space, e.g. `{detector: 4, visit: 123}`.
///
/// Columns are kept sorted, so equal coordinates render, compare and hash
/// identically regardless of insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataId(BTreeMap<String, DimValue>);

impl DataId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&DimValue> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<DimValue>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DimValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for DataId
where
    K: Into<String>,
    V: Into<DimValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl std::fmt::Display for DataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (column, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Opaque identity assigned by the catalog to a materialized dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub u64);

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to one dataset: a type at a coordinate, plus the catalog
/// identity when the dataset already exists in storage.
///
/// Logical identity is the `(dataset_type, data_id)` pair; the materialized
/// `id` is carried alongside and never participates in deduplication.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    dataset_type: DatasetType,
    data_id: DataId,
    id: Option<DatasetId>,
}

impl DatasetRef {
    pub fn new(dataset_type: DatasetType, data_id: DataId) -> Self {
        Self {
            dataset_type,
            data_id,
            id: None,
        }
    }

    /// Attach the catalog identity of an already-materialized dataset.
    pub fn with_id(mut self, id: DatasetId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn dataset_type(&self) -> &DatasetType {
        &self.dataset_type
    }

    pub fn data_id(&self) -> &DataId {
        &self.data_id
    }

    pub fn id(&self) -> Option<DatasetId> {
        self.id
    }

    pub fn is_materialized(&self) -> bool {
        self.id.is_some()
    }
}

impl std::fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.dataset_type, self.data_id)?;
        if let Some(id) = self.id {
            write!(f, " (id={id})")?;
        }
        Ok(())
    }
}

/// One candidate element of the data space returned by the query facade:
/// a full coordinate plus the dataset reference realized at that coordinate
/// for every dataset type relevant to the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRow {
    data_id: DataId,
    refs: BTreeMap<DatasetType, DatasetRef>,
}

impl DataRow {
    pub fn new(data_id: DataId) -> Self {
        Self {
            data_id,
            refs: BTreeMap::new(),
        }
    }

    /// Attach a dataset reference, keyed by its dataset type.
    pub fn with_ref(mut self, dataset_ref: DatasetRef) -> Self {
        self.refs
            .insert(dataset_ref.dataset_type().clone(), dataset_ref);
        self
    }

    pub fn data_id(&self) -> &DataId {
        &self.data_id
    }

    pub fn dataset_ref(&self, dataset_type: &DatasetType) -> Option<&DatasetRef> {
        self.refs.get(dataset_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_id_order_is_canonical() {
        let a: DataId = [("visit", 123), ("detector", 4)].into_iter().collect();
        let mut b = DataId::new();
        b.insert("detector", 4);
        b.insert("visit", 123);

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{detector: 4, visit: 123}");
    }

    #[test]
    fn refs_equal_regardless_of_identity_fields() {
        let data_id: DataId = [("visit", 1)].into_iter().collect();
        let bare = DatasetRef::new(DatasetType::new("raw"), data_id.clone());
        let materialized = bare.clone().with_id(DatasetId(7));

        assert_ne!(bare, materialized);
        assert_eq!(bare.dataset_type(), materialized.dataset_type());
        assert_eq!(bare.data_id(), materialized.data_id());
        assert!(materialized.is_materialized());
        assert!(!bare.is_materialized());
    }

    #[test]
    fn row_lookup_by_type() {
        let data_id: DataId = [("visit", 1)].into_iter().collect();
        let raw = DatasetType::new("raw");
        let row = DataRow::new(data_id.clone())
            .with_ref(DatasetRef::new(raw.clone(), data_id));

        assert!(row.dataset_ref(&raw).is_some());
        assert!(row.dataset_ref(&DatasetType::new("coadd")).is_none());
    }
}
