//! The unit of work produced by a build.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dataset::{DataId, DatasetRef, DatasetType};
use crate::error::QuantumError;

/// A row coordinate reduced to one task's quantum dimension columns.
///
/// Many rows collapse to the same key; the key's canonical column order
/// makes it comparable, so buckets iterate in a stable order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuantumKey(DataId);

impl QuantumKey {
    pub fn new(data_id: DataId) -> Self {
        Self(data_id)
    }

    pub fn data_id(&self) -> &DataId {
        &self.0
    }
}

impl std::fmt::Display for QuantumKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The minimum unit of work a task may perform: the deduplicated input and
/// output dataset references grouped at one quantum key.
///
/// `extras` is an opaque task-private payload carried through serialization
/// untouched. `director`, when set, names the primary dataset type of this
/// quantum and must be present as a key of `inputs` or `outputs`; reserved
/// for future use.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantum {
    inputs: BTreeMap<DatasetType, BTreeSet<DatasetRef>>,
    outputs: BTreeMap<DatasetType, BTreeSet<DatasetRef>>,
    extras: Option<serde_json::Value>,
    director: Option<DatasetType>,
}

impl Quantum {
    pub fn new(
        inputs: BTreeMap<DatasetType, BTreeSet<DatasetRef>>,
        outputs: BTreeMap<DatasetType, BTreeSet<DatasetRef>>,
    ) -> Self {
        Self {
            inputs,
            outputs,
            extras: None,
            director: None,
        }
    }

    /// Attach a task-private payload, opaque to the builder.
    pub fn with_extras(mut self, extras: serde_json::Value) -> Self {
        self.extras = Some(extras);
        self
    }

    /// Mark one dataset type as the primary dataset of this quantum.
    ///
    /// Fails when the type is attached neither as an input nor as an output.
    pub fn with_director(mut self, director: DatasetType) -> Result<Self, QuantumError> {
        if !self.inputs.contains_key(&director) && !self.outputs.contains_key(&director) {
            return Err(QuantumError::DirectorNotAttached(director));
        }
        self.director = Some(director);
        Ok(self)
    }

    pub fn inputs(&self) -> &BTreeMap<DatasetType, BTreeSet<DatasetRef>> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<DatasetType, BTreeSet<DatasetRef>> {
        &self.outputs
    }

    pub fn extras(&self) -> Option<&serde_json::Value> {
        self.extras.as_ref()
    }

    pub fn director(&self) -> Option<&DatasetType> {
        self.director.as_ref()
    }

    /// All input references, flattened across dataset types.
    pub fn input_refs(&self) -> impl Iterator<Item = &DatasetRef> {
        self.inputs.values().flatten()
    }

    /// All output references, flattened across dataset types.
    pub fn output_refs(&self) -> impl Iterator<Item = &DatasetRef> {
        self.outputs.values().flatten()
    }
}
