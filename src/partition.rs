//! Row partitioning and the output-existence policy.
//!
//! This is the heart of the builder. For one task it reduces every row to a
//! quantum key, buckets rows by that key, and accumulates each bucket's
//! dataset references deduplicated by coordinate. The accumulated buckets
//! then pass through [`evaluate_outputs`], which decides whether a
//! candidate quantum proceeds, is skipped, or conflicts with datasets that
//! already exist.
//!
//! All working maps are ordered, so the resulting buckets iterate in
//! canonical key order no matter how the rows arrived.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::collect::TaskDatasets;
use crate::dataset::{DataId, DataRow, DatasetRef, DatasetType};
use crate::error::RowError;
use crate::quantum::{Quantum, QuantumKey};
use crate::registry::DimensionUniverse;

/// In-progress quantum: per dataset type, references keyed by coordinate.
///
/// Keying by coordinate is what deduplicates: a reference seen through many
/// rows lands on the same entry, and the insertion is a no-op as long as
/// the materialized identity agrees.
#[derive(Clone, Debug, Default)]
pub struct QuantumAccumulator {
    inputs: BTreeMap<DatasetType, BTreeMap<DataId, DatasetRef>>,
    outputs: BTreeMap<DatasetType, BTreeMap<DataId, DatasetRef>>,
}

impl QuantumAccumulator {
    fn insert_input(&mut self, dataset_ref: DatasetRef) -> Result<(), RowError> {
        insert_deduplicated(&mut self.inputs, dataset_ref)
    }

    fn insert_output(&mut self, dataset_ref: DatasetRef) -> Result<(), RowError> {
        insert_deduplicated(&mut self.outputs, dataset_ref)
    }

    /// The flattened output references, for the existence policy.
    pub fn output_refs(&self) -> Vec<DatasetRef> {
        self.outputs
            .values()
            .flat_map(|refs| refs.values().cloned())
            .collect()
    }

    /// Finish accumulation, producing the quantum value.
    pub fn into_quantum(self) -> Quantum {
        Quantum::new(collapse(self.inputs), collapse(self.outputs))
    }
}

fn collapse(
    buckets: BTreeMap<DatasetType, BTreeMap<DataId, DatasetRef>>,
) -> BTreeMap<DatasetType, BTreeSet<DatasetRef>> {
    buckets
        .into_iter()
        .map(|(ty, refs)| (ty, refs.into_values().collect()))
        .collect()
}

fn insert_deduplicated(
    buckets: &mut BTreeMap<DatasetType, BTreeMap<DataId, DatasetRef>>,
    dataset_ref: DatasetRef,
) -> Result<(), RowError> {
    let per_type = buckets
        .entry(dataset_ref.dataset_type().clone())
        .or_default();

    match per_type.entry(dataset_ref.data_id().clone()) {
        Entry::Vacant(entry) => {
            entry.insert(dataset_ref);
        }
        Entry::Occupied(entry) => {
            // Same logical dataset seen again. Keeping the first insertion
            // is only sound when both sightings agree on identity; a
            // mismatch must not be resolved by arrival order.
            if entry.get().id() != dataset_ref.id() {
                return Err(RowError::ConflictingIdentity {
                    dataset_type: dataset_ref.dataset_type().clone(),
                    data_id: dataset_ref.data_id().clone(),
                    existing: entry.get().id(),
                    incoming: dataset_ref.id(),
                });
            }
        }
    }

    Ok(())
}

/// The union of link columns behind a task's configured quantum dimensions,
/// in canonical order.
pub fn quantum_dimensions(
    task: &TaskDatasets,
    universe: &DimensionUniverse,
) -> Result<BTreeSet<String>, RowError> {
    let mut columns = BTreeSet::new();

    for dimension in &task.task.config.quantum.dimensions {
        let links = universe
            .links(dimension)
            .ok_or_else(|| RowError::UnknownDimension {
                task: task.task.label.clone(),
                dimension: dimension.clone(),
            })?;
        columns.extend(links.iter().cloned());
    }

    Ok(columns)
}

fn quantum_key(row: &DataRow, columns: &BTreeSet<String>) -> Result<QuantumKey, RowError> {
    let mut data_id = DataId::new();

    for column in columns {
        let value = row
            .data_id()
            .get(column)
            .ok_or_else(|| RowError::MissingColumn {
                data_id: row.data_id().clone(),
                column: column.clone(),
            })?;
        data_id.insert(column.clone(), value.clone());
    }

    Ok(QuantumKey::new(data_id))
}

fn row_ref(row: &DataRow, dataset_type: &DatasetType) -> Result<DatasetRef, RowError> {
    row.dataset_ref(dataset_type)
        .cloned()
        .ok_or_else(|| RowError::MissingRef {
            data_id: row.data_id().clone(),
            dataset_type: dataset_type.clone(),
        })
}

/// Bucket the full row sequence into one task's candidate quanta.
pub fn partition_rows(
    task: &TaskDatasets,
    universe: &DimensionUniverse,
    rows: &[DataRow],
) -> Result<BTreeMap<QuantumKey, QuantumAccumulator>, RowError> {
    let columns = quantum_dimensions(task, universe)?;
    debug!(task = %task.task.label, columns = ?columns, "quantum dimension columns");

    let mut buckets: BTreeMap<QuantumKey, QuantumAccumulator> = BTreeMap::new();

    for row in rows {
        let key = quantum_key(row, &columns)?;
        let accumulator = buckets.entry(key).or_default();

        for dataset_type in &task.inputs {
            accumulator.insert_input(row_ref(row, dataset_type)?)?;
        }
        for dataset_type in &task.outputs {
            accumulator.insert_output(row_ref(row, dataset_type)?)?;
        }
    }

    debug!(task = %task.task.label, buckets = buckets.len(), "partitioned rows");
    Ok(buckets)
}

/// What the existence policy decided about one candidate quantum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// No output pre-exists; emit the quantum.
    Proceed,
    /// Every output pre-exists and skipping is enabled; drop the quantum.
    Skip,
    /// Pre-existing outputs the build is not allowed to overwrite; the
    /// carried references are the ones that already exist.
    Conflict(Vec<DatasetRef>),
}

/// Decide a candidate quantum's fate from its flattened output references.
///
/// Partial pre-existence is a conflict no matter what `skip_existing` says:
/// overwriting part of a task's output set could leave a mixed result
/// behind. Total pre-existence is a skip when skipping is enabled and a
/// conflict otherwise. A quantum with no outputs at all always proceeds.
pub fn evaluate_outputs(outputs: &[DatasetRef], skip_existing: bool) -> Disposition {
    let existing: Vec<DatasetRef> = outputs
        .iter()
        .filter(|r| r.is_materialized())
        .cloned()
        .collect();

    if existing.is_empty() {
        Disposition::Proceed
    } else if existing.len() == outputs.len() && skip_existing {
        Disposition::Skip
    } else {
        Disposition::Conflict(existing)
    }
}
