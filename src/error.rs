use thiserror::Error;

use crate::dataset::{DataId, DatasetId, DatasetRef, DatasetType};

/// Filter text failed to parse. Carries the original text together with the
/// parser's own message; never retried.
#[derive(Debug, Error)]
#[error("failed to parse user expression `{expr}`: {reason}")]
pub struct ExpressionError {
    pub expr: String,
    pub reason: String,
}

impl ExpressionError {
    pub(crate) fn new(expr: &str, source: anyhow::Error) -> Self {
        Self {
            expr: expr.to_owned(),
            reason: format!("{source:#}"),
        }
    }
}

/// A candidate quantum has pre-existing outputs it is not allowed to have:
/// either a partial subset, or the full set while overwriting is disabled.
#[derive(Debug, Error)]
#[error("output datasets already exist for task '{task}': {}", display_refs(.refs))]
pub struct OutputConflictError {
    pub task: String,
    pub refs: Vec<DatasetRef>,
}

fn display_refs(refs: &[DatasetRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Task-class resolution failed; the factory error is surfaced unchanged.
#[derive(Debug, Error)]
#[error("failed to resolve task class for '{task}'")]
pub struct ResolutionError {
    pub task: String,
    #[source]
    pub source: anyhow::Error,
}

impl ResolutionError {
    pub(crate) fn new(task: &str, source: anyhow::Error) -> Self {
        Self {
            task: task.to_owned(),
            source,
        }
    }
}

/// Catalog failure propagated verbatim from the query facade.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct CatalogError(#[from] pub anyhow::Error);

/// Data-consistency faults discovered while partitioning rows into quanta.
#[derive(Debug, Error)]
pub enum RowError {
    /// Two rows carried the same `(type, coordinate)` pair but disagreed on
    /// its materialized identity. Arrival order must not decide which one
    /// wins, so this surfaces instead of resolving silently.
    #[error(
        "conflicting identities for dataset {dataset_type}@{data_id}: {} vs {}",
        display_identity(.existing),
        display_identity(.incoming)
    )]
    ConflictingIdentity {
        dataset_type: DatasetType,
        data_id: DataId,
        existing: Option<DatasetId>,
        incoming: Option<DatasetId>,
    },

    /// A row's coordinate lacks one of the task's quantum dimension columns.
    #[error("row {data_id} is missing dimension column '{column}'")]
    MissingColumn { data_id: DataId, column: String },

    /// A row carries no reference for a dataset type the task requires.
    #[error("row {data_id} has no dataset reference for type '{dataset_type}'")]
    MissingRef {
        data_id: DataId,
        dataset_type: DatasetType,
    },

    /// A task's quantum config names a dimension the universe doesn't know.
    #[error("unknown quantum dimension '{dimension}' in task '{task}'")]
    UnknownDimension { task: String, dimension: String },
}

fn display_identity(id: &Option<DatasetId>) -> String {
    match id {
        Some(id) => format!("id={id}"),
        None => String::from("unmaterialized"),
    }
}

/// Construction-time failures for [`Quantum`](crate::Quantum) values.
#[derive(Debug, Error)]
pub enum QuantumError {
    #[error("director dataset type '{0}' is not among the quantum's inputs or outputs")]
    DirectorNotAttached(DatasetType),
}

/// Anything `make_graph` can fail with.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    OutputConflict(#[from] OutputConflictError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Quantum(#[from] QuantumError),
}
