#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod builder;
mod collect;
mod dataset;
mod error;
mod graph;
mod partition;
mod pipeline;
mod quantum;
mod registry;
mod utils;

pub use crate::builder::GraphBuilder;
pub use crate::collect::{PipelineIo, TaskDatasets};
pub use crate::dataset::{DataId, DataRow, DatasetId, DatasetRef, DatasetType, DimValue};
pub use crate::error::{
    BuildError, CatalogError, ExpressionError, OutputConflictError, QuantumError, ResolutionError,
    RowError,
};
pub use crate::graph::{QuantumGraph, QuantumGraphNode};
pub use crate::partition::{
    Disposition, QuantumAccumulator, evaluate_outputs, partition_rows, quantum_dimensions,
};
pub use crate::pipeline::{
    ConfiguredTask, Pipeline, QuantumConfig, TaskConfig, TaskDef, TaskFactory, TaskKind,
};
pub use crate::quantum::{Quantum, QuantumKey};
pub use crate::registry::{
    DimensionUniverse, Expression, ExpressionParser, OriginInfo, Registry,
};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
