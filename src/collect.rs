//! Per-task dataset collection and pipeline-wide IO aggregation.

use std::collections::BTreeSet;

use crate::dataset::DatasetType;
use crate::error::ResolutionError;
use crate::pipeline::TaskDef;

/// One resolved task together with the dataset types it consumes and
/// produces under its configuration.
#[derive(Clone, Debug)]
pub struct TaskDatasets {
    pub task: TaskDef,
    pub inputs: Vec<DatasetType>,
    pub outputs: Vec<DatasetType>,
}

impl TaskDatasets {
    /// Ask the task's resolved class for its dataset types.
    ///
    /// Pure apart from the class call itself; a failure there is surfaced
    /// unchanged as a [`ResolutionError`], never retried.
    pub fn collect(task: TaskDef) -> Result<Self, ResolutionError> {
        let class = task
            .task_class()
            .ok_or_else(|| {
                ResolutionError::new(&task.label, anyhow::anyhow!("task class is not resolved"))
            })?
            .clone();

        let inputs = class
            .input_dataset_types(&task.config)
            .map_err(|err| ResolutionError::new(&task.label, err))?;
        let outputs = class
            .output_dataset_types(&task.config)
            .map_err(|err| ResolutionError::new(&task.label, err))?;

        Ok(Self {
            task,
            inputs,
            outputs,
        })
    }
}

/// Pipeline-wide input and output dataset types.
///
/// `inputs` holds only *external* inputs: a type some task produces is fed
/// internally and never appears there, even when another task consumes it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineIo {
    pub inputs: BTreeSet<DatasetType>,
    pub outputs: BTreeSet<DatasetType>,
}

impl PipelineIo {
    pub fn aggregate(tasks: &[TaskDatasets]) -> Self {
        let mut inputs = BTreeSet::new();
        let mut outputs = BTreeSet::new();

        for task in tasks {
            inputs.extend(task.inputs.iter().cloned());
            outputs.extend(task.outputs.iter().cloned());
        }

        // A type produced by any task is internal, not an external input.
        let inputs = &inputs - &outputs;

        Self { inputs, outputs }
    }
}
