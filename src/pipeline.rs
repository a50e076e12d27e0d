//! Pipeline and task definitions.
//!
//! A [`Pipeline`] is an ordered list of [`TaskDef`]s supplied by the caller.
//! The order is meaningful: it is the intended execution order, and the
//! built graph preserves it verbatim.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetType;

/// Grouping configuration: which named dimensions define one quantum of
/// work for a task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumConfig {
    pub dimensions: Vec<String>,
}

/// Resolved task configuration: the dataset types a task consumes and
/// produces, and the dimensions it groups its work by.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub inputs: Vec<DatasetType>,
    pub outputs: Vec<DatasetType>,
    pub quantum: QuantumConfig,
}

impl TaskConfig {
    pub fn new(
        inputs: impl IntoIterator<Item = DatasetType>,
        outputs: impl IntoIterator<Item = DatasetType>,
        dimensions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            outputs: outputs.into_iter().collect(),
            quantum: QuantumConfig {
                dimensions: dimensions.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Capabilities of a loaded task class.
///
/// The loading mechanism itself lives behind [`TaskFactory`]; the builder
/// only ever asks a resolved class which dataset types it consumes and
/// produces for a given configuration.
pub trait TaskKind: Send + Sync {
    fn input_dataset_types(&self, config: &TaskConfig) -> anyhow::Result<Vec<DatasetType>>;
    fn output_dataset_types(&self, config: &TaskConfig) -> anyhow::Result<Vec<DatasetType>>;
}

/// A task class whose dataset types are declared entirely in its config.
///
/// Lets a pipeline be described as plain data; task classes with computed
/// dataset types implement [`TaskKind`] themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfiguredTask;

impl TaskKind for ConfiguredTask {
    fn input_dataset_types(&self, config: &TaskConfig) -> anyhow::Result<Vec<DatasetType>> {
        Ok(config.inputs.clone())
    }

    fn output_dataset_types(&self, config: &TaskConfig) -> anyhow::Result<Vec<DatasetType>> {
        Ok(config.outputs.clone())
    }
}

/// One task of a pipeline: a label, the (possibly not yet fully-qualified)
/// task name, its configuration, and the resolved class once loaded.
///
/// Resolution never mutates an existing value; it produces a new one via
/// [`TaskDef::resolved`]. The class handle is skipped by serialization so a
/// transported graph stays a plain value; a deserialized def is simply
/// unresolved again.
#[derive(Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub label: String,
    pub task_name: String,
    pub config: TaskConfig,
    #[serde(skip)]
    task_class: Option<Arc<dyn TaskKind>>,
}

impl TaskDef {
    pub fn new(label: impl Into<String>, task_name: impl Into<String>, config: TaskConfig) -> Self {
        Self {
            label: label.into(),
            task_name: task_name.into(),
            config,
            task_class: None,
        }
    }

    /// Attach an already-loaded class, bypassing the factory.
    pub fn with_class(mut self, class: Arc<dyn TaskKind>) -> Self {
        self.task_class = Some(class);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.task_class.is_some()
    }

    pub fn task_class(&self) -> Option<&Arc<dyn TaskKind>> {
        self.task_class.as_ref()
    }

    /// A copy of this definition carrying the loaded class and the
    /// fully-qualified name reported by the factory.
    pub(crate) fn resolved(&self, class: Arc<dyn TaskKind>, qualified_name: String) -> Self {
        Self {
            label: self.label.clone(),
            task_name: qualified_name,
            config: self.config.clone(),
            task_class: Some(class),
        }
    }
}

impl std::fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDef")
            .field("label", &self.label)
            .field("task_name", &self.task_name)
            .field("config", &self.config)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Loads task classes by name.
///
/// The builder calls this at most once per task definition that arrives
/// unresolved; the result is cached on a copied definition.
pub trait TaskFactory: Send + Sync {
    /// Returns the loaded class together with its fully-qualified name.
    fn load_task_class(&self, task_name: &str) -> anyhow::Result<(Arc<dyn TaskKind>, String)>;
}

/// An ordered sequence of task definitions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Pipeline(Vec<TaskDef>);

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskDef) {
        self.0.push(task);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskDef> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TaskDef> for Pipeline {
    fn from_iter<I: IntoIterator<Item = TaskDef>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a TaskDef;
    type IntoIter = std::slice::Iter<'a, TaskDef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_copies_instead_of_mutating() {
        let config = TaskConfig::new(
            [DatasetType::new("raw")],
            [DatasetType::new("calibrated")],
            ["detector"],
        );
        let original = TaskDef::new("calibrate", "calibrate", config);
        let resolved = original.resolved(Arc::new(ConfiguredTask), "pkg.CalibrateTask".into());

        assert!(!original.is_resolved());
        assert_eq!(original.task_name, "calibrate");
        assert!(resolved.is_resolved());
        assert_eq!(resolved.task_name, "pkg.CalibrateTask");
        assert_eq!(resolved.label, original.label);
    }

    #[test]
    fn configured_task_reads_config() {
        let config = TaskConfig::new(
            [DatasetType::new("raw")],
            [DatasetType::new("calibrated")],
            ["detector"],
        );

        let inputs = ConfiguredTask.input_dataset_types(&config).unwrap();
        let outputs = ConfiguredTask.output_dataset_types(&config).unwrap();

        assert_eq!(inputs, vec![DatasetType::new("raw")]);
        assert_eq!(outputs, vec![DatasetType::new("calibrated")]);
    }
}
