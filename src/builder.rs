//! Graph construction: orchestration of the whole build.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info};

use crate::collect::{PipelineIo, TaskDatasets};
use crate::dataset::{DataRow, DatasetType};
use crate::error::{
    BuildError, CatalogError, ExpressionError, OutputConflictError, ResolutionError,
};
use crate::graph::{QuantumGraph, QuantumGraphNode};
use crate::partition::{Disposition, evaluate_outputs, partition_rows};
use crate::pipeline::{Pipeline, TaskDef, TaskFactory};
use crate::registry::{DimensionUniverse, Expression, ExpressionParser, OriginInfo, Registry};

/// Builds task execution graphs from a pipeline.
///
/// One builder serves many [`make_graph`](GraphBuilder::make_graph) calls;
/// each call is a single synchronous pass that owns all of its working
/// state. The full row sequence is materialized in memory for the duration
/// of a build, so the resolved data space bounds how large a build can get.
///
/// # Example
///
/// ```rust,no_run
/// # fn demo(
/// #     factory: &dyn quantagraph::TaskFactory,
/// #     registry: &dyn quantagraph::Registry,
/// #     parser: &dyn quantagraph::ExpressionParser,
/// #     pipeline: &quantagraph::Pipeline,
/// #     origin: &quantagraph::OriginInfo,
/// # ) -> Result<(), quantagraph::BuildError> {
/// use quantagraph::GraphBuilder;
///
/// let builder = GraphBuilder::new(factory, registry, parser).skip_existing(true);
/// let graph = builder.make_graph(pipeline, origin, Some("visit > 100"))?;
/// # Ok(()) }
/// ```
pub struct GraphBuilder<'a> {
    factory: &'a dyn TaskFactory,
    registry: &'a dyn Registry,
    parser: &'a dyn ExpressionParser,
    skip_existing: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        factory: &'a dyn TaskFactory,
        registry: &'a dyn Registry,
        parser: &'a dyn ExpressionParser,
    ) -> Self {
        Self {
            factory,
            registry,
            parser,
            skip_existing: true,
        }
    }

    /// Whether a quantum whose outputs *all* pre-exist is silently dropped
    /// (`true`, the default) or reported as a conflict (`false`). Partial
    /// pre-existence is always a conflict.
    pub fn skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Create the execution graph for `pipeline`.
    ///
    /// `user_query` restricts the data space; empty or absent text means no
    /// restriction. The caller's pipeline is never mutated; task
    /// definitions needing class resolution are copied.
    ///
    /// # Errors
    ///
    /// [`ExpressionError`] when the filter text fails to parse,
    /// [`OutputConflictError`] when a candidate quantum collides with
    /// pre-existing outputs, [`ResolutionError`](crate::ResolutionError)
    /// when a task class cannot be loaded, and
    /// [`CatalogError`] propagated verbatim from the registry. Any failure
    /// aborts the whole build; no partial graph is returned.
    pub fn make_graph(
        &self,
        pipeline: &Pipeline,
        origin: &OriginInfo,
        user_query: Option<&str>,
    ) -> Result<QuantumGraph, BuildError> {
        let tasks = pipeline
            .iter()
            .map(|task| self.resolve_task(task))
            .collect::<Result<Vec<_>, BuildError>>()?;

        let tasks = tasks
            .into_iter()
            .map(TaskDatasets::collect)
            .collect::<Result<Vec<_>, _>>()?;

        let io = PipelineIo::aggregate(&tasks);
        debug!(
            inputs = ?io.inputs,
            outputs = ?io.outputs,
            "aggregated pipeline dataset types"
        );

        let expression = self.parse_user_query(user_query)?;

        let inputs: Vec<DatasetType> = io.inputs.into_iter().collect();
        let outputs: Vec<DatasetType> = io.outputs.into_iter().collect();
        let rows = self
            .registry
            .select_rows(origin, expression.as_ref(), &inputs, &outputs)
            .map_err(CatalogError)?;
        info!(rows = rows.len(), "resolved candidate data rows");

        let universe = self.registry.universe();

        // Each task partitions the shared row sequence into its own private
        // buckets, so the per-task work fans out across the rayon pool;
        // collect re-serializes the nodes back into pipeline order.
        let nodes = tasks
            .into_par_iter()
            .map(|task| self.make_task_node(task, universe, &rows))
            .collect::<Result<Vec<_>, BuildError>>()?;

        let graph: QuantumGraph = nodes.into_iter().collect();
        info!(
            tasks = graph.len(),
            quanta = graph.quantum_count(),
            "built quantum graph"
        );
        Ok(graph)
    }

    /// Make sure the task class is loaded, copying the definition rather
    /// than touching the caller's value. The factory is consulted at most
    /// once per unresolved definition.
    fn resolve_task(&self, task: &TaskDef) -> Result<TaskDef, BuildError> {
        if task.is_resolved() {
            return Ok(task.clone());
        }

        let (class, qualified_name) = self
            .factory
            .load_task_class(&task.task_name)
            .map_err(|err| ResolutionError::new(&task.label, err))?;
        debug!(task = %task.label, class = %qualified_name, "loaded task class");

        Ok(task.resolved(class, qualified_name))
    }

    fn parse_user_query(
        &self,
        user_query: Option<&str>,
    ) -> Result<Option<Expression>, ExpressionError> {
        let text = match user_query {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Ok(None),
        };

        let expression = self
            .parser
            .parse(text)
            .map_err(|err| ExpressionError::new(text, err))?;
        debug!(expression = %expression, "parsed user expression");

        Ok(Some(expression))
    }

    /// Partition the rows for one task and apply the output-existence
    /// policy to every candidate quantum.
    fn make_task_node(
        &self,
        task: TaskDatasets,
        universe: &DimensionUniverse,
        rows: &[DataRow],
    ) -> Result<QuantumGraphNode, BuildError> {
        let buckets = partition_rows(&task, universe, rows)?;

        let mut quanta = Vec::with_capacity(buckets.len());
        for (key, accumulator) in buckets {
            match evaluate_outputs(&accumulator.output_refs(), self.skip_existing) {
                Disposition::Proceed => quanta.push(accumulator.into_quantum()),
                Disposition::Skip => {
                    debug!(task = %task.task.label, key = %key, "all outputs exist, skipping quantum");
                }
                Disposition::Conflict(refs) => {
                    return Err(OutputConflictError {
                        task: task.task.task_name.clone(),
                        refs,
                    }
                    .into());
                }
            }
        }

        debug!(task = %task.task.label, quanta = quanta.len(), "collected task quanta");
        Ok(QuantumGraphNode::new(task.task, quanta))
    }
}
