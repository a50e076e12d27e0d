//! End-to-end builds against in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use quantagraph::{
    BuildError, ConfiguredTask, DataId, DataRow, DatasetId, DatasetRef, DatasetType,
    DimensionUniverse, Expression, ExpressionParser, GraphBuilder, OriginInfo, Pipeline,
    QuantumGraph, Registry, TaskConfig, TaskDef, TaskFactory, TaskKind,
};

#[derive(Default)]
struct CountingFactory {
    calls: AtomicUsize,
}

impl TaskFactory for CountingFactory {
    fn load_task_class(&self, task_name: &str) -> anyhow::Result<(Arc<dyn TaskKind>, String)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((Arc::new(ConfiguredTask), format!("tasks.{task_name}")))
    }
}

/// Accepts everything except unbalanced parentheses.
struct ParenParser;

impl ExpressionParser for ParenParser {
    fn parse(&self, text: &str) -> anyhow::Result<Expression> {
        let opens = text.chars().filter(|&c| c == '(').count();
        let closes = text.chars().filter(|&c| c == ')').count();
        if opens != closes {
            anyhow::bail!("unbalanced parenthesis");
        }
        Ok(Expression::new(text.trim()))
    }
}

struct StaticCatalog {
    universe: DimensionUniverse,
    rows: Vec<DataRow>,
}

impl StaticCatalog {
    fn new(rows: Vec<DataRow>) -> Self {
        let mut universe = DimensionUniverse::new();
        universe.insert("detector", ["detector"]);
        universe.insert("tract", ["tract"]);
        Self { universe, rows }
    }
}

impl Registry for StaticCatalog {
    fn universe(&self) -> &DimensionUniverse {
        &self.universe
    }

    fn select_rows(
        &self,
        _origin: &OriginInfo,
        _expression: Option<&Expression>,
        _inputs: &[DatasetType],
        _outputs: &[DatasetType],
    ) -> anyhow::Result<Vec<DataRow>> {
        Ok(self.rows.clone())
    }
}

struct FailingCatalog;

impl Registry for FailingCatalog {
    fn universe(&self) -> &DimensionUniverse {
        unreachable!("select fails first")
    }

    fn select_rows(
        &self,
        _origin: &OriginInfo,
        _expression: Option<&Expression>,
        _inputs: &[DatasetType],
        _outputs: &[DatasetType],
    ) -> anyhow::Result<Vec<DataRow>> {
        anyhow::bail!("catalog unavailable")
    }
}

/// TaskA: raw -> calibrated per detector; TaskB: calibrated -> coadd per tract.
fn two_task_pipeline() -> Pipeline {
    [
        TaskDef::new(
            "calibrate",
            "CalibrateTask",
            TaskConfig::new(
                [DatasetType::new("raw")],
                [DatasetType::new("calibrated")],
                ["detector"],
            ),
        ),
        TaskDef::new(
            "coadd",
            "CoaddTask",
            TaskConfig::new(
                [DatasetType::new("calibrated")],
                [DatasetType::new("coadd")],
                ["tract"],
            ),
        ),
    ]
    .into_iter()
    .collect()
}

/// Two rows differing only in detector, sharing tract 5. `calibrated_ids`
/// optionally pre-materializes the calibrated output per detector.
fn two_detector_rows(calibrated_ids: [Option<u64>; 2]) -> Vec<DataRow> {
    let mut rows = Vec::new();

    for (i, detector) in [1i64, 2].into_iter().enumerate() {
        let full: DataId = [("detector", detector), ("tract", 5)].into_iter().collect();
        let per_det: DataId = [("detector", detector)].into_iter().collect();
        let per_tract: DataId = [("tract", 5)].into_iter().collect();

        let raw = DatasetRef::new(DatasetType::new("raw"), per_det.clone())
            .with_id(DatasetId(100 + detector as u64));
        let mut calibrated = DatasetRef::new(DatasetType::new("calibrated"), per_det);
        if let Some(id) = calibrated_ids[i] {
            calibrated = calibrated.with_id(DatasetId(id));
        }
        let coadd = DatasetRef::new(DatasetType::new("coadd"), per_tract);

        rows.push(
            DataRow::new(full)
                .with_ref(raw)
                .with_ref(calibrated)
                .with_ref(coadd),
        );
    }

    rows
}

fn origin() -> OriginInfo {
    OriginInfo {
        input_collections: vec![String::from("main")],
        output_collection: String::from("run"),
    }
}

fn build(catalog: &StaticCatalog, skip_existing: bool) -> Result<QuantumGraph, BuildError> {
    let factory = CountingFactory::default();
    GraphBuilder::new(&factory, catalog, &ParenParser)
        .skip_existing(skip_existing)
        .make_graph(&two_task_pipeline(), &origin(), None)
}

#[test]
fn groups_per_task_dimensions() {
    let catalog = StaticCatalog::new(two_detector_rows([None, None]));
    let graph = build(&catalog, true).unwrap();

    assert_eq!(graph.len(), 2);

    let calibrate = &graph.nodes()[0];
    assert_eq!(calibrate.task.label, "calibrate");
    assert_eq!(calibrate.quanta.len(), 2);

    let coadd = &graph.nodes()[1];
    assert_eq!(coadd.task.label, "coadd");
    assert_eq!(coadd.quanta.len(), 1);
    // the single tract quantum consumes both calibrated references
    assert_eq!(coadd.quanta[0].input_refs().count(), 2);
    assert_eq!(coadd.quanta[0].output_refs().count(), 1);
}

#[test]
fn fully_existing_quantum_is_skipped() {
    let catalog = StaticCatalog::new(two_detector_rows([Some(7), None]));
    let graph = build(&catalog, true).unwrap();

    let calibrate = &graph.nodes()[0];
    assert_eq!(calibrate.quanta.len(), 1);
    let quantum = &calibrate.quanta[0];
    let input = quantum.input_refs().next().unwrap();
    assert_eq!(input.data_id().get("detector"), Some(&2i64.into()));

    // downstream task still groups by tract and proceeds
    let coadd = &graph.nodes()[1];
    assert_eq!(coadd.quanta.len(), 1);
    assert_eq!(coadd.quanta[0].input_refs().count(), 2);
}

#[test]
fn fully_existing_quantum_conflicts_when_not_skipping() {
    let catalog = StaticCatalog::new(two_detector_rows([Some(7), None]));
    let err = build(&catalog, false).unwrap_err();

    match err {
        BuildError::OutputConflict(conflict) => {
            assert_eq!(conflict.task, "tasks.CalibrateTask");
            assert_eq!(conflict.refs.len(), 1);
            assert_eq!(conflict.refs[0].id(), Some(DatasetId(7)));
        }
        other => panic!("expected output conflict, got {other:?}"),
    }
}

#[test]
fn malformed_filter_is_an_expression_error() {
    let catalog = StaticCatalog::new(two_detector_rows([None, None]));
    let factory = CountingFactory::default();

    let err = GraphBuilder::new(&factory, &catalog, &ParenParser)
        .make_graph(&two_task_pipeline(), &origin(), Some("visit > 3 AND (detector = 1"))
        .unwrap_err();

    match err {
        BuildError::Expression(expr) => {
            assert_eq!(expr.expr, "visit > 3 AND (detector = 1");
            assert!(expr.reason.contains("unbalanced"));
        }
        other => panic!("expected expression error, got {other:?}"),
    }
}

#[test]
fn empty_filter_skips_the_parser() {
    struct PanickyParser;
    impl ExpressionParser for PanickyParser {
        fn parse(&self, _text: &str) -> anyhow::Result<Expression> {
            panic!("parser must not see empty filters");
        }
    }

    let catalog = StaticCatalog::new(two_detector_rows([None, None]));
    let factory = CountingFactory::default();
    let builder = GraphBuilder::new(&factory, &catalog, &PanickyParser);

    builder.make_graph(&two_task_pipeline(), &origin(), None).unwrap();
    builder.make_graph(&two_task_pipeline(), &origin(), Some("   ")).unwrap();
}

#[test]
fn catalog_failure_propagates() {
    let factory = CountingFactory::default();
    let err = GraphBuilder::new(&factory, &FailingCatalog, &ParenParser)
        .make_graph(&two_task_pipeline(), &origin(), None)
        .unwrap_err();

    match err {
        BuildError::Catalog(catalog) => {
            assert!(catalog.to_string().contains("catalog unavailable"));
        }
        other => panic!("expected catalog error, got {other:?}"),
    }
}

#[test]
fn node_order_matches_pipeline_even_when_empty() {
    let catalog = StaticCatalog::new(Vec::new());
    let graph = build(&catalog, true).unwrap();

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.nodes()[0].task.label, "calibrate");
    assert_eq!(graph.nodes()[1].task.label, "coadd");
    assert!(graph.iter().all(|node| node.quanta.is_empty()));
}

#[test]
fn builds_are_deterministic_under_row_reordering() {
    let forward = StaticCatalog::new(two_detector_rows([None, None]));
    let mut reversed_rows = two_detector_rows([None, None]);
    reversed_rows.reverse();
    let reversed = StaticCatalog::new(reversed_rows);

    let a = build(&forward, true).unwrap();
    let b = build(&reversed, true).unwrap();

    assert_eq!(a.len(), b.len());
    for (left, right) in a.iter().zip(b.iter()) {
        assert_eq!(left.quanta, right.quanta);
    }
}

#[test]
fn caller_pipeline_is_never_mutated() {
    let pipeline = two_task_pipeline();
    let catalog = StaticCatalog::new(two_detector_rows([None, None]));
    let factory = CountingFactory::default();

    GraphBuilder::new(&factory, &catalog, &ParenParser)
        .make_graph(&pipeline, &origin(), None)
        .unwrap();

    for task in &pipeline {
        assert!(!task.is_resolved());
    }
    assert_eq!(pipeline.iter().next().unwrap().task_name, "CalibrateTask");
}

#[test]
fn factory_loads_each_unresolved_task_once() {
    let catalog = StaticCatalog::new(two_detector_rows([None, None]));
    let factory = CountingFactory::default();

    GraphBuilder::new(&factory, &catalog, &ParenParser)
        .make_graph(&two_task_pipeline(), &origin(), None)
        .unwrap();
    assert_eq!(factory.calls.load(Ordering::SeqCst), 2);

    // pre-resolved definitions bypass the factory entirely
    let resolved: Pipeline = two_task_pipeline()
        .iter()
        .map(|task| task.clone().with_class(Arc::new(ConfiguredTask)))
        .collect();
    let factory = CountingFactory::default();

    GraphBuilder::new(&factory, &catalog, &ParenParser)
        .make_graph(&resolved, &origin(), None)
        .unwrap();
    assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn resolution_failure_surfaces() {
    struct BrokenFactory;
    impl TaskFactory for BrokenFactory {
        fn load_task_class(&self, task_name: &str) -> anyhow::Result<(Arc<dyn TaskKind>, String)> {
            anyhow::bail!("no such module: {task_name}")
        }
    }

    let catalog = StaticCatalog::new(Vec::new());
    let err = GraphBuilder::new(&BrokenFactory, &catalog, &ParenParser)
        .make_graph(&two_task_pipeline(), &origin(), None)
        .unwrap_err();

    match err {
        BuildError::Resolution(resolution) => assert_eq!(resolution.task, "calibrate"),
        other => panic!("expected resolution error, got {other:?}"),
    }
}

#[test]
fn built_graph_survives_transport() {
    let catalog = StaticCatalog::new(two_detector_rows([None, None]));
    let graph = build(&catalog, true).unwrap();

    let mut buffer = Vec::new();
    graph.to_writer(&mut buffer).unwrap();
    let decoded = QuantumGraph::from_reader(buffer.as_slice()).unwrap();

    assert_eq!(decoded.len(), graph.len());
    for (before, after) in graph.iter().zip(decoded.iter()) {
        assert_eq!(before.task.label, after.task.label);
        assert_eq!(before.task.task_name, after.task.task_name);
        assert_eq!(before.task.config, after.task.config);
        assert_eq!(before.quanta, after.quanta);
        // class handles are runtime-only and do not travel
        assert!(!after.task.is_resolved());
    }
}

#[test]
fn dedup_invariant_holds_across_the_graph() {
    let catalog = StaticCatalog::new(two_detector_rows([None, None]));
    let graph = build(&catalog, true).unwrap();

    for node in &graph {
        for quantum in &node.quanta {
            let inputs: Vec<_> = quantum
                .input_refs()
                .map(|r| (r.dataset_type().clone(), r.data_id().clone()))
                .collect();
            let mut deduped = inputs.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(inputs.len(), deduped.len());

            let outputs: Vec<_> = quantum
                .output_refs()
                .map(|r| (r.dataset_type().clone(), r.data_id().clone()))
                .collect();
            let mut deduped = outputs.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(outputs.len(), deduped.len());
        }
    }
}
