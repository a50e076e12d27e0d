//! The built execution graph.
//!
//! A [`QuantumGraph`] is the final product of a build: one node per
//! pipeline task, in pipeline order, each carrying the task's surviving
//! quanta. It is a plain value with no resources attached, so it can be
//! handed to an execution process living elsewhere; [`QuantumGraph::to_writer`]
//! and [`QuantumGraph::from_reader`] provide the binary transport form.

use std::io;

use serde::{Deserialize, Serialize};

use crate::pipeline::TaskDef;
use crate::quantum::Quantum;

/// All quanta of one task, in canonical quantum-key order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuantumGraphNode {
    pub task: TaskDef,
    pub quanta: Vec<Quantum>,
}

impl QuantumGraphNode {
    pub fn new(task: TaskDef, quanta: Vec<Quantum>) -> Self {
        Self { task, quanta }
    }
}

/// Execution graph for a whole pipeline: one node per task, task order
/// preserved verbatim from the input pipeline, empty quantum lists kept.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuantumGraph {
    nodes: Vec<QuantumGraphNode>,
}

impl QuantumGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: QuantumGraphNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[QuantumGraphNode] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QuantumGraphNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total quantum count across all nodes.
    pub fn quantum_count(&self) -> usize {
        self.nodes.iter().map(|node| node.quanta.len()).sum()
    }

    /// Encode into the binary transport form.
    pub fn to_writer<W: io::Write>(&self, writer: W) -> io::Result<()> {
        ciborium::into_writer(self, writer).map_err(io::Error::other)
    }

    /// Decode from the binary transport form. Task definitions come back
    /// unresolved; classes are runtime handles, not part of the value.
    pub fn from_reader<R: io::Read>(reader: R) -> io::Result<Self> {
        ciborium::from_reader(reader).map_err(io::Error::other)
    }
}

impl FromIterator<QuantumGraphNode> for QuantumGraph {
    fn from_iter<I: IntoIterator<Item = QuantumGraphNode>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a QuantumGraph {
    type Item = &'a QuantumGraphNode;
    type IntoIter = std::slice::Iter<'a, QuantumGraphNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
