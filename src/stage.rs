//! Grouping of stage nodes that run in parallel within one pipeline layer.

use std::sync::Arc;

use crate::node::StageNode;
use crate::processor::ProcessorRef;

/// An ordered group of nodes occupying the same pipeline layer. Every node in
/// a stage runs concurrently with its siblings.
pub struct Stage {
    nodes: Vec<StageNode>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage").field("nodes", &self.nodes).finish()
    }
}

impl Stage {
    /// Creates a stage from the nodes that will run in parallel.
    pub fn new<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = StageNode>,
    {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }

    pub(crate) fn nodes(&self) -> &[StageNode] {
        &self.nodes
    }

    /// True if the given processor is wrapped by one of this stage's nodes.
    pub(crate) fn has_processor(&self, processor: &ProcessorRef) -> bool {
        self.nodes
            .iter()
            .any(|node| Arc::ptr_eq(node.processor(), processor))
    }

    /// True if some node in this stage declares the processor as an output.
    pub(crate) fn has_output(&self, processor: &ProcessorRef) -> bool {
        self.nodes.iter().any(|node| {
            node.downstream()
                .iter()
                .any(|target| Arc::ptr_eq(target, processor))
        })
    }
}
