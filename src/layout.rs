//! Validated arrangement of stages forming a layered DAG.

use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// An ordered sequence of stages whose edges have been checked. Data flows
/// from the first stage towards the last; edges only ever connect a stage to
/// the one immediately after it. Immutable once built.
pub struct Layout {
    stages: Vec<Stage>,
}

impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout").field("stages", &self.stages).finish()
    }
}

impl Layout {
    /// Validates and freezes a stage sequence.
    ///
    /// A valid layout meets these conditions:
    /// 1. nodes in the final stage must not declare outputs;
    /// 2. nodes in a non-final stage must declare at least one output;
    /// 3. every output must point to a processor in the next stage;
    /// 4. every node outside the first stage must be pointed to by an output
    ///    in the previous stage.
    ///
    /// The first violation is reported, naming the processor and the
    /// 1-indexed stage it sits in.
    pub fn new(stages: Vec<Stage>) -> PipelineResult<Self> {
        let layout = Self { stages };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.stages.is_empty() {
            return Err(PipelineError::EmptyLayout);
        }
        let last = self.stages.len() - 1;
        for (index, stage) in self.stages.iter().enumerate() {
            for node in stage.nodes() {
                if index == last && !node.downstream().is_empty() {
                    return Err(PipelineError::OutputsInFinalStage {
                        processor: node.name().to_string(),
                        stage: index + 1,
                    });
                }
                if index != last && node.downstream().is_empty() {
                    return Err(PipelineError::MissingOutputs {
                        processor: node.name().to_string(),
                        stage: index + 1,
                    });
                }
                if index < last {
                    let next = &self.stages[index + 1];
                    for target in node.downstream() {
                        if !next.has_processor(target) {
                            return Err(PipelineError::OutputNotInNextStage {
                                processor: node.name().to_string(),
                                stage: index + 1,
                            });
                        }
                    }
                }
                if index > 0 && !self.stages[index - 1].has_output(node.processor()) {
                    return Err(PipelineError::UnreachableProcessor {
                        processor: node.name().to_string(),
                        stage: index + 1,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub(crate) fn node_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.nodes().len()).sum()
    }
}
