use crate::{chunk::DataChunk, error::Result, execution::{context::ExecutionContext, expression::{Expression, ExpressionExecutor}},
    types::LogicalType, vector::selection::SelectionVector};

use super::{OperatorState, PhysicalOperator};

/*
    Narrows its input with a predicate. Chunks where every row qualifies are passed on as plain
    references, otherwise the output columns become dictionary views over the child's columns.
    Chunks without any qualifying row are skipped, an empty output therefore always means the
    child is exhausted.
 */
pub struct Filter {
    predicate: Expression,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl Filter {
    pub fn new(child: Box<dyn PhysicalOperator>, predicate: Expression) -> Self {
        let types = child.types().to_vec();
        Filter { predicate, types, children: vec![child] }
    }
}

impl PhysicalOperator for Filter {
    fn name(&self) -> &'static str {
        "FILTER"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let mut selection = SelectionVector::new();
        loop {
            self.children[0].get_chunk(context, &mut state.child_chunk, &mut state.child_states[0])?;
            let input = &state.child_chunk;
            if input.size() == 0 {
                return Ok(());
            }
            let selected = ExpressionExecutor::select(&self.predicate, input, &mut selection)?;
            if selected == input.size() {
                chunk.reference(input);
                return Ok(());
            }
            if selected > 0 {
                return chunk.slice_from(input, &selection, selected, 0);
            }
        }
    }

    fn extra_render_information(&self) -> String {
        self.predicate.to_string()
    }
}
