use itertools::Itertools;

use crate::{chunk::DataChunk, error::Result, execution::{context::ExecutionContext, expression::{Expression, ExpressionExecutor}},
    types::LogicalType};

use super::{OperatorState, PhysicalOperator};

// Computes one output column per expression over each input chunk
pub struct Projection {
    expressions: Vec<Expression>,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl Projection {
    pub fn new(child: Box<dyn PhysicalOperator>, expressions: Vec<Expression>, types: Vec<LogicalType>) -> Self {
        debug_assert_eq!(expressions.len(), types.len());
        Projection { expressions, types, children: vec![child] }
    }
}

impl PhysicalOperator for Projection {
    fn name(&self) -> &'static str {
        "PROJECTION"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        self.children[0].get_chunk(context, &mut state.child_chunk, &mut state.child_states[0])?;
        let input = &state.child_chunk;
        if input.size() == 0 {
            return Ok(());
        }
        for (expression, column) in self.expressions.iter().zip(chunk.columns.iter_mut()) {
            ExpressionExecutor::execute(expression, input, column)?;
        }
        chunk.set_cardinality(input.size());
        Ok(())
    }

    fn extra_render_information(&self) -> String {
        self.expressions.iter().join(", ")
    }
}
