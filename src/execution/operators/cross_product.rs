use crate::{chunk::{ChunkCollection, DataChunk}, error::{ExecutionError, Result}, execution::context::ExecutionContext,
    types::LogicalType};

use super::{LocalState, OperatorState, PhysicalOperator};

pub struct CrossProductState {
    right_data: Option<ChunkCollection>,
    // Next right row to combine with the current left chunk
    right_position: usize,
}

/*
    Every left row combined with every right row. The right side is materialized up front,
    each output chunk is one left chunk next to a single right row broadcast as constants.
 */
pub struct CrossProduct {
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl CrossProduct {
    pub fn new(left: Box<dyn PhysicalOperator>, right: Box<dyn PhysicalOperator>) -> Self {
        let types = left.types().iter().chain(right.types()).cloned().collect();
        CrossProduct { types, children: vec![left, right] }
    }
}

impl PhysicalOperator for CrossProduct {
    fn name(&self) -> &'static str {
        "CROSS_PRODUCT"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::CrossProduct(CrossProductState { right_data: None, right_position: 0 })
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let cross = match &mut state.local {
            LocalState::CrossProduct(cross) => cross,
            _ => return Err(ExecutionError::Representation("cross product without state".to_string())),
        };
        if cross.right_data.is_none() {
            let mut right_data = ChunkCollection::new();
            right_data.set_types(self.children[1].types().to_vec());
            let mut right_chunk = self.children[1].initialize_chunk();
            loop {
                self.children[1].get_chunk(context, &mut right_chunk, &mut state.child_states[1])?;
                if right_chunk.size() == 0 {
                    break;
                }
                right_data.append(&right_chunk)?;
            }
            cross.right_data = Some(right_data);
            // forces a pull of the first left chunk
            cross.right_position = usize::MAX;
        }
        let right_data = match &cross.right_data {
            Some(right_data) if right_data.count() > 0 => right_data,
            _ => return Ok(()),
        };
        if cross.right_position >= right_data.count() {
            self.children[0].get_chunk(context, &mut state.child_chunk, &mut state.child_states[0])?;
            if state.child_chunk.size() == 0 {
                return Ok(());
            }
            cross.right_position = 0;
        }
        let left = &state.child_chunk;
        let left_columns = left.column_count();
        for (column, left_column) in chunk.columns.iter_mut().zip(left.columns.iter()) {
            column.reference(left_column);
        }
        for (i, column) in chunk.columns[left_columns..].iter_mut().enumerate() {
            column.reference_value(&right_data.get_value(i, cross.right_position)?)?;
        }
        chunk.set_cardinality(left.size());
        cross.right_position += 1;
        Ok(())
    }

    fn estimate_cardinality(&self) -> usize {
        self.children[0].estimate_cardinality().saturating_mul(self.children[1].estimate_cardinality())
    }
}
