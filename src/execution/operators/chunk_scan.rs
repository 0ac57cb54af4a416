use std::rc::Rc;

use crate::{chunk::{ChunkCollection, DataChunk}, error::{ExecutionError, Result}, execution::context::ExecutionContext,
    types::LogicalType};

use super::{LocalState, OperatorState, PhysicalOperator};

// Leaf handing out the chunks of an already materialized collection, without copying
pub struct ChunkScan {
    collection: Rc<ChunkCollection>,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl ChunkScan {
    pub fn new(collection: Rc<ChunkCollection>) -> Self {
        let types = collection.types().to_vec();
        ChunkScan { collection, types, children: Vec::new() }
    }

    pub fn with_types(collection: Rc<ChunkCollection>, types: Vec<LogicalType>) -> Self {
        ChunkScan { collection, types, children: Vec::new() }
    }
}

impl PhysicalOperator for ChunkScan {
    fn name(&self) -> &'static str {
        "CHUNK_SCAN"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::ChunkScan { chunk_index: 0 }
    }

    fn get_chunk_internal(&self, _context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let chunk_index = match &mut state.local {
            LocalState::ChunkScan { chunk_index } => chunk_index,
            _ => return Err(ExecutionError::Representation("chunk scan without scan state".to_string())),
        };
        if *chunk_index >= self.collection.chunk_count() {
            return Ok(());
        }
        chunk.reference(self.collection.get_chunk(*chunk_index));
        *chunk_index += 1;
        Ok(())
    }

    fn estimate_cardinality(&self) -> usize {
        self.collection.count()
    }
}
