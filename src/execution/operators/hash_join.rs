use ahash::AHashMap;
use itertools::Itertools;

use crate::{chunk::{ChunkCollection, DataChunk}, error::{ExecutionError, Result},
    execution::{context::ExecutionContext, expression::{Expression, ExpressionExecutor}},
    types::{LogicalType, Value}, vector::{operations, selection::SelectionVector, Vector, STANDARD_VECTOR_SIZE}};

use super::{LocalState, OperatorState, PhysicalOperator};

// left = right, each side evaluated against its own child's output
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub left: Expression,
    pub right: Expression,
}

impl JoinCondition {
    pub fn new(left: Expression, right: Expression) -> Self {
        JoinCondition { left, right }
    }
}

pub struct HashJoinState {
    built: bool,
    build_data: ChunkCollection,
    // Join key -> build rows carrying it
    table: AHashMap<Vec<Value>, Vec<usize>>,
    probe_chunk: DataChunk,
    probe_keys: Vec<Vector>,
    // Where to continue probing, a probe row can match more rows than fit in one chunk
    probe_row: usize,
    match_position: usize,
}

/*
    Inner equi-join. The left child is drained into a hash table on the first pull, then the
    right child is streamed through it. Output columns are the left columns followed by the
    right columns. Rows with a NULL in any key never match.
 */
pub struct HashJoin {
    conditions: Vec<JoinCondition>,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl HashJoin {
    pub fn new(left: Box<dyn PhysicalOperator>, right: Box<dyn PhysicalOperator>, conditions: Vec<JoinCondition>) -> Self {
        let types = left.types().iter().chain(right.types()).cloned().collect();
        HashJoin { conditions, types, children: vec![left, right] }
    }

    fn build(&self, context: &ExecutionContext, state: &mut OperatorState) -> Result<()> {
        let join = match &mut state.local {
            LocalState::HashJoin(join) => join,
            _ => return Err(ExecutionError::Representation("hash join without join state".to_string())),
        };
        loop {
            self.children[0].get_chunk(context, &mut state.child_chunk, &mut state.child_states[0])?;
            let input = &state.child_chunk;
            if input.size() == 0 {
                break;
            }
            let keys = self.conditions.iter()
                .map(|condition| ExpressionExecutor::evaluate(&condition.left, input))
                .collect::<Result<Vec<_>>>()?;
            let base = join.build_data.count();
            for row in 0..input.size() {
                if let Some(key) = join_key(&keys, row)? {
                    join.table.entry(key).or_insert_with(Vec::new).push(base + row);
                }
            }
            join.build_data.append(input)?;
        }
        join.built = true;
        tracing::debug!(rows = join.build_data.count(), keys = join.table.len(), "built hash table");
        Ok(())
    }
}

// None when any key column is NULL
fn join_key(keys: &[Vector], row: usize) -> Result<Option<Vec<Value>>> {
    let mut key = Vec::with_capacity(keys.len());
    for column in keys {
        let value = column.get_value(row)?;
        if value.is_null() {
            return Ok(None);
        }
        key.push(value);
    }
    Ok(Some(key))
}

impl PhysicalOperator for HashJoin {
    fn name(&self) -> &'static str {
        "HASH_JOIN"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        let mut build_data = ChunkCollection::new();
        build_data.set_types(self.children[0].types().to_vec());
        LocalState::HashJoin(HashJoinState {
            built: false,
            build_data,
            table: AHashMap::new(),
            probe_chunk: self.children[1].initialize_chunk(),
            probe_keys: Vec::new(),
            probe_row: 0,
            match_position: 0,
        })
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let built = match &state.local {
            LocalState::HashJoin(join) => join.built,
            _ => return Err(ExecutionError::Representation("hash join without join state".to_string())),
        };
        if !built {
            self.build(context, state)?;
        }
        let join = match &mut state.local {
            LocalState::HashJoin(join) => join,
            _ => return Err(ExecutionError::Representation("hash join without join state".to_string())),
        };
        if join.table.is_empty() {
            return Ok(());
        }
        let left_columns = self.children[0].types().len();
        let mut build_rows = Vec::with_capacity(STANDARD_VECTOR_SIZE);
        let mut probe_selection = SelectionVector::new();
        loop {
            if join.probe_row >= join.probe_chunk.size() {
                self.children[1].get_chunk(context, &mut join.probe_chunk, &mut state.child_states[1])?;
                if join.probe_chunk.size() == 0 {
                    return Ok(());
                }
                join.probe_keys = self.conditions.iter()
                    .map(|condition| ExpressionExecutor::evaluate(&condition.right, &join.probe_chunk))
                    .collect::<Result<Vec<_>>>()?;
                join.probe_row = 0;
                join.match_position = 0;
            }
            while join.probe_row < join.probe_chunk.size() && build_rows.len() < STANDARD_VECTOR_SIZE {
                if let Some(matches) = join_key(&join.probe_keys, join.probe_row)?.and_then(|key| join.table.get(&key)) {
                    while join.match_position < matches.len() && build_rows.len() < STANDARD_VECTOR_SIZE {
                        probe_selection.set_index(build_rows.len(), join.probe_row);
                        build_rows.push(matches[join.match_position]);
                        join.match_position += 1;
                    }
                    if join.match_position < matches.len() {
                        break;
                    }
                }
                join.probe_row += 1;
                join.match_position = 0;
            }
            if !build_rows.is_empty() {
                break;
            }
        }
        for (row, build_row) in build_rows.iter().enumerate() {
            let (chunk_index, offset) = join.build_data.locate_chunk(*build_row);
            let source = join.build_data.get_chunk(chunk_index);
            for (source_column, target_column) in source.columns.iter().zip(chunk.columns[..left_columns].iter_mut()) {
                operations::copy_entry(source_column, offset, target_column, row)?;
            }
        }
        chunk.slice_from(&join.probe_chunk, &probe_selection, build_rows.len(), left_columns)
    }

    fn extra_render_information(&self) -> String {
        self.conditions.iter().map(|condition| format!("{} = {}", condition.left, condition.right)).join(" AND ")
    }
}
