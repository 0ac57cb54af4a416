use crate::{chunk::DataChunk, error::{ExecutionError, Result}, execution::context::ExecutionContext, types::LogicalType,
    vector::selection::SelectionVector};

use super::{LocalState, OperatorState, PhysicalOperator};

// Skips `offset` rows, then passes on at most `limit` rows
pub struct Limit {
    limit: usize,
    offset: usize,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl Limit {
    pub fn new(child: Box<dyn PhysicalOperator>, limit: usize, offset: usize) -> Self {
        let types = child.types().to_vec();
        Limit { limit, offset, types, children: vec![child] }
    }
}

impl PhysicalOperator for Limit {
    fn name(&self) -> &'static str {
        "LIMIT"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::Limit { current_offset: 0 }
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let current_offset = match &mut state.local {
            LocalState::Limit { current_offset } => current_offset,
            _ => return Err(ExecutionError::Representation("limit without limit state".to_string())),
        };
        let max_element = self.limit.saturating_add(self.offset);
        loop {
            // Done once the limit is reached, the rest of the input is never pulled
            if *current_offset >= max_element {
                return Ok(());
            }
            self.children[0].get_chunk(context, &mut state.child_chunk, &mut state.child_states[0])?;
            let input = &state.child_chunk;
            let count = input.size();
            if count == 0 {
                return Ok(());
            }
            let chunk_start = *current_offset;
            *current_offset += count;
            if chunk_start + count <= self.offset {
                continue;
            }
            if chunk_start < self.offset {
                let start = self.offset - chunk_start;
                let emit = (count - start).min(max_element - self.offset);
                return chunk.slice_from(input, &SelectionVector::offset(start), emit, 0);
            }
            chunk.reference(input);
            chunk.set_cardinality(count.min(max_element - chunk_start));
            return Ok(());
        }
    }

    fn estimate_cardinality(&self) -> usize {
        self.children[0].estimate_cardinality().saturating_sub(self.offset).min(self.limit)
    }

    fn extra_render_information(&self) -> String {
        format!("limit: {}, offset: {}", self.limit, self.offset)
    }
}

#[cfg(test)]
mod test {
    use crate::{execution::operators::{collect_all, test_util::*}, types::Value};

    use super::*;

    fn integers(count: i32) -> Box<dyn PhysicalOperator> {
        source(vec![LogicalType::Integer], (0..count).map(|i| vec![Value::Integer(i)]))
    }

    fn limited(limit: usize, offset: usize, count: i32) -> Vec<i32> {
        let result = collect_all(&Limit::new(integers(count), limit, offset), &context()).unwrap();
        rows(&result).into_iter().map(|row| row[0].as_i64().unwrap() as i32).collect()
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(limited(5, 0, 3000), (0..5).collect::<Vec<_>>());
        assert_eq!(limited(5, 1022, 3000), (1022..1027).collect::<Vec<_>>());
        assert_eq!(limited(2000, 1500, 3000), (1500..3000).collect::<Vec<_>>());
        assert_eq!(limited(10, 2048, 3000), (2048..2058).collect::<Vec<_>>());
        assert!(limited(10, 3000, 3000).is_empty());
        assert!(limited(0, 0, 3000).is_empty());
        assert_eq!(limited(usize::MAX, 0, 1100).len(), 1100);
    }

    #[test]
    fn test_limit_estimate() {
        assert_eq!(Limit::new(integers(100), 30, 80).estimate_cardinality(), 20);
        assert_eq!(Limit::new(integers(100), 30, 10).estimate_cardinality(), 30);
    }
}
