use crate::{chunk::DataChunk, error::{ExecutionError, Result}, execution::context::ExecutionContext, types::LogicalType};

use super::{LocalState, OperatorState, PhysicalOperator};

// Bag union, all rows of the first child and then all rows of the second
pub struct Union {
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl Union {
    pub fn new(top: Box<dyn PhysicalOperator>, bottom: Box<dyn PhysicalOperator>) -> Self {
        let types = top.types().to_vec();
        Union { types, children: vec![top, bottom] }
    }
}

impl PhysicalOperator for Union {
    fn name(&self) -> &'static str {
        "UNION"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::Union { active_child: 0 }
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let active_child = match &mut state.local {
            LocalState::Union { active_child } => active_child,
            _ => return Err(ExecutionError::Representation("union without union state".to_string())),
        };
        // Children write straight into our output, their types are ours
        while *active_child < self.children.len() {
            self.children[*active_child].get_chunk(context, chunk, &mut state.child_states[*active_child])?;
            if chunk.size() > 0 {
                return Ok(());
            }
            *active_child += 1;
        }
        Ok(())
    }

    fn estimate_cardinality(&self) -> usize {
        self.children.iter().map(|child| child.estimate_cardinality()).sum()
    }
}

#[cfg(test)]
mod test {
    use crate::{execution::operators::{collect_all, test_util::*}, types::Value};

    use super::*;

    #[test]
    fn test_union() {
        let top = source(vec![LogicalType::Integer], (0..1500).map(|i| vec![Value::Integer(i)]));
        let bottom = source(vec![LogicalType::Integer], (0..3).map(|i| vec![Value::Integer(-i)]));
        let union = Union::new(top, bottom);
        assert_eq!(union.estimate_cardinality(), 1503);
        let result = collect_all(&union, &context()).unwrap();
        assert_eq!(result.count(), 1503);
        assert_eq!(result.get_value(0, 1499).unwrap(), Value::Integer(1499));
        assert_eq!(result.get_value(0, 1502).unwrap(), Value::Integer(-2));
    }

    #[test]
    fn test_union_with_empty_first_child() {
        let top = source(vec![LogicalType::Varchar], Vec::new());
        let bottom = source(vec![LogicalType::Varchar], vec![vec![Value::varchar("only")]]);
        let result = collect_all(&Union::new(top, bottom), &context()).unwrap();
        assert_eq!(rows(&result), vec![vec![Value::varchar("only")]]);
    }
}
