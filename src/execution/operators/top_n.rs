use itertools::Itertools;

use crate::{chunk::{DataChunk, OrderByNullType}, error::{ExecutionError, Result}, execution::context::ExecutionContext,
    types::LogicalType};

use super::{order::{consume_input, BoundOrderByNode, SortedInput}, LocalState, OperatorState, PhysicalOperator};

pub struct TopNState {
    sorted: Option<SortedInput>,
    position: usize,
}

// ORDER BY with LIMIT/OFFSET, keeping only the best `limit + offset` rows in a bounded heap
pub struct TopN {
    orders: Vec<BoundOrderByNode>,
    null_order: OrderByNullType,
    limit: usize,
    offset: usize,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl TopN {
    pub fn new(child: Box<dyn PhysicalOperator>, orders: Vec<BoundOrderByNode>, null_order: OrderByNullType,
            limit: usize, offset: usize) -> Self {
        let types = child.types().to_vec();
        TopN { orders, null_order, limit, offset, types, children: vec![child] }
    }
}

impl PhysicalOperator for TopN {
    fn name(&self) -> &'static str {
        "TOP_N"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::TopN(TopNState { sorted: None, position: 0 })
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let needs_input = match &state.local {
            LocalState::TopN(top_n) => top_n.sorted.is_none(),
            _ => return Err(ExecutionError::Representation("top n without heap state".to_string())),
        };
        if needs_input {
            let (payload, keys) = consume_input(self, &self.orders, context, state)?;
            let order_types = self.orders.iter().map(|order| order.order_type).collect_vec();
            let heap = keys.heap(&order_types, self.null_order, self.limit.saturating_add(self.offset))?;
            let order = heap.into_iter().skip(self.offset).collect_vec();
            if let LocalState::TopN(state) = &mut state.local {
                state.sorted = Some(SortedInput { payload, order });
            }
        }
        if let LocalState::TopN(TopNState { sorted: Some(sorted), position }) = &mut state.local {
            sorted.payload.materialize_heap_chunk(chunk, &sorted.order, *position)?;
            *position += chunk.size();
        }
        Ok(())
    }

    fn estimate_cardinality(&self) -> usize {
        self.children[0].estimate_cardinality().saturating_sub(self.offset).min(self.limit)
    }

    fn extra_render_information(&self) -> String {
        format!("limit: {}, offset: {}", self.limit, self.offset)
    }
}
