use itertools::Itertools;

use crate::{chunk::{ChunkCollection, DataChunk, OrderByNullType, OrderType}, error::{ExecutionError, Result},
    execution::{context::ExecutionContext, expression::{Expression, ExpressionExecutor}}, types::LogicalType};

use super::{LocalState, OperatorState, PhysicalOperator};

#[derive(Debug, Clone, PartialEq)]
pub struct BoundOrderByNode {
    pub order_type: OrderType,
    pub expression: Expression,
}

impl BoundOrderByNode {
    pub fn new(order_type: OrderType, expression: Expression) -> Self {
        BoundOrderByNode { order_type, expression }
    }
}

pub struct OrderState {
    sorted: Option<SortedInput>,
    position: usize,
}

// Input rows plus the row order to emit them in
pub(crate) struct SortedInput {
    pub(crate) payload: ChunkCollection,
    pub(crate) order: Vec<usize>,
}

// Reads the whole child, evaluating the sort keys of every chunk next to the payload
pub(crate) fn consume_input(operator: &dyn PhysicalOperator, orders: &[BoundOrderByNode], context: &ExecutionContext,
        state: &mut OperatorState) -> Result<(ChunkCollection, ChunkCollection)> {
    let child = &operator.children()[0];
    let key_types = orders.iter().map(|order| order.expression.return_type()).collect_vec();
    let mut payload = ChunkCollection::new();
    payload.set_types(child.types().to_vec());
    let mut keys = ChunkCollection::new();
    keys.set_types(key_types.clone());
    let mut key_chunk = DataChunk::with_types(&key_types);
    loop {
        child.get_chunk(context, &mut state.child_chunk, &mut state.child_states[0])?;
        let input = &state.child_chunk;
        if input.size() == 0 {
            break;
        }
        key_chunk.reset();
        for (order, column) in orders.iter().zip(key_chunk.columns.iter_mut()) {
            ExpressionExecutor::execute(&order.expression, input, column)?;
        }
        key_chunk.set_cardinality(input.size());
        keys.append(&key_chunk)?;
        payload.append(input)?;
    }
    Ok((payload, keys))
}

/*
    Materializing sort. The first pull drains the child, after that the sorted rows are copied
    out one standard vector at a time.
 */
pub struct Order {
    orders: Vec<BoundOrderByNode>,
    null_order: OrderByNullType,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl Order {
    pub fn new(child: Box<dyn PhysicalOperator>, orders: Vec<BoundOrderByNode>, null_order: OrderByNullType) -> Self {
        let types = child.types().to_vec();
        Order { orders, null_order, types, children: vec![child] }
    }
}

impl PhysicalOperator for Order {
    fn name(&self) -> &'static str {
        "ORDER_BY"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::Order(OrderState { sorted: None, position: 0 })
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let needs_input = match &state.local {
            LocalState::Order(order) => order.sorted.is_none(),
            _ => return Err(ExecutionError::Representation("order without sort state".to_string())),
        };
        if needs_input {
            let (payload, keys) = consume_input(self, &self.orders, context, state)?;
            let order_types = self.orders.iter().map(|order| order.order_type).collect_vec();
            let order = keys.sort(&order_types, self.null_order)?;
            tracing::trace!(rows = payload.count(), "sorted input");
            if let LocalState::Order(state) = &mut state.local {
                state.sorted = Some(SortedInput { payload, order });
            }
        }
        if let LocalState::Order(OrderState { sorted: Some(sorted), position }) = &mut state.local {
            sorted.payload.materialize_sorted_chunk(chunk, &sorted.order, *position)?;
            *position += chunk.size();
        }
        Ok(())
    }

    fn extra_render_information(&self) -> String {
        self.orders.iter().map(|order| format!("{} {:?}", order.expression, order.order_type)).join(", ")
    }
}
