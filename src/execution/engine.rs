use std::time::Instant;

use crate::{chunk::{ChunkCollection, DataChunk}, config::ExecutionConfig, error::{ExecutionError, Result}, types::LogicalType};

use super::{context::{ExecutionContext, InterruptHandle}, operators::{render_tree, ChunkScan, CrossProduct, Filter, HashJoin,
    Limit, Order, OperatorState, PhysicalOperator, Projection, SimpleAggregate, TableScan, TopN, Union},
    plan::{PhysicalQueryPlan, PlanNode, PlanOperator}};

pub trait ExecutionEngine {
    fn execute(&self, plan: PhysicalQueryPlan) -> Result<ChunkCollection>;
}

/*
    Turns physical plans into operator trees and drives them. Queries can either be run to
    completion (`execute`) or consumed chunk by chunk (`stream`).
 */
pub struct Engine {
    config: ExecutionConfig,
}

impl Engine {
    pub fn new(config: ExecutionConfig) -> Self {
        Engine { config }
    }

    pub fn build(&self, node: PlanNode) -> Result<Box<dyn PhysicalOperator>> {
        let PlanNode { operator, types, children } = node;
        if children.len() != operator.arity() {
            return Err(ExecutionError::InvalidPlan(format!(
                "{} needs {} children, got {}", operator.name(), operator.arity(), children.len()
            )));
        }
        let name = operator.name();
        if types.is_empty() {
            return Err(ExecutionError::InvalidPlan(format!("{} produces no columns", name)));
        }
        let mut children = children.into_iter().map(|child| self.build(child)).collect::<Result<Vec<_>>>()?.into_iter();
        let mut next_child = || children.next().ok_or_else(|| ExecutionError::InvalidPlan(format!("{} is missing a child", name)));
        let built: Box<dyn PhysicalOperator> = match operator {
            PlanOperator::TableScan { source, column_ids } => {
                Box::new(TableScan::new(source, column_ids, types.clone()))
            },
            PlanOperator::ChunkScan { collection } => Box::new(ChunkScan::with_types(collection, types.clone())),
            PlanOperator::Filter { predicate } => Box::new(Filter::new(next_child()?, predicate)),
            PlanOperator::Projection { expressions } => {
                if expressions.len() != types.len() {
                    return Err(ExecutionError::InvalidPlan(format!(
                        "projection of {} expressions with {} output types", expressions.len(), types.len()
                    )));
                }
                Box::new(Projection::new(next_child()?, expressions, types.clone()))
            },
            PlanOperator::Limit { limit, offset } => Box::new(Limit::new(next_child()?, limit, offset)),
            PlanOperator::Order { orders, .. } | PlanOperator::TopN { orders, .. } if orders.is_empty() => {
                return Err(ExecutionError::InvalidPlan(format!("{} without sort keys", name)));
            },
            PlanOperator::Order { orders, null_order } => Box::new(Order::new(next_child()?, orders, null_order)),
            PlanOperator::TopN { orders, null_order, limit, offset } => {
                Box::new(TopN::new(next_child()?, orders, null_order, limit, offset))
            },
            PlanOperator::HashJoin { conditions } => {
                let left = next_child()?;
                Box::new(HashJoin::new(left, next_child()?, conditions))
            },
            PlanOperator::CrossProduct => {
                let left = next_child()?;
                Box::new(CrossProduct::new(left, next_child()?))
            },
            PlanOperator::Union => {
                let top = next_child()?;
                let bottom = next_child()?;
                if top.types().len() != bottom.types().len() {
                    return Err(ExecutionError::InvalidPlan(format!(
                        "union of {} and {} columns", top.types().len(), bottom.types().len()
                    )));
                }
                Box::new(Union::new(top, bottom))
            },
            PlanOperator::SimpleAggregate { aggregates } => {
                if aggregates.len() != types.len() {
                    return Err(ExecutionError::InvalidPlan(format!(
                        "{} aggregates with {} output types", aggregates.len(), types.len()
                    )));
                }
                Box::new(SimpleAggregate::new(next_child()?, aggregates, types.clone()))
            },
        };
        if built.types().len() != types.len() {
            return Err(ExecutionError::InvalidPlan(format!(
                "{} produces {} columns, the plan declares {}", name, built.types().len(), types.len()
            )));
        }
        Ok(built)
    }

    // Every query gets its own interrupt flag, cancelling one never touches another
    pub fn stream(&self, plan: PhysicalQueryPlan) -> Result<QueryStream> {
        self.stream_with_interrupt(plan, InterruptHandle::new())
    }

    pub fn stream_with_interrupt(&self, plan: PhysicalQueryPlan, interrupt: InterruptHandle) -> Result<QueryStream> {
        tracing::debug!(cost = plan.cost, "starting query\n{}", plan.root);
        let root = self.build(plan.root)?;
        Ok(QueryStream::new(root, ExecutionContext::with_interrupt(self.config.clone(), interrupt)))
    }

    // Runs to completion unless `interrupt` is set, e.g. from another thread
    pub fn execute_with_interrupt(&self, plan: PhysicalQueryPlan, interrupt: InterruptHandle) -> Result<ChunkCollection> {
        let mut stream = self.stream_with_interrupt(plan, interrupt)?;
        let mut result = ChunkCollection::new();
        result.set_types(stream.types().to_vec());
        while let Some(chunk) = stream.next_batch()? {
            result.append(&chunk)?;
        }
        Ok(result)
    }
}

impl ExecutionEngine for Engine {
    fn execute(&self, plan: PhysicalQueryPlan) -> Result<ChunkCollection> {
        self.execute_with_interrupt(plan, InterruptHandle::new())
    }
}

// A running query handing out its result one chunk at a time
pub struct QueryStream {
    root: Box<dyn PhysicalOperator>,
    state: OperatorState,
    chunk: DataChunk,
    context: ExecutionContext,
    rows: usize,
    done: bool,
    start: Instant,
}

impl QueryStream {
    fn new(root: Box<dyn PhysicalOperator>, context: ExecutionContext) -> Self {
        let state = root.get_operator_state();
        let chunk = root.initialize_chunk();
        QueryStream { root, state, chunk, context, rows: 0, done: false, start: Instant::now() }
    }

    pub fn types(&self) -> &[LogicalType] {
        self.root.types()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.context.interrupt_handle()
    }

    // Operator tree annotated with what every operator produced so far
    pub fn profile(&self) -> String {
        render_tree(self.root.as_ref(), Some(&self.state))
    }

    /*
        The next chunk of the result, None once the query is done. The chunk is a copy that
        does not share any buffers with the operators and can be kept around.
     */
    pub fn next_batch(&mut self) -> Result<Option<DataChunk>> {
        if self.done {
            return Ok(None);
        }
        if let Err(err) = self.root.get_chunk(&self.context, &mut self.chunk, &mut self.state) {
            self.done = true;
            if err.is_interrupt() {
                tracing::warn!(rows = self.rows, "query interrupted");
            } else {
                tracing::debug!(error = %err, "query failed");
            }
            return Err(err);
        }
        if self.chunk.size() == 0 {
            self.done = true;
            tracing::debug!(rows = self.rows, elapsed = ?self.start.elapsed(), "query finished");
            if self.context.config.profile {
                tracing::debug!("query profile\n{}", self.profile());
            }
            return Ok(None);
        }
        self.rows += self.chunk.size();
        let mut result = self.root.initialize_chunk();
        self.chunk.copy(&mut result, 0)?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{access::InMemoryTable, chunk::{OrderByNullType, OrderType}, execution::{expression::{ArithmeticOp,
        ComparisonOp, Expression}, operators::{test_util::collection, AggregateExpression, AggregateKind, BoundOrderByNode,
        JoinCondition}}, types::Value};

    use super::*;

    fn engine() -> Engine {
        Engine::new(ExecutionConfig { verify: true, profile: true })
    }

    fn orders_table() -> PlanNode {
        let data = collection(vec![LogicalType::Integer, LogicalType::Integer, LogicalType::Double],
            (0..5000).map(|i| vec![Value::Integer(i), Value::Integer(i % 100), Value::Double(i as f64 * 1.5)]));
        PlanNode::leaf(PlanOperator::TableScan { source: Rc::new(InMemoryTable::new(data)), column_ids: vec![0, 1, 2] },
            vec![LogicalType::Integer, LogicalType::Integer, LogicalType::Double])
    }

    fn customers_table() -> PlanNode {
        let data = collection(vec![LogicalType::Integer, LogicalType::Varchar],
            (0..100).map(|i| vec![Value::Integer(i), Value::varchar(format!("customer with a long name #{}", i))]));
        PlanNode::leaf(PlanOperator::ChunkScan { collection: Rc::new(data) }, vec![LogicalType::Integer, LogicalType::Varchar])
    }

    #[test]
    fn test_join_filter_aggregate_plan() {
        // SELECT count(*), sum(o.id) FROM customers c JOIN orders o ON c.id = o.customer WHERE c.id < 10
        let predicate = Expression::comparison(ComparisonOp::LessThan, Expression::column(0, LogicalType::Integer),
            Expression::constant(Value::Integer(10)));
        let customers = PlanNode::unary(PlanOperator::Filter { predicate }, customers_table());
        let join = PlanNode::binary(
            PlanOperator::HashJoin { conditions: vec![JoinCondition::new(Expression::column(0, LogicalType::Integer),
                Expression::column(1, LogicalType::Integer))] },
            vec![LogicalType::Integer, LogicalType::Varchar, LogicalType::Integer, LogicalType::Integer, LogicalType::Double],
            customers, orders_table());
        let aggregate = PlanNode::new(PlanOperator::SimpleAggregate { aggregates: vec![
            AggregateExpression::count_star(),
            AggregateExpression::new(AggregateKind::Sum, Some(Expression::column(2, LogicalType::Integer))),
        ] }, vec![LogicalType::BigInt, LogicalType::BigInt], vec![join]);
        let result = engine().execute(PhysicalQueryPlan::new(aggregate, 1.0)).unwrap();
        let expected_sum: i64 = (0..5000).filter(|i| i % 100 < 10).sum();
        assert_eq!(result.get_row(0).unwrap(), vec![Value::BigInt(500), Value::BigInt(expected_sum)]);
    }

    #[test]
    fn test_streaming_top_n() {
        // SELECT id * 2 FROM orders ORDER BY price DESC LIMIT 3 OFFSET 1
        let orders = vec![BoundOrderByNode::new(OrderType::Descending, Expression::column(2, LogicalType::Double))];
        let top_n = PlanNode::unary(PlanOperator::TopN { orders, null_order: OrderByNullType::NullsLast, limit: 3, offset: 1 },
            orders_table());
        let projection = PlanNode::new(PlanOperator::Projection { expressions: vec![Expression::arithmetic(
            ArithmeticOp::Multiply, Expression::column(0, LogicalType::Integer), Expression::constant(Value::Integer(2)),
            LogicalType::Integer)] }, vec![LogicalType::Integer], vec![top_n]);
        let mut stream = engine().stream(PhysicalQueryPlan::new(projection, 1.0)).unwrap();
        let chunk = stream.next_batch().unwrap().unwrap();
        assert_eq!((0..chunk.size()).map(|i| chunk.get_value(0, i).unwrap()).collect::<Vec<_>>(),
            vec![Value::Integer(9996), Value::Integer(9994), Value::Integer(9992)]);
        assert!(stream.next_batch().unwrap().is_none());
        assert!(stream.next_batch().unwrap().is_none());
        assert!(stream.profile().starts_with("PROJECTION"));
    }

    #[test]
    fn test_interrupted_stream() {
        let engine = engine();
        let plan = PhysicalQueryPlan::new(PlanNode::unary(PlanOperator::Limit { limit: 4000, offset: 0 }, orders_table()), 1.0);
        let mut stream = engine.stream(plan).unwrap();
        assert_eq!(stream.next_batch().unwrap().unwrap().size(), 1024);
        stream.interrupt_handle().interrupt();
        assert_eq!(stream.next_batch().unwrap_err(), ExecutionError::Interrupted);
        assert!(stream.next_batch().unwrap().is_none());

        // the next query has a flag of its own
        let plan = PhysicalQueryPlan::new(PlanNode::unary(PlanOperator::Limit { limit: 10, offset: 0 }, orders_table()), 1.0);
        assert_eq!(engine.execute(plan).unwrap().count(), 10);
    }

    #[test]
    fn test_streams_are_interrupted_independently() {
        let engine = engine();
        let plan = || PhysicalQueryPlan::new(PlanNode::unary(PlanOperator::Limit { limit: 4000, offset: 0 }, orders_table()), 1.0);
        let mut first = engine.stream(plan()).unwrap();
        first.interrupt_handle().interrupt();
        // starting another query must not swallow the pending cancellation
        let mut second = engine.stream(plan()).unwrap();
        assert_eq!(first.next_batch().unwrap_err(), ExecutionError::Interrupted);
        assert_eq!(second.next_batch().unwrap().unwrap().size(), 1024);

        let mut third = engine.stream(plan()).unwrap();
        second.interrupt_handle().interrupt();
        assert!(second.next_batch().unwrap_err().is_interrupt());
        assert_eq!(third.next_batch().unwrap().unwrap().size(), 1024);
    }

    #[test]
    fn test_execute_with_interrupt_from_other_thread() {
        let interrupt = InterruptHandle::new();
        let remote = interrupt.clone();
        std::thread::spawn(move || remote.interrupt()).join().unwrap();
        let plan = PhysicalQueryPlan::new(orders_table(), 1.0);
        assert_eq!(engine().execute_with_interrupt(plan, interrupt).unwrap_err(), ExecutionError::Interrupted);
    }

    #[test]
    fn test_invalid_plans() {
        let engine = engine();
        let missing_child = PlanNode::new(PlanOperator::Union, vec![LogicalType::Integer], vec![customers_table()]);
        assert!(matches!(engine.build(missing_child), Err(ExecutionError::InvalidPlan(_))));
        let wrong_types = PlanNode::new(PlanOperator::Limit { limit: 1, offset: 0 }, vec![LogicalType::Integer], vec![customers_table()]);
        assert!(matches!(engine.build(wrong_types), Err(ExecutionError::InvalidPlan(_))));
        let projection = PlanNode::new(PlanOperator::Projection { expressions: vec![] }, vec![LogicalType::Integer], vec![customers_table()]);
        assert!(matches!(engine.build(projection), Err(ExecutionError::InvalidPlan(_))));
        let no_columns = PlanNode::new(PlanOperator::Projection { expressions: vec![] }, vec![], vec![customers_table()]);
        assert!(matches!(engine.build(no_columns), Err(ExecutionError::InvalidPlan(_))));
        let no_aggregates = PlanNode::new(PlanOperator::SimpleAggregate { aggregates: vec![] }, vec![], vec![customers_table()]);
        assert!(matches!(engine.build(no_aggregates), Err(ExecutionError::InvalidPlan(_))));
        let no_keys = PlanNode::unary(PlanOperator::Order { orders: vec![], null_order: OrderByNullType::NullsLast }, customers_table());
        assert!(matches!(engine.build(no_keys), Err(ExecutionError::InvalidPlan(_))));
        let no_keys = PlanNode::unary(PlanOperator::TopN { orders: vec![], null_order: OrderByNullType::NullsFirst, limit: 1, offset: 0 },
            customers_table());
        assert!(matches!(engine.build(no_keys), Err(ExecutionError::InvalidPlan(_))));
    }

    #[test]
    fn test_results_outlive_the_query() {
        let plan = PhysicalQueryPlan::new(PlanNode::unary(PlanOperator::Order { orders: vec![BoundOrderByNode::new(
            OrderType::Descending, Expression::column(0, LogicalType::Integer))], null_order: OrderByNullType::NullsLast },
            customers_table()), 1.0);
        let result = engine().execute(plan).unwrap();
        assert_eq!(result.count(), 100);
        assert_eq!(result.get_row(0).unwrap(), vec![Value::Integer(99), Value::varchar("customer with a long name #99")]);
    }
}
