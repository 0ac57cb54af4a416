use std::rc::Rc;

use oxid_exec::{access::InMemoryTable, chunk::ChunkCollection, config::ExecutionConfig,
    execution::{engine::{Engine, ExecutionEngine}, expression::{ComparisonOp, Expression},
        plan::{PhysicalQueryPlan, PlanNode, PlanOperator}}, types::{LogicalType, Value}};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    println!("OxidExec - Vectorized Execution Engine");

    let types = vec![LogicalType::Integer, LogicalType::Varchar];
    let mut data = ChunkCollection::new();
    data.set_types(types.clone());
    for i in 0..3 * 1024 {
        if let Err(err) = data.append_row(&[Value::Integer(i), Value::varchar(format!("row {}", i))]) {
            eprintln!("could not build the demo table: {}", err);
            return;
        }
    }
    let scan = PlanNode::leaf(PlanOperator::TableScan { source: Rc::new(InMemoryTable::new(data)), column_ids: vec![0, 1] }, types);
    let predicate = Expression::comparison(ComparisonOp::GreaterThan, Expression::column(0, LogicalType::Integer),
        Expression::constant(Value::Integer(3000)));
    let plan = PhysicalQueryPlan::new(PlanNode::unary(PlanOperator::Filter { predicate }, scan), 1.0);

    let engine = Engine::new(ExecutionConfig::new());
    match engine.execute(plan) {
        Ok(result) => print!("{}", result),
        Err(err) => eprintln!("query failed: {}", err),
    }
}
