/*
    The contract between the planner and the engine. A physical plan is a tree of operator
    descriptors, every node carrying its already resolved output types and the parameters of its
    operator. The engine does not re-derive any types, it only checks the shape of the tree and
    then trusts the planner.
 */

use std::rc::Rc;

use itertools::Itertools;

use crate::{access::DataSource, chunk::{ChunkCollection, OrderByNullType}, types::LogicalType};

use super::{expression::Expression, operators::{AggregateExpression, BoundOrderByNode, JoinCondition}};

pub enum PlanOperator {
    TableScan {
        source: Rc<dyn DataSource>,
        column_ids: Vec<usize>,
    },
    ChunkScan {
        collection: Rc<ChunkCollection>,
    },
    Filter {
        predicate: Expression,
    },
    Projection {
        expressions: Vec<Expression>,
    },
    Limit {
        limit: usize,
        offset: usize,
    },
    Order {
        orders: Vec<BoundOrderByNode>,
        null_order: OrderByNullType,
    },
    TopN {
        orders: Vec<BoundOrderByNode>,
        null_order: OrderByNullType,
        limit: usize,
        offset: usize,
    },
    // Inner equi-join, left child builds, right child probes
    HashJoin {
        conditions: Vec<JoinCondition>,
    },
    CrossProduct,
    Union,
    SimpleAggregate {
        aggregates: Vec<AggregateExpression>,
    },
}

impl PlanOperator {
    pub fn name(&self) -> &'static str {
        match self {
            PlanOperator::TableScan { .. } => "TABLE_SCAN",
            PlanOperator::ChunkScan { .. } => "CHUNK_SCAN",
            PlanOperator::Filter { .. } => "FILTER",
            PlanOperator::Projection { .. } => "PROJECTION",
            PlanOperator::Limit { .. } => "LIMIT",
            PlanOperator::Order { .. } => "ORDER_BY",
            PlanOperator::TopN { .. } => "TOP_N",
            PlanOperator::HashJoin { .. } => "HASH_JOIN",
            PlanOperator::CrossProduct => "CROSS_PRODUCT",
            PlanOperator::Union => "UNION",
            PlanOperator::SimpleAggregate { .. } => "SIMPLE_AGGREGATE",
        }
    }

    // Number of children the operator needs
    pub fn arity(&self) -> usize {
        match self {
            PlanOperator::TableScan { .. } | PlanOperator::ChunkScan { .. } => 0,
            PlanOperator::HashJoin { .. } | PlanOperator::CrossProduct | PlanOperator::Union => 2,
            _ => 1,
        }
    }
}

pub struct PlanNode {
    pub operator: PlanOperator,
    pub types: Vec<LogicalType>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(operator: PlanOperator, types: Vec<LogicalType>, children: Vec<PlanNode>) -> Self {
        PlanNode { operator, types, children }
    }

    pub fn leaf(operator: PlanOperator, types: Vec<LogicalType>) -> Self {
        PlanNode::new(operator, types, Vec::new())
    }

    // Operators that keep the types of their (first) child
    pub fn unary(operator: PlanOperator, child: PlanNode) -> Self {
        let types = child.types.clone();
        PlanNode::new(operator, types, vec![child])
    }

    pub fn binary(operator: PlanOperator, types: Vec<LogicalType>, left: PlanNode, right: PlanNode) -> Self {
        PlanNode::new(operator, types, vec![left, right])
    }

    fn describe(&self, depth: usize, out: &mut Vec<String>) {
        out.push(format!("{}{} [{}]", "  ".repeat(depth), self.operator.name(), self.types.iter().join(", ")));
        for child in &self.children {
            child.describe(depth + 1, out);
        }
    }
}

impl std::fmt::Display for PlanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut lines = Vec::new();
        self.describe(0, &mut lines);
        write!(f, "{}", lines.join("\n"))
    }
}

pub struct PhysicalQueryPlan {
    pub root: PlanNode,
    pub cost: f64,
}

impl PhysicalQueryPlan {
    pub fn new(root: PlanNode, cost: f64) -> Self {
        Self { root, cost }
    }
}

#[cfg(test)]
mod test {
    use crate::{execution::expression::ComparisonOp, types::Value};

    use super::*;

    #[test]
    fn test_describe_plan() {
        let mut data = ChunkCollection::new();
        data.set_types(vec![LogicalType::Integer, LogicalType::Varchar]);
        let scan = PlanNode::leaf(PlanOperator::ChunkScan { collection: Rc::new(data) }, vec![LogicalType::Integer, LogicalType::Varchar]);
        let predicate = Expression::comparison(ComparisonOp::Equal, Expression::column(0, LogicalType::Integer),
            Expression::constant(Value::Integer(3)));
        let filter = PlanNode::unary(PlanOperator::Filter { predicate }, scan);
        assert_eq!(filter.operator.arity(), 1);
        assert_eq!(filter.to_string(), "FILTER [INTEGER, VARCHAR]\n  CHUNK_SCAN [INTEGER, VARCHAR]");
    }
}
