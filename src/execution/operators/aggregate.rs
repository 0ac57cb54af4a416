use std::{cmp::Ordering, fmt::Display};

use itertools::Itertools;

use crate::{chunk::DataChunk, error::{ExecutionError, Result}, execution::{context::ExecutionContext,
    expression::{Expression, ExpressionExecutor}}, types::{LogicalType, Value}};

use super::{LocalState, OperatorState, PhysicalOperator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpression {
    pub kind: AggregateKind,
    // None only for COUNT(*)
    pub child: Option<Expression>,
}

impl AggregateExpression {
    pub fn new(kind: AggregateKind, child: Option<Expression>) -> Self {
        AggregateExpression { kind, child }
    }

    pub fn count_star() -> Self {
        AggregateExpression { kind: AggregateKind::CountStar, child: None }
    }
}

impl Display for AggregateExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.child) {
            (AggregateKind::CountStar, _) | (_, None) => write!(f, "count_star()"),
            (kind, Some(child)) => write!(f, "{}({})", format!("{:?}", kind).to_lowercase(), child),
        }
    }
}

enum Accumulator {
    Count(i64),
    IntegralSum(Option<i64>),
    FloatSum(Option<f64>),
    Extreme { value: Option<Value>, keep: Ordering },
}

impl Accumulator {
    fn new(aggregate: &AggregateExpression) -> Self {
        let floating = aggregate.child.as_ref()
            .map_or(false, |child| matches!(child.return_type(), LogicalType::Float | LogicalType::Double));
        match aggregate.kind {
            AggregateKind::CountStar | AggregateKind::Count => Accumulator::Count(0),
            AggregateKind::Sum if floating => Accumulator::FloatSum(None),
            AggregateKind::Sum => Accumulator::IntegralSum(None),
            AggregateKind::Min => Accumulator::Extreme { value: None, keep: Ordering::Less },
            AggregateKind::Max => Accumulator::Extreme { value: None, keep: Ordering::Greater },
        }
    }

    fn update(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count(count) => *count += 1,
            Accumulator::IntegralSum(sum) => {
                let addend = value.as_i64()
                    .ok_or_else(|| ExecutionError::type_mismatch("sum", &LogicalType::BigInt, &value.logical_type()))?;
                *sum = Some(sum.unwrap_or(0).checked_add(addend)
                    .ok_or_else(|| ExecutionError::overflow("sum", &LogicalType::BigInt))?);
            },
            Accumulator::FloatSum(sum) => {
                let addend = value.as_f64()
                    .ok_or_else(|| ExecutionError::type_mismatch("sum", &LogicalType::Double, &value.logical_type()))?;
                *sum = Some(sum.unwrap_or(0.0) + addend);
            },
            Accumulator::Extreme { value: current, keep } => {
                let replace = match current {
                    Some(current) => value.compare(current) == Some(*keep),
                    None => true,
                };
                if replace {
                    *current = Some(value);
                }
            },
        }
        Ok(())
    }

    fn finalize(&self, logical_type: &LogicalType) -> Result<Value> {
        let value = match self {
            Accumulator::Count(count) => Value::BigInt(*count),
            Accumulator::IntegralSum(Some(sum)) => Value::BigInt(*sum),
            Accumulator::FloatSum(Some(sum)) => Value::Double(*sum),
            Accumulator::Extreme { value: Some(value), .. } => value.clone(),
            _ => Value::Null(logical_type.clone()),
        };
        value.cast_as(logical_type)
    }
}

/*
    Aggregates without GROUP BY. Consumes its whole input on the first pull and produces exactly
    one row, even for an empty input (COUNT is 0 there, everything else NULL).
 */
pub struct SimpleAggregate {
    aggregates: Vec<AggregateExpression>,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl SimpleAggregate {
    pub fn new(child: Box<dyn PhysicalOperator>, aggregates: Vec<AggregateExpression>, types: Vec<LogicalType>) -> Self {
        debug_assert_eq!(aggregates.len(), types.len());
        SimpleAggregate { aggregates, types, children: vec![child] }
    }
}

impl PhysicalOperator for SimpleAggregate {
    fn name(&self) -> &'static str {
        "SIMPLE_AGGREGATE"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::Aggregate { done: false }
    }

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let done = match &mut state.local {
            LocalState::Aggregate { done } => done,
            _ => return Err(ExecutionError::Representation("aggregate without aggregate state".to_string())),
        };
        if *done {
            return Ok(());
        }
        let mut accumulators = self.aggregates.iter().map(Accumulator::new).collect_vec();
        loop {
            self.children[0].get_chunk(context, &mut state.child_chunk, &mut state.child_states[0])?;
            let input = &state.child_chunk;
            if input.size() == 0 {
                break;
            }
            for (aggregate, accumulator) in self.aggregates.iter().zip(accumulators.iter_mut()) {
                match (&aggregate.child, accumulator) {
                    (None, Accumulator::Count(count)) => *count += input.size() as i64,
                    (Some(child), accumulator) => {
                        let values = ExpressionExecutor::evaluate(child, input)?;
                        for row in 0..input.size() {
                            accumulator.update(values.get_value(row)?)?;
                        }
                    },
                    (None, _) => {
                        return Err(ExecutionError::InvalidPlan(format!("{:?} needs an argument", aggregate.kind)));
                    },
                }
            }
        }
        for (column, (accumulator, logical_type)) in accumulators.iter().zip(self.types.iter()).enumerate() {
            chunk.set_value(column, 0, &accumulator.finalize(logical_type)?)?;
        }
        chunk.set_cardinality(1);
        *done = true;
        Ok(())
    }

    fn estimate_cardinality(&self) -> usize {
        1
    }

    fn extra_render_information(&self) -> String {
        self.aggregates.iter().join(", ")
    }
}

#[cfg(test)]
mod test {
    use crate::execution::operators::{collect_all, test_util::*};

    use super::*;

    fn aggregates() -> (Vec<AggregateExpression>, Vec<LogicalType>) {
        let column = |index, logical_type| Some(Expression::column(index, logical_type));
        (vec![
            AggregateExpression::count_star(),
            AggregateExpression::new(AggregateKind::Count, column(0, LogicalType::Integer)),
            AggregateExpression::new(AggregateKind::Sum, column(0, LogicalType::Integer)),
            AggregateExpression::new(AggregateKind::Min, column(1, LogicalType::Varchar)),
            AggregateExpression::new(AggregateKind::Max, column(2, LogicalType::Double)),
            AggregateExpression::new(AggregateKind::Sum, column(2, LogicalType::Double)),
        ], vec![LogicalType::BigInt, LogicalType::BigInt, LogicalType::BigInt, LogicalType::Varchar, LogicalType::Double, LogicalType::Double])
    }

    fn input(rows: i32) -> Box<dyn PhysicalOperator> {
        source(vec![LogicalType::Integer, LogicalType::Varchar, LogicalType::Double], (0..rows).map(|i| vec![
            if i % 10 == 0 { Value::Null(LogicalType::Integer) } else { Value::Integer(i) },
            Value::varchar(format!("name {:04}", 2000 - i)),
            Value::Double(i as f64 / 4.0),
        ]))
    }

    #[test]
    fn test_simple_aggregate() {
        let (aggregates, types) = aggregates();
        let aggregate = SimpleAggregate::new(input(2000), aggregates, types);
        let result = collect_all(&aggregate, &context()).unwrap();
        assert_eq!(result.count(), 1);
        let expected_sum: i64 = (0..2000).filter(|i| i % 10 != 0).sum();
        assert_eq!(result.get_row(0).unwrap(), vec![
            Value::BigInt(2000),
            Value::BigInt(1800),
            Value::BigInt(expected_sum),
            Value::varchar("name 0001"),
            Value::Double(1999.0 / 4.0),
            Value::Double((0..2000).map(|i| i as f64 / 4.0).sum()),
        ]);
    }

    #[test]
    fn test_aggregate_of_empty_input() {
        let (aggregates, types) = aggregates();
        let result = collect_all(&SimpleAggregate::new(input(0), aggregates, types), &context()).unwrap();
        let row = result.get_row(0).unwrap();
        assert_eq!(row[0], Value::BigInt(0));
        assert_eq!(row[1], Value::BigInt(0));
        assert!(row[2..].iter().all(Value::is_null));
    }

    #[test]
    fn test_sum_overflow() {
        let child = source(vec![LogicalType::BigInt], vec![vec![Value::BigInt(i64::MAX)], vec![Value::BigInt(1)]]);
        let aggregate = SimpleAggregate::new(child,
            vec![AggregateExpression::new(AggregateKind::Sum, Some(Expression::column(0, LogicalType::BigInt)))],
            vec![LogicalType::BigInt]);
        assert!(matches!(collect_all(&aggregate, &context()), Err(ExecutionError::Overflow { .. })));
    }
}
