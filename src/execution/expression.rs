use std::{cmp::Ordering, fmt::Display};

use crate::{chunk::DataChunk, error::{ExecutionError, Result}, types::{LogicalType, Value},
    vector::{buffer::ColumnData, selection::SelectionVector, string_heap::StringT, Vector, VectorType, VectorView}};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOp {
    #[inline]
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::NotEqual => ordering != Ordering::Equal,
            ComparisonOp::LessThan => ordering == Ordering::Less,
            ComparisonOp::LessThanOrEqual => ordering != Ordering::Greater,
            ComparisonOp::GreaterThan => ordering == Ordering::Greater,
            ComparisonOp::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessThanOrEqual => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterThanOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjunctionOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl ArithmeticOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Modulo => "%",
        }
    }
}

/*
    Bound, typed scalar expressions as the planner hands them to us. Column references address
    columns of the operator's input chunk by position.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    ColumnRef { index: usize, return_type: LogicalType },
    Constant(Value),
    Comparison { op: ComparisonOp, left: Box<Expression>, right: Box<Expression> },
    Conjunction { op: ConjunctionOp, children: Vec<Expression> },
    Not(Box<Expression>),
    IsNull { child: Box<Expression>, negated: bool },
    Arithmetic { op: ArithmeticOp, left: Box<Expression>, right: Box<Expression>, return_type: LogicalType },
    Cast { child: Box<Expression>, target: LogicalType },
}

impl Expression {
    pub fn column(index: usize, return_type: LogicalType) -> Self {
        Expression::ColumnRef { index, return_type }
    }

    pub fn constant(value: Value) -> Self {
        Expression::Constant(value)
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expression, right: Expression, return_type: LogicalType) -> Self {
        Expression::Arithmetic { op, left: Box::new(left), right: Box::new(right), return_type }
    }

    pub fn and(children: Vec<Expression>) -> Self {
        Expression::Conjunction { op: ConjunctionOp::And, children }
    }

    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Conjunction { op: ConjunctionOp::Or, children }
    }

    pub fn return_type(&self) -> LogicalType {
        match self {
            Expression::ColumnRef { return_type, .. } | Expression::Arithmetic { return_type, .. } => return_type.clone(),
            Expression::Constant(value) => value.logical_type(),
            Expression::Comparison { .. } | Expression::Conjunction { .. } | Expression::Not(_) | Expression::IsNull { .. } => {
                LogicalType::Boolean
            },
            Expression::Cast { target, .. } => target.clone(),
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::ColumnRef { index, .. } => write!(f, "#{}", index),
            Expression::Constant(value) => write!(f, "{}", value),
            Expression::Comparison { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expression::Conjunction { op, children } => {
                let separator = match op {
                    ConjunctionOp::And => " AND ",
                    ConjunctionOp::Or => " OR ",
                };
                write!(f, "({})", children.iter().map(|child| child.to_string()).collect::<Vec<_>>().join(separator))
            },
            Expression::Not(child) => write!(f, "NOT {}", child),
            Expression::IsNull { child, negated: false } => write!(f, "{} IS NULL", child),
            Expression::IsNull { child, negated: true } => write!(f, "{} IS NOT NULL", child),
            Expression::Arithmetic { op, left, right, .. } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expression::Cast { child, target } => write!(f, "CAST({} AS {})", child, target),
        }
    }
}

/*
    Evaluates expressions a whole chunk at a time. Results of expressions over constants only
    are constant vectors again, everything else produces a fresh flat vector (or a reference to
    an input column).
 */
pub struct ExpressionExecutor;

impl ExpressionExecutor {
    pub fn execute(expression: &Expression, input: &DataChunk, result: &mut Vector) -> Result<()> {
        *result = Self::evaluate(expression, input)?;
        Ok(())
    }

    // Writes the rows for which the predicate is true into `selection`, returns their number
    pub fn select(expression: &Expression, input: &DataChunk, selection: &mut SelectionVector) -> Result<usize> {
        let result = Self::evaluate(expression, input)?;
        if result.logical_type() != &LogicalType::Boolean {
            return Err(ExecutionError::type_mismatch("filter", &LogicalType::Boolean, result.logical_type()));
        }
        let view = result.orrify(input.size())?;
        let data = view.data.borrow();
        let values = booleans(data.data()?)?;
        let mut selected = 0;
        for i in 0..input.size() {
            let idx = view.index(i);
            if !view.nullmask.get(idx) && values[idx] {
                selection.set_index(selected, i);
                selected += 1;
            }
        }
        Ok(selected)
    }

    pub fn evaluate(expression: &Expression, input: &DataChunk) -> Result<Vector> {
        let count = input.size();
        match expression {
            Expression::ColumnRef { index, return_type } => {
                let column = input.columns.get(*index).ok_or_else(|| {
                    ExecutionError::InvalidPlan(format!("column #{} does not exist in an input of {} columns", index, input.column_count()))
                })?;
                if column.logical_type() != return_type {
                    return Err(ExecutionError::type_mismatch("column reference", return_type, column.logical_type()));
                }
                Ok(Vector::new_reference(column))
            },
            Expression::Constant(value) => Vector::from_value(value),
            Expression::Comparison { op, left, right } => {
                let left = Self::evaluate(left, input)?;
                let right = Self::evaluate(right, input)?;
                compare(*op, &left, &right, count)
            },
            Expression::Conjunction { op, children } => {
                let mut children = children.iter();
                let mut result = match children.next() {
                    Some(first) => Self::evaluate(first, input)?,
                    None => return Err(ExecutionError::InvalidPlan("conjunction without children".to_string())),
                };
                for child in children {
                    let child = Self::evaluate(child, input)?;
                    result = conjunction(*op, &result, &child, count)?;
                }
                Ok(result)
            },
            Expression::Not(child) => {
                let child = Self::evaluate(child, input)?;
                map_booleans(&child, count, |value| value.map(|value| !value))
            },
            Expression::IsNull { child, negated } => {
                let child = Self::evaluate(child, input)?;
                let count = result_count(&[&child], count);
                let view = child.orrify(count)?;
                let mut result = Vector::new(LogicalType::Boolean);
                for i in 0..count {
                    result.set_value(i, &Value::Boolean(view.is_null(i) != *negated))?;
                }
                finish(result, &[&child])
            },
            Expression::Arithmetic { op, left, right, return_type } => {
                let left = Self::evaluate(left, input)?;
                let right = Self::evaluate(right, input)?;
                arithmetic(*op, &left, &right, return_type, count)
            },
            Expression::Cast { child, target } => {
                let child = Self::evaluate(child, input)?;
                if child.logical_type() == target {
                    return Ok(child);
                }
                let count = result_count(&[&child], count);
                let mut result = Vector::new(target.clone());
                for i in 0..count {
                    result.set_value(i, &child.get_value(i)?.cast_as(target)?)?;
                }
                finish(result, &[&child])
            },
        }
    }
}

fn is_constant(vector: &Vector) -> bool {
    vector.vector_type() == VectorType::Constant
}

// Only the first row needs computing when every input is constant
fn result_count(inputs: &[&Vector], count: usize) -> usize {
    if inputs.iter().all(|input| is_constant(input)) { count.min(1) } else { count }
}

fn finish(result: Vector, inputs: &[&Vector]) -> Result<Vector> {
    if inputs.iter().all(|input| is_constant(input)) {
        Vector::from_value(&result.get_value(0)?)
    } else {
        Ok(result)
    }
}

fn booleans(data: &ColumnData) -> Result<&[bool]> {
    match data {
        ColumnData::Boolean(values) => Ok(values),
        other => Err(ExecutionError::Representation(format!("expected a boolean buffer, found {}", other.type_name()))),
    }
}

fn booleans_mut(data: &mut ColumnData) -> Result<&mut [bool]> {
    match data {
        ColumnData::Boolean(values) => Ok(values),
        other => Err(ExecutionError::Representation(format!("expected a boolean buffer, found {}", other.type_name()))),
    }
}

fn null_union(result: &mut Vector, left: &VectorView, right: &VectorView, count: usize) {
    if !left.nullmask.any() && !right.nullmask.any() {
        return;
    }
    for i in 0..count {
        if left.is_null(i) || right.is_null(i) {
            result.set_null(i, true);
        }
    }
}

fn compare(op: ComparisonOp, left: &Vector, right: &Vector, count: usize) -> Result<Vector> {
    if !left.logical_type().is_comparable_to(right.logical_type()) {
        return Err(ExecutionError::type_mismatch("comparison", left.logical_type(), right.logical_type()));
    }
    let count = result_count(&[left, right], count);
    let left_view = left.orrify(count)?;
    let right_view = right.orrify(count)?;
    let mut result = Vector::new(LogicalType::Boolean);
    {
        let left_data = left_view.data.borrow();
        let right_data = right_view.data.borrow();
        let result_buffer = result.buffer()?.clone();
        let mut result_data = result_buffer.borrow_mut();
        let out = booleans_mut(result_data.data_mut()?)?;

        macro_rules! compare_loop {
            ($l:expr, $r:expr, $cmp:expr) => {
                for i in 0..count {
                    out[i] = op.holds($cmp(&$l[left_view.index(i)], &$r[right_view.index(i)]));
                }
            };
        }
        match (left_data.data()?, right_data.data()?) {
            (ColumnData::Boolean(l), ColumnData::Boolean(r)) => compare_loop!(l, r, Ord::cmp),
            (ColumnData::TinyInt(l), ColumnData::TinyInt(r)) => compare_loop!(l, r, Ord::cmp),
            (ColumnData::SmallInt(l), ColumnData::SmallInt(r)) => compare_loop!(l, r, Ord::cmp),
            (ColumnData::Integer(l), ColumnData::Integer(r)) => compare_loop!(l, r, Ord::cmp),
            (ColumnData::BigInt(l), ColumnData::BigInt(r)) => compare_loop!(l, r, Ord::cmp),
            (ColumnData::Hash(l), ColumnData::Hash(r)) => compare_loop!(l, r, Ord::cmp),
            (ColumnData::Pointer(l), ColumnData::Pointer(r)) => compare_loop!(l, r, Ord::cmp),
            (ColumnData::Float(l), ColumnData::Float(r)) => compare_loop!(l, r, f32::total_cmp),
            (ColumnData::Double(l), ColumnData::Double(r)) => compare_loop!(l, r, f64::total_cmp),
            (ColumnData::Varchar(l), ColumnData::Varchar(r)) => {
                compare_loop!(l, r, |a: &StringT, b: &StringT| a.as_bytes().cmp(b.as_bytes()))
            },
            _ => {
                // Mixed widths and nested types go through values
                for i in 0..count {
                    if left_view.is_null(i) || right_view.is_null(i) {
                        continue;
                    }
                    let ordering = left.get_value(i)?.compare(&right.get_value(i)?).ok_or_else(|| {
                        ExecutionError::type_mismatch("comparison", left.logical_type(), right.logical_type())
                    })?;
                    out[i] = op.holds(ordering);
                }
            },
        }
    }
    null_union(&mut result, &left_view, &right_view, count);
    finish(result, &[left, right])
}

// Three valued AND / OR
fn conjunction(op: ConjunctionOp, left: &Vector, right: &Vector, count: usize) -> Result<Vector> {
    for input in [left, right] {
        if input.logical_type() != &LogicalType::Boolean {
            return Err(ExecutionError::type_mismatch("conjunction", &LogicalType::Boolean, input.logical_type()));
        }
    }
    let count = result_count(&[left, right], count);
    let left_view = left.orrify(count)?;
    let right_view = right.orrify(count)?;
    let mut result = Vector::new(LogicalType::Boolean);
    let mut nulls = Vec::new();
    {
        let left_data = left_view.data.borrow();
        let right_data = right_view.data.borrow();
        let (l, r) = (booleans(left_data.data()?)?, booleans(right_data.data()?)?);
        let result_buffer = result.buffer()?.clone();
        let mut result_data = result_buffer.borrow_mut();
        let out = booleans_mut(result_data.data_mut()?)?;
        for i in 0..count {
            let a = (!left_view.is_null(i)).then(|| l[left_view.index(i)]);
            let b = (!right_view.is_null(i)).then(|| r[right_view.index(i)]);
            let value = match op {
                ConjunctionOp::And => match (a, b) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
                ConjunctionOp::Or => match (a, b) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
            };
            match value {
                Some(value) => out[i] = value,
                None => nulls.push(i),
            }
        }
    }
    for i in nulls {
        result.set_null(i, true);
    }
    finish(result, &[left, right])
}

fn map_booleans(input: &Vector, count: usize, f: impl Fn(Option<bool>) -> Option<bool>) -> Result<Vector> {
    if input.logical_type() != &LogicalType::Boolean {
        return Err(ExecutionError::type_mismatch("NOT", &LogicalType::Boolean, input.logical_type()));
    }
    let count = result_count(&[input], count);
    let view = input.orrify(count)?;
    let mut result = Vector::new(LogicalType::Boolean);
    for i in 0..count {
        let value = {
            let data = view.data.borrow();
            let values = booleans(data.data()?)?;
            f((!view.is_null(i)).then(|| values[view.index(i)]))
        };
        let value = value.map(Value::Boolean).unwrap_or(Value::Null(LogicalType::Boolean));
        result.set_value(i, &value)?;
    }
    finish(result, &[input])
}

fn arithmetic(op: ArithmeticOp, left: &Vector, right: &Vector, return_type: &LogicalType, count: usize) -> Result<Vector> {
    let operator = op.symbol();
    if !return_type.is_numeric() {
        return Err(ExecutionError::type_mismatch(operator, &LogicalType::Double, return_type));
    }
    let count = result_count(&[left, right], count);
    let left_view = left.orrify(count)?;
    let right_view = right.orrify(count)?;
    let mut result = Vector::new(return_type.clone());
    let typed = left.logical_type() == return_type && right.logical_type() == return_type;
    if typed {
        let left_data = left_view.data.borrow();
        let right_data = right_view.data.borrow();
        let result_buffer = result.buffer()?.clone();
        let mut result_data = result_buffer.borrow_mut();

        macro_rules! integer_loop {
            ($l:expr, $r:expr, $out:expr) => {
                for i in 0..count {
                    if left_view.is_null(i) || right_view.is_null(i) {
                        continue;
                    }
                    let (a, b) = ($l[left_view.index(i)], $r[right_view.index(i)]);
                    if b == 0 && matches!(op, ArithmeticOp::Divide | ArithmeticOp::Modulo) {
                        return Err(ExecutionError::DivisionByZero { operator: operator.to_string() });
                    }
                    $out[i] = match op {
                        ArithmeticOp::Add => a.checked_add(b),
                        ArithmeticOp::Subtract => a.checked_sub(b),
                        ArithmeticOp::Multiply => a.checked_mul(b),
                        ArithmeticOp::Divide => a.checked_div(b),
                        ArithmeticOp::Modulo => a.checked_rem(b),
                    }.ok_or_else(|| ExecutionError::overflow(operator, return_type))?;
                }
            };
        }
        macro_rules! float_loop {
            ($l:expr, $r:expr, $out:expr) => {
                for i in 0..count {
                    if left_view.is_null(i) || right_view.is_null(i) {
                        continue;
                    }
                    let (a, b) = ($l[left_view.index(i)], $r[right_view.index(i)]);
                    if b == 0.0 && matches!(op, ArithmeticOp::Divide | ArithmeticOp::Modulo) {
                        return Err(ExecutionError::DivisionByZero { operator: operator.to_string() });
                    }
                    let value = match op {
                        ArithmeticOp::Add => a + b,
                        ArithmeticOp::Subtract => a - b,
                        ArithmeticOp::Multiply => a * b,
                        ArithmeticOp::Divide => a / b,
                        ArithmeticOp::Modulo => a % b,
                    };
                    if value.is_infinite() && a.is_finite() && b.is_finite() {
                        return Err(ExecutionError::overflow(operator, return_type));
                    }
                    $out[i] = value;
                }
            };
        }
        match (left_data.data()?, right_data.data()?, result_data.data_mut()?) {
            (ColumnData::TinyInt(l), ColumnData::TinyInt(r), ColumnData::TinyInt(out)) => integer_loop!(l, r, out),
            (ColumnData::SmallInt(l), ColumnData::SmallInt(r), ColumnData::SmallInt(out)) => integer_loop!(l, r, out),
            (ColumnData::Integer(l), ColumnData::Integer(r), ColumnData::Integer(out)) => integer_loop!(l, r, out),
            (ColumnData::BigInt(l), ColumnData::BigInt(r), ColumnData::BigInt(out)) => integer_loop!(l, r, out),
            (ColumnData::Float(l), ColumnData::Float(r), ColumnData::Float(out)) => float_loop!(l, r, out),
            (ColumnData::Double(l), ColumnData::Double(r), ColumnData::Double(out)) => float_loop!(l, r, out),
            (l, _, _) => {
                return Err(ExecutionError::Representation(format!("arithmetic over a {} buffer", l.type_name())));
            },
        }
    } else {
        for i in 0..count {
            if left_view.is_null(i) || right_view.is_null(i) {
                continue;
            }
            let a = left.get_value(i)?.cast_as(return_type)?;
            let b = right.get_value(i)?.cast_as(return_type)?;
            result.set_value(i, &arithmetic_value(op, &a, &b, return_type)?)?;
        }
    }
    null_union(&mut result, &left_view, &right_view, count);
    finish(result, &[left, right])
}

// Row at a time fallback for inputs that first need a cast to the result type
fn arithmetic_value(op: ArithmeticOp, a: &Value, b: &Value, return_type: &LogicalType) -> Result<Value> {
    let operator = op.symbol();
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if b == 0 && matches!(op, ArithmeticOp::Divide | ArithmeticOp::Modulo) {
            return Err(ExecutionError::DivisionByZero { operator: operator.to_string() });
        }
        let value = match op {
            ArithmeticOp::Add => a.checked_add(b),
            ArithmeticOp::Subtract => a.checked_sub(b),
            ArithmeticOp::Multiply => a.checked_mul(b),
            ArithmeticOp::Divide => a.checked_div(b),
            ArithmeticOp::Modulo => a.checked_rem(b),
        }.ok_or_else(|| ExecutionError::overflow(operator, return_type))?;
        return Value::integral(return_type, value).map_err(|_| ExecutionError::overflow(operator, return_type));
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => {
            if b == 0.0 && matches!(op, ArithmeticOp::Divide | ArithmeticOp::Modulo) {
                return Err(ExecutionError::DivisionByZero { operator: operator.to_string() });
            }
            let value = match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Subtract => a - b,
                ArithmeticOp::Multiply => a * b,
                ArithmeticOp::Divide => a / b,
                ArithmeticOp::Modulo => a % b,
            };
            Value::Double(value).cast_as(return_type)
        },
        _ => Err(ExecutionError::type_mismatch(operator, return_type, &a.logical_type())),
    }
}
