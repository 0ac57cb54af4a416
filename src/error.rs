use thiserror::Error;

use crate::types::LogicalType;

pub type Result<T> = std::result::Result<T, ExecutionError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("capacity exceeded: {requested} rows do not fit into a capacity of {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error("unexpected vector representation: {0}")]
    Representation(String),

    #[error("type mismatch in {operator}: expected {expected}, found {found}")]
    TypeMismatch { operator: String, expected: LogicalType, found: LogicalType },

    #[error("{logical_type} overflow in {operator}")]
    Overflow { operator: String, logical_type: LogicalType },

    #[error("division by zero in {operator}")]
    DivisionByZero { operator: String },

    #[error("could not cast {value} from {from} to {to}")]
    InvalidCast { from: LogicalType, to: LogicalType, value: String },

    #[error("query was interrupted")]
    Interrupted,

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("data source error: {0}")]
    Source(String),
}

impl ExecutionError {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ExecutionError::Interrupted)
    }

    pub(crate) fn type_mismatch(operator: &str, expected: &LogicalType, found: &LogicalType) -> Self {
        ExecutionError::TypeMismatch {
            operator: operator.to_string(),
            expected: expected.clone(),
            found: found.clone(),
        }
    }

    pub(crate) fn overflow(operator: &str, logical_type: &LogicalType) -> Self {
        ExecutionError::Overflow { operator: operator.to_string(), logical_type: logical_type.clone() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ExecutionError::CapacityExceeded { requested: 1500, capacity: 1024 };
        assert_eq!(err.to_string(), "capacity exceeded: 1500 rows do not fit into a capacity of 1024");
        let err = ExecutionError::type_mismatch("append", &LogicalType::Integer, &LogicalType::Varchar);
        assert_eq!(err.to_string(), "type mismatch in append: expected INTEGER, found VARCHAR");
        assert!(ExecutionError::Interrupted.is_interrupt());
        assert!(!ExecutionError::overflow("SUM", &LogicalType::BigInt).is_interrupt());
    }
}
