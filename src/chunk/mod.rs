use std::fmt::Display;

use crate::{error::{ExecutionError, Result}, types::{LogicalType, Value},
    vector::{buffer::{BufferRef, VectorBuffer}, operations, selection::SelectionVector, SelectionCache, Vector,
        VectorView, STANDARD_VECTOR_SIZE}};

pub mod collection;

pub use collection::{ChunkCollection, OrderByNullType, OrderType};

/*
    A set of equally long columns, the unit operators pass to each other. `count` is the number
    of valid rows, the vectors themselves always have room for a full standard vector.
    After `initialize` every column is flat over a buffer the chunk allocated itself. Operators
    may point columns elsewhere (reference, slice), `reset` goes back to the own buffers.
 */
#[derive(Debug, Default)]
pub struct DataChunk {
    pub columns: Vec<Vector>,
    count: usize,
    // Buffers allocated by `initialize`, None for nested types which are rebuilt on reset
    owned_buffers: Vec<Option<BufferRef>>,
}

impl DataChunk {
    pub fn new() -> Self {
        DataChunk::default()
    }

    pub fn with_types(types: &[LogicalType]) -> Self {
        let mut chunk = DataChunk::new();
        chunk.initialize(types);
        chunk
    }

    pub fn initialize(&mut self, types: &[LogicalType]) {
        debug_assert!(!types.is_empty());
        self.count = 0;
        self.columns.clear();
        self.owned_buffers.clear();
        for logical_type in types {
            if logical_type.is_nested() {
                self.columns.push(Vector::new(logical_type.clone()));
                self.owned_buffers.push(None);
            } else {
                let buffer = VectorBuffer::create_standard(logical_type);
                self.columns.push(Vector::with_buffer(logical_type.clone(), buffer.clone()));
                self.owned_buffers.push(Some(buffer));
            }
        }
    }

    pub fn size(&self) -> usize {
        self.count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn set_cardinality(&mut self, count: usize) {
        assert!(count <= STANDARD_VECTOR_SIZE);
        self.count = count;
    }

    pub fn types(&self) -> Vec<LogicalType> {
        self.columns.iter().map(|column| column.logical_type().clone()).collect()
    }

    // Back to zero rows and flat columns over the chunk's own buffers
    pub fn reset(&mut self) {
        self.count = 0;
        for (column, owned) in self.columns.iter_mut().zip(self.owned_buffers.iter()) {
            let logical_type = column.logical_type().clone();
            *column = match owned {
                Some(buffer) => Vector::with_buffer(logical_type, buffer.clone()),
                None => Vector::new(logical_type),
            };
        }
    }

    pub fn reference(&mut self, other: &DataChunk) {
        assert!(other.column_count() <= self.column_count());
        self.set_cardinality(other.size());
        for (column, other_column) in self.columns.iter_mut().zip(other.columns.iter()) {
            column.reference(other_column);
        }
    }

    pub fn append(&mut self, other: &DataChunk) -> Result<()> {
        if other.size() == 0 {
            return Ok(());
        }
        if other.column_count() != self.column_count() {
            return Err(ExecutionError::Representation(format!(
                "cannot append a chunk with {} columns to one with {}", other.column_count(), self.column_count()
            )));
        }
        if self.size() + other.size() > STANDARD_VECTOR_SIZE {
            return Err(ExecutionError::CapacityExceeded {
                requested: self.size() + other.size(),
                capacity: STANDARD_VECTOR_SIZE,
            });
        }
        for (column, other_column) in self.columns.iter().zip(other.columns.iter()) {
            if column.logical_type() != other_column.logical_type() {
                return Err(ExecutionError::type_mismatch("append", column.logical_type(), other_column.logical_type()));
            }
        }
        let incremental = SelectionVector::incremental();
        for (column, other_column) in self.columns.iter_mut().zip(other.columns.iter()) {
            operations::copy(other_column, column, &incremental, other.size(), 0, self.count)?;
        }
        self.count += other.size();
        Ok(())
    }

    // Copies rows starting at `offset` into the freshly initialized `target`
    pub fn copy(&self, target: &mut DataChunk, offset: usize) -> Result<()> {
        debug_assert_eq!(target.size(), 0);
        debug_assert_eq!(target.column_count(), self.column_count());
        let incremental = SelectionVector::incremental();
        for (column, target_column) in self.columns.iter().zip(target.columns.iter_mut()) {
            operations::copy(column, target_column, &incremental, self.size(), offset, 0)?;
        }
        target.set_cardinality(self.size().saturating_sub(offset));
        Ok(())
    }

    pub fn slice(&mut self, selection: &SelectionVector, count: usize) -> Result<()> {
        self.count = count;
        let mut cache = SelectionCache::default();
        for column in self.columns.iter_mut() {
            column.slice_with_cache(selection, count, &mut cache)?;
        }
        Ok(())
    }

    // Columns [col_offset, col_offset + other.columns) become sliced views of `other`
    pub fn slice_from(&mut self, other: &DataChunk, selection: &SelectionVector, count: usize, col_offset: usize) -> Result<()> {
        assert!(other.column_count() + col_offset <= self.column_count());
        self.set_cardinality(count);
        let mut cache = SelectionCache::default();
        for (column, other_column) in self.columns[col_offset..].iter_mut().zip(other.columns.iter()) {
            column.reference(other_column);
            column.slice_with_cache(selection, count, &mut cache)?;
        }
        Ok(())
    }

    pub fn normalify(&mut self) -> Result<()> {
        for column in self.columns.iter_mut() {
            column.normalify(self.count)?;
        }
        Ok(())
    }

    pub fn orrify(&self) -> Result<Vec<VectorView>> {
        self.columns.iter().map(|column| column.orrify(self.count)).collect()
    }

    pub fn get_value(&self, column: usize, row: usize) -> Result<Value> {
        debug_assert!(row < self.count);
        self.columns[column].get_value(row)
    }

    pub fn set_value(&mut self, column: usize, row: usize, value: &Value) -> Result<()> {
        self.columns[column].set_value(row, value)
    }

    pub fn verify(&self) -> Result<()> {
        if self.count > STANDARD_VECTOR_SIZE {
            return Err(ExecutionError::CapacityExceeded { requested: self.count, capacity: STANDARD_VECTOR_SIZE });
        }
        for column in &self.columns {
            column.verify(self.count)?;
        }
        Ok(())
    }
}

impl Display for DataChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Chunk - [{} Columns]", self.column_count())?;
        for column in &self.columns {
            writeln!(f, "- {}", column.to_string(self.count))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::vector::VectorType;

    use super::*;

    fn test_chunk(rows: usize) -> DataChunk {
        let mut chunk = DataChunk::with_types(&[LogicalType::Integer, LogicalType::Varchar]);
        for row in 0..rows {
            chunk.set_value(0, row, &Value::Integer(row as i32)).unwrap();
            let string = if row % 3 == 0 { Value::Null(LogicalType::Varchar) } else { Value::varchar(format!("row number {} of the test chunk", row)) };
            chunk.set_value(1, row, &string).unwrap();
        }
        chunk.set_cardinality(rows);
        chunk
    }

    #[test]
    fn test_slice_reference_round_trip() {
        let chunk = test_chunk(100);
        let selection = SelectionVector::from_vec((0..100).rev().step_by(7).map(|i| i as u32).collect());
        let count = selection.len();
        let mut sliced = DataChunk::with_types(&chunk.types());
        sliced.reference(&chunk);
        sliced.slice(&selection, count).unwrap();
        let mut other = DataChunk::with_types(&chunk.types());
        other.reference(&sliced);
        assert_eq!(other.size(), count);
        for i in 0..count {
            for column in 0..2 {
                assert_eq!(other.get_value(column, i).unwrap(), chunk.get_value(column, selection.get_index(i)).unwrap());
            }
        }
    }

    #[test]
    fn test_slice_shares_composed_selection() {
        let chunk = test_chunk(10);
        let mut sliced = DataChunk::with_types(&chunk.types());
        sliced.slice_from(&chunk, &SelectionVector::from_vec(vec![1, 3, 5, 7]), 4, 0).unwrap();
        sliced.slice(&SelectionVector::from_vec(vec![3, 0]), 2).unwrap();
        let selections = sliced.orrify().unwrap();
        assert_eq!(selections[0].selection.data_id(), selections[1].selection.data_id());
        assert_eq!(sliced.get_value(0, 0).unwrap(), Value::Integer(7));
        assert_eq!(sliced.get_value(0, 1).unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_reset_idempotent() {
        let chunk = test_chunk(5);
        let mut target = DataChunk::with_types(&chunk.types());
        target.reference(&chunk);
        target.slice(&SelectionVector::from_vec(vec![1]), 1).unwrap();
        target.reset();
        target.reset();
        assert_eq!(target.size(), 0);
        for column in &target.columns {
            assert_eq!(column.vector_type(), VectorType::Flat);
            assert!(column.nullmask().is_zero_mask());
        }
        // writes go to the own buffer again, not to the referenced chunk
        target.set_value(0, 0, &Value::Integer(99)).unwrap();
        assert_eq!(chunk.get_value(0, 0).unwrap(), Value::Integer(0));
    }

    #[test]
    fn test_reset_forgets_long_strings() {
        let mut chunk = DataChunk::with_types(&[LogicalType::Varchar]);
        chunk.set_value(0, 0, &Value::varchar("a string that needs the chunk's heap")).unwrap();
        chunk.set_cardinality(1);
        chunk.reset();
        chunk.set_cardinality(1);
        assert_eq!(chunk.get_value(0, 0).unwrap(), Value::varchar(""));
        chunk.verify().unwrap();
    }

    #[test]
    fn test_append() {
        let mut chunk = test_chunk(1000);
        let other = test_chunk(24);
        chunk.append(&other).unwrap();
        assert_eq!(chunk.size(), STANDARD_VECTOR_SIZE);
        assert_eq!(chunk.get_value(0, 1001).unwrap(), Value::Integer(1));
        assert_eq!(chunk.get_value(1, 1001).unwrap(), other.get_value(1, 1).unwrap());
        assert!(matches!(chunk.append(&test_chunk(1)), Err(ExecutionError::CapacityExceeded { requested: 1025, capacity: 1024 })));

        let mut mismatched = DataChunk::with_types(&[LogicalType::Integer, LogicalType::Integer]);
        assert!(matches!(mismatched.append(&other), Err(ExecutionError::TypeMismatch { .. })));
        mismatched.append(&DataChunk::with_types(&[LogicalType::Integer, LogicalType::Integer])).unwrap();
    }

    #[test]
    fn test_copy_with_offset() {
        let chunk = test_chunk(10);
        let mut target = DataChunk::with_types(&chunk.types());
        chunk.copy(&mut target, 4).unwrap();
        assert_eq!(target.size(), 6);
        assert_eq!(target.get_value(0, 0).unwrap(), Value::Integer(4));
        assert_eq!(target.get_value(1, 2).unwrap(), Value::Null(LogicalType::Varchar));
        target.verify().unwrap();
    }

    #[test]
    fn test_normalify_and_display() {
        let mut chunk = DataChunk::with_types(&[LogicalType::BigInt]);
        chunk.columns[0].reference_value(&Value::BigInt(8)).unwrap();
        chunk.set_cardinality(2);
        chunk.normalify().unwrap();
        assert_eq!(chunk.columns[0].vector_type(), VectorType::Flat);
        assert_eq!(chunk.to_string(), "Chunk - [1 Columns]\n- Flat BIGINT: 2 = [ 8, 8 ]\n");
    }
}
