use std::rc::Rc;

use crate::{chunk::{ChunkCollection, DataChunk}, error::{ExecutionError, Result}, types::LogicalType};

use super::{DataSource, ScanCursor};

// Table kept entirely in a chunk collection. Scans hand out references to the stored chunks.
#[derive(Debug, Clone)]
pub struct InMemoryTable {
    data: Rc<ChunkCollection>,
}

impl InMemoryTable {
    pub fn new(data: ChunkCollection) -> Self {
        InMemoryTable { data: Rc::new(data) }
    }

    pub fn data(&self) -> &ChunkCollection {
        &self.data
    }
}

impl DataSource for InMemoryTable {
    fn types(&self) -> Vec<LogicalType> {
        self.data.types().to_vec()
    }

    fn cardinality(&self) -> usize {
        self.data.count()
    }

    fn init_scan(&self, column_ids: &[usize]) -> Result<Box<dyn ScanCursor>> {
        if let Some(invalid) = column_ids.iter().find(|id| **id >= self.data.column_count()) {
            return Err(ExecutionError::Source(format!(
                "column {} does not exist in a table of {} columns", invalid, self.data.column_count()
            )));
        }
        Ok(Box::new(InMemoryScan {
            data: self.data.clone(),
            column_ids: column_ids.to_vec(),
            next_chunk: 0,
        }))
    }
}

struct InMemoryScan {
    data: Rc<ChunkCollection>,
    column_ids: Vec<usize>,
    next_chunk: usize,
}

impl ScanCursor for InMemoryScan {
    fn next_batch(&mut self, chunk: &mut DataChunk) -> Result<()> {
        if self.next_chunk >= self.data.chunk_count() {
            chunk.set_cardinality(0);
            return Ok(());
        }
        let source = self.data.get_chunk(self.next_chunk);
        for (column, column_id) in chunk.columns.iter_mut().zip(self.column_ids.iter()) {
            column.reference(&source.columns[*column_id]);
        }
        chunk.set_cardinality(source.size());
        self.next_chunk += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::types::Value;

    use super::*;

    #[test]
    fn test_projected_scan() {
        let mut data = ChunkCollection::new();
        data.set_types(vec![LogicalType::Integer, LogicalType::Varchar, LogicalType::Double]);
        for i in 0..2000 {
            data.append_row(&[Value::Integer(i), Value::varchar(format!("v{}", i)), Value::Double(i as f64 / 2.0)]).unwrap();
        }
        let table = InMemoryTable::new(data);
        assert_eq!(table.cardinality(), 2000);
        let mut cursor = table.init_scan(&[2, 0]).unwrap();
        let mut chunk = DataChunk::with_types(&[LogicalType::Double, LogicalType::Integer]);
        let mut seen = 0;
        loop {
            chunk.reset();
            cursor.next_batch(&mut chunk).unwrap();
            if chunk.size() == 0 {
                break;
            }
            assert_eq!(chunk.get_value(1, 0).unwrap(), Value::Integer(seen as i32));
            assert_eq!(chunk.get_value(0, 1).unwrap(), Value::Double((seen + 1) as f64 / 2.0));
            seen += chunk.size();
        }
        assert_eq!(seen, 2000);
        assert!(matches!(table.init_scan(&[3]), Err(ExecutionError::Source(_))));
    }
}
