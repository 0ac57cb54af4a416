use std::rc::Rc;

use crate::{access::{DataSource, ScanCursor}, chunk::DataChunk, error::{ExecutionError, Result},
    execution::context::ExecutionContext, types::LogicalType};

use super::{LocalState, OperatorState, PhysicalOperator};

pub struct ScanState {
    // Opened on the first pull
    cursor: Option<Box<dyn ScanCursor>>,
}

// Leaf reading the projected columns of a data source
pub struct TableScan {
    source: Rc<dyn DataSource>,
    column_ids: Vec<usize>,
    types: Vec<LogicalType>,
    children: Vec<Box<dyn PhysicalOperator>>,
}

impl TableScan {
    pub fn new(source: Rc<dyn DataSource>, column_ids: Vec<usize>, types: Vec<LogicalType>) -> Self {
        TableScan { source, column_ids, types, children: Vec::new() }
    }
}

impl PhysicalOperator for TableScan {
    fn name(&self) -> &'static str {
        "TABLE_SCAN"
    }

    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> &[Box<dyn PhysicalOperator>] {
        &self.children
    }

    fn local_state(&self) -> LocalState {
        LocalState::Scan(ScanState { cursor: None })
    }

    fn get_chunk_internal(&self, _context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        let scan = match &mut state.local {
            LocalState::Scan(scan) => scan,
            _ => return Err(ExecutionError::Representation("table scan without scan state".to_string())),
        };
        if scan.cursor.is_none() {
            scan.cursor = Some(self.source.init_scan(&self.column_ids)?);
        }
        match scan.cursor.as_mut() {
            Some(cursor) => cursor.next_batch(chunk),
            None => Ok(()),
        }
    }

    fn estimate_cardinality(&self) -> usize {
        self.source.cardinality()
    }

    fn extra_render_information(&self) -> String {
        format!("columns: {:?}", self.column_ids)
    }
}

#[cfg(test)]
mod test {
    use crate::{access::{InMemoryTable, MockDataSource, MockScanCursor}, execution::operators::{collect_all, test_util::*}, types::Value};

    use super::*;

    #[test]
    fn test_scan_pulls_cursor_until_empty() {
        let mut cursor = MockScanCursor::new();
        let mut calls = 0;
        cursor.expect_next_batch().times(3).returning(move |chunk| {
            calls += 1;
            if calls <= 2 {
                for row in 0..100 {
                    chunk.set_value(0, row, &Value::BigInt((calls * 100 + row) as i64))?;
                }
                chunk.set_cardinality(100);
            }
            Ok(())
        });
        let mut source = MockDataSource::new();
        source.expect_init_scan().times(1).return_once(move |columns| {
            assert_eq!(columns, &[4]);
            Ok(Box::new(cursor))
        });
        source.expect_cardinality().return_const(200usize);
        let scan = TableScan::new(Rc::new(source), vec![4], vec![LogicalType::BigInt]);
        assert_eq!(scan.estimate_cardinality(), 200);

        // a fourth pull after exhaustion must not reach the cursor
        let result = collect_all(&scan, &context()).unwrap();
        assert_eq!(result.count(), 200);
        assert_eq!(result.get_value(0, 0).unwrap(), Value::BigInt(100));
        assert_eq!(result.get_value(0, 199).unwrap(), Value::BigInt(299));
    }

    #[test]
    fn test_scan_propagates_source_errors() {
        let mut cursor = MockScanCursor::new();
        cursor.expect_next_batch().returning(|_| Err(ExecutionError::Source("disk on fire".to_string())));
        let mut source = MockDataSource::new();
        source.expect_init_scan().return_once(move |_| Ok(Box::new(cursor)));
        let scan = TableScan::new(Rc::new(source), vec![0], vec![LogicalType::Integer]);
        let mut state = scan.get_operator_state();
        let mut chunk = scan.initialize_chunk();
        assert_eq!(scan.get_chunk(&context(), &mut chunk, &mut state), Err(ExecutionError::Source("disk on fire".to_string())));
    }

    #[test]
    fn test_scan_in_memory_table() {
        let data = collection(vec![LogicalType::Integer, LogicalType::Varchar],
            (0..3000).map(|i| vec![Value::Integer(i), Value::varchar(format!("row {}", i))]));
        let table = Rc::new(InMemoryTable::new(data));
        let scan = TableScan::new(table, vec![1], vec![LogicalType::Varchar]);
        let result = collect_all(&scan, &context()).unwrap();
        assert_eq!(result.count(), 3000);
        assert_eq!(result.get_value(0, 2999).unwrap(), Value::varchar("row 2999"));
    }
}
