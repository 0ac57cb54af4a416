use crate::{chunk::DataChunk, error::Result, types::LogicalType};

mod memory;

pub use self::memory::*;

/*
    The contract between leaf operators and whatever stores the data. A data source hands out
    scan cursors over a subset of its columns, a cursor fills one chunk per call until it is
    exhausted. Where the rows come from (pages, files, memory) is none of the engine's business.
 */
#[cfg_attr(test, mockall::automock)]
pub trait DataSource {
    fn types(&self) -> Vec<LogicalType>;
    // Estimated number of rows, only used for planning hints
    fn cardinality(&self) -> usize;
    fn init_scan(&self, column_ids: &[usize]) -> Result<Box<dyn ScanCursor>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait ScanCursor {
    // Fills `chunk` (initialized with the projected column types) with up to a standard vector
    // of rows. Leaving it empty signals the end of the scan.
    fn next_batch(&mut self, chunk: &mut DataChunk) -> Result<()>;
}
