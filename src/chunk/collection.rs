use std::{cmp::Ordering, fmt::Display};

use crate::{error::{ExecutionError, Result}, types::{LogicalType, Value},
    vector::{operations, selection::SelectionVector, STANDARD_VECTOR_SIZE}};

use super::DataChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Ascending,
    Descending,
}

// Applies to every key of one sort, independent of the key's direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByNullType {
    NullsFirst,
    NullsLast,
}

/*
    A relation of arbitrary size made of full chunks. Every chunk except the last one holds
    exactly STANDARD_VECTOR_SIZE rows, so row i lives in chunk i / STANDARD_VECTOR_SIZE at
    offset i % STANDARD_VECTOR_SIZE.
 */
#[derive(Debug, Default)]
pub struct ChunkCollection {
    count: usize,
    chunks: Vec<DataChunk>,
    types: Vec<LogicalType>,
}

impl ChunkCollection {
    pub fn new() -> Self {
        ChunkCollection::default()
    }

    pub fn set_types(&mut self, types: Vec<LogicalType>) {
        debug_assert_eq!(self.count, 0);
        self.types = types;
    }

    pub fn types(&self) -> &[LogicalType] {
        &self.types
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn column_count(&self) -> usize {
        self.types.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &DataChunk> {
        self.chunks.iter()
    }

    pub fn get_chunk(&self, index: usize) -> &DataChunk {
        &self.chunks[index]
    }

    pub fn locate_chunk(&self, index: usize) -> (usize, usize) {
        debug_assert!(index < self.count);
        (index / STANDARD_VECTOR_SIZE, index % STANDARD_VECTOR_SIZE)
    }

    fn check_types(&self, types: &[LogicalType]) -> Result<()> {
        if types.len() != self.types.len() {
            return Err(ExecutionError::Representation(format!(
                "cannot append {} columns to a collection of {} columns", types.len(), self.types.len()
            )));
        }
        for (expected, found) in self.types.iter().zip(types) {
            if expected != found {
                return Err(ExecutionError::type_mismatch("chunk collection append", expected, found));
            }
        }
        Ok(())
    }

    // Copies the rows of `new_chunk`, filling up the last chunk first
    pub fn append(&mut self, new_chunk: &DataChunk) -> Result<()> {
        if new_chunk.size() == 0 {
            return Ok(());
        }
        if self.types.is_empty() {
            self.types = new_chunk.types();
        } else {
            self.check_types(&new_chunk.types())?;
        }
        let mut remaining = new_chunk.size();
        let mut offset = 0;
        if let Some(last) = self.chunks.last_mut() {
            let last_size = last.size();
            let append_count = (STANDARD_VECTOR_SIZE - last_size).min(remaining);
            if append_count > 0 {
                let incremental = SelectionVector::incremental();
                for (source, target) in new_chunk.columns.iter().zip(last.columns.iter_mut()) {
                    operations::copy(source, target, &incremental, append_count, 0, last_size)?;
                }
                last.set_cardinality(last_size + append_count);
                remaining -= append_count;
                offset = append_count;
            }
        }
        if remaining > 0 {
            let mut chunk = DataChunk::with_types(&self.types);
            new_chunk.copy(&mut chunk, offset)?;
            self.chunks.push(chunk);
        }
        self.count += new_chunk.size();
        Ok(())
    }

    pub fn append_collection(&mut self, other: &ChunkCollection) -> Result<()> {
        for chunk in other.chunks() {
            self.append(chunk)?;
        }
        Ok(())
    }

    pub fn append_row(&mut self, row: &[Value]) -> Result<()> {
        if self.types.is_empty() {
            return Err(ExecutionError::Representation("append to a collection without types".to_string()));
        }
        if row.len() != self.types.len() {
            return Err(ExecutionError::Representation(format!(
                "cannot append a row of {} values to a collection of {} columns", row.len(), self.types.len()
            )));
        }
        if self.chunks.last().map_or(true, |last| last.size() == STANDARD_VECTOR_SIZE) {
            self.chunks.push(DataChunk::with_types(&self.types));
        }
        if let Some(last) = self.chunks.last_mut() {
            let row_idx = last.size();
            for (column, value) in row.iter().enumerate() {
                last.set_value(column, row_idx, value)?;
            }
            last.set_cardinality(row_idx + 1);
        }
        self.count += 1;
        Ok(())
    }

    pub fn get_value(&self, column: usize, index: usize) -> Result<Value> {
        let (chunk, offset) = self.locate_chunk(index);
        self.chunks[chunk].get_value(column, offset)
    }

    pub fn set_value(&mut self, column: usize, index: usize, value: &Value) -> Result<()> {
        let (chunk, offset) = self.locate_chunk(index);
        self.chunks[chunk].set_value(column, offset, value)
    }

    pub fn get_row(&self, index: usize) -> Result<Vec<Value>> {
        let (chunk, offset) = self.locate_chunk(index);
        let chunk = &self.chunks[chunk];
        (0..chunk.column_count()).map(|column| chunk.get_value(column, offset)).collect()
    }

    fn sort_keys(&self) -> Result<Vec<Vec<Value>>> {
        let mut keys = Vec::with_capacity(self.count);
        for chunk in &self.chunks {
            for row in 0..chunk.size() {
                keys.push((0..chunk.column_count()).map(|column| chunk.get_value(column, row)).collect::<Result<Vec<_>>>()?);
            }
        }
        Ok(keys)
    }

    /*
        Sorts on all columns of this collection, returning the permutation rather than moving
        rows. The sort is stable, rows that compare equal on every key keep their order.
     */
    pub fn sort(&self, orders: &[OrderType], null_order: OrderByNullType) -> Result<Vec<usize>> {
        debug_assert_eq!(orders.len(), self.column_count());
        let keys = self.sort_keys()?;
        let mut order: Vec<usize> = (0..self.count).collect();
        order.sort_by(|&a, &b| compare_rows(&keys[a], &keys[b], orders, null_order));
        Ok(order)
    }

    // Writes rows order[start_offset..] into `target`, at most one standard vector
    pub fn materialize_sorted_chunk(&self, target: &mut DataChunk, order: &[usize], start_offset: usize) -> Result<()> {
        if target.column_count() == 0 {
            target.initialize(&self.types);
        }
        let remaining = order.len().saturating_sub(start_offset).min(STANDARD_VECTOR_SIZE);
        for row in 0..remaining {
            let (chunk, offset) = self.locate_chunk(order[start_offset + row]);
            let source = &self.chunks[chunk];
            for (source_column, target_column) in source.columns.iter().zip(target.columns.iter_mut()) {
                operations::copy_entry(source_column, offset, target_column, row)?;
            }
        }
        target.set_cardinality(remaining);
        Ok(())
    }

    pub fn materialize_heap_chunk(&self, target: &mut DataChunk, heap: &[usize], offset: usize) -> Result<()> {
        self.materialize_sorted_chunk(target, heap, offset)
    }

    // Physically rearranges the rows according to a permutation
    pub fn reorder(&mut self, order: &[usize]) -> Result<()> {
        debug_assert_eq!(order.len(), self.count);
        let mut chunks = Vec::with_capacity(self.chunks.len());
        let mut offset = 0;
        while offset < order.len() {
            let mut chunk = DataChunk::with_types(&self.types);
            self.materialize_sorted_chunk(&mut chunk, order, offset)?;
            offset += chunk.size();
            chunks.push(chunk);
        }
        self.chunks = chunks;
        Ok(())
    }

    /*
        Indices of the first `limit` rows in sort order, sorted. Keeps a bounded max heap of the
        best rows seen so far, ties are broken by row index so the result matches a stable sort.
     */
    pub fn heap(&self, orders: &[OrderType], null_order: OrderByNullType, limit: usize) -> Result<Vec<usize>> {
        let limit = limit.min(self.count);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let keys = self.sort_keys()?;
        let compare = |a: usize, b: usize| compare_rows(&keys[a], &keys[b], orders, null_order).then(a.cmp(&b));
        let mut heap: Vec<usize> = Vec::with_capacity(limit);
        for row in 0..self.count {
            if heap.len() < limit {
                heap.push(row);
                sift_up(&mut heap, &compare);
            } else if compare(row, heap[0]) == Ordering::Less {
                heap[0] = row;
                sift_down(&mut heap, &compare);
            }
        }
        heap.sort_by(|&a, &b| compare(a, b));
        Ok(heap)
    }

    // Row by row comparison, ignoring how rows are split into chunks
    pub fn equals(&self, other: &ChunkCollection) -> Result<bool> {
        if self.count != other.count || self.column_count() != other.column_count() {
            return Ok(false);
        }
        for row in 0..self.count {
            if self.get_row(row)? != other.get_row(row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn compare_rows(left: &[Value], right: &[Value], orders: &[OrderType], null_order: OrderByNullType) -> Ordering {
    for ((left, right), order) in left.iter().zip(right).zip(orders) {
        let ordering = match (left.is_null(), right.is_null(), null_order) {
            (true, true, _) => Ordering::Equal,
            (true, false, OrderByNullType::NullsFirst) | (false, true, OrderByNullType::NullsLast) => Ordering::Less,
            (true, false, OrderByNullType::NullsLast) | (false, true, OrderByNullType::NullsFirst) => Ordering::Greater,
            (false, false, _) => {
                let ordering = left.compare(right).unwrap_or(Ordering::Equal);
                match order {
                    OrderType::Ascending => ordering,
                    OrderType::Descending => ordering.reverse(),
                }
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// Max heap on `compare`, the worst of the kept rows sits at the top
fn sift_up(heap: &mut [usize], compare: &impl Fn(usize, usize) -> Ordering) {
    let mut child = heap.len() - 1;
    while child > 0 {
        let parent = (child - 1) / 2;
        if compare(heap[child], heap[parent]) != Ordering::Greater {
            break;
        }
        heap.swap(child, parent);
        child = parent;
    }
}

fn sift_down(heap: &mut [usize], compare: &impl Fn(usize, usize) -> Ordering) {
    let mut parent = 0;
    loop {
        let left = 2 * parent + 1;
        let right = left + 1;
        let mut largest = parent;
        if left < heap.len() && compare(heap[left], heap[largest]) == Ordering::Greater {
            largest = left;
        }
        if right < heap.len() && compare(heap[right], heap[largest]) == Ordering::Greater {
            largest = right;
        }
        if largest == parent {
            break;
        }
        heap.swap(parent, largest);
        parent = largest;
    }
}

impl Display for ChunkCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ChunkCollection - [{} Rows in {} Chunks]", self.count, self.chunks.len())?;
        for chunk in &self.chunks {
            write!(f, "{}", chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn random_collection(rows: usize, seed: u64) -> ChunkCollection {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut collection = ChunkCollection::new();
        collection.set_types(vec![LogicalType::Integer, LogicalType::Varchar]);
        for row in 0..rows {
            let key = if rng.gen_bool(0.1) { Value::Null(LogicalType::Integer) } else { Value::Integer(rng.gen_range(0..50)) };
            collection.append_row(&[key, Value::varchar(format!("payload string for row {}", row))]).unwrap();
        }
        collection
    }

    #[test]
    fn test_append_fills_last_chunk() {
        let source = random_collection(1500, 1);
        let mut collection = ChunkCollection::new();
        for chunk in source.chunks() {
            collection.append(chunk).unwrap();
            collection.append(chunk).unwrap();
        }
        assert_eq!(collection.count(), 3000);
        assert_eq!(collection.chunk_count(), 3);
        assert_eq!(collection.get_chunk(0).size(), STANDARD_VECTOR_SIZE);
        assert_eq!(collection.get_value(1, 1024).unwrap(), source.get_value(1, 0).unwrap());
        assert_eq!(collection.get_value(1, 2048).unwrap(), source.get_value(1, 1024).unwrap());
        assert_eq!(collection.get_value(1, 2999).unwrap(), source.get_value(1, 1499).unwrap());
        assert_eq!(collection.locate_chunk(2999), (2, 951));
    }

    #[test]
    fn test_append_type_mismatch() {
        let mut collection = random_collection(3, 2);
        let chunk = DataChunk::with_types(&[LogicalType::BigInt, LogicalType::Varchar]);
        let mut chunk = chunk;
        chunk.set_value(0, 0, &Value::BigInt(1)).unwrap();
        chunk.set_cardinality(1);
        assert!(matches!(collection.append(&chunk), Err(ExecutionError::TypeMismatch { .. })));
    }

    #[test]
    fn test_sort_is_stable_and_ordered() {
        let collection = random_collection(2500, 3);
        let mut keys = ChunkCollection::new();
        keys.set_types(vec![LogicalType::Integer]);
        for row in 0..collection.count() {
            keys.append_row(&[collection.get_value(0, row).unwrap()]).unwrap();
        }
        for null_order in [OrderByNullType::NullsFirst, OrderByNullType::NullsLast] {
            let order = keys.sort(&[OrderType::Descending], null_order).unwrap();
            let mut sorted = DataChunk::new();
            let mut rows = Vec::new();
            let mut offset = 0;
            while offset < order.len() {
                collection.materialize_sorted_chunk(&mut sorted, &order, offset).unwrap();
                for row in 0..sorted.size() {
                    rows.push((sorted.get_value(0, row).unwrap(), order[offset + row]));
                }
                offset += sorted.size();
                sorted.reset();
            }
            assert_eq!(rows.len(), 2500);
            for pair in rows.windows(2) {
                let ((left, left_idx), (right, right_idx)) = (&pair[0], &pair[1]);
                let ordering = compare_rows(std::slice::from_ref(left), std::slice::from_ref(right), &[OrderType::Descending], null_order);
                assert_ne!(ordering, Ordering::Greater);
                if ordering == Ordering::Equal {
                    assert!(left_idx < right_idx);
                }
            }
            match null_order {
                OrderByNullType::NullsFirst => assert!(rows[0].0.is_null()),
                OrderByNullType::NullsLast => assert!(rows[2499].0.is_null()),
            }
        }
    }

    #[test]
    fn test_heap_matches_sort_prefix() {
        let collection = random_collection(3000, 4);
        let mut keys = ChunkCollection::new();
        keys.set_types(vec![LogicalType::Integer]);
        for row in 0..collection.count() {
            keys.append_row(&[collection.get_value(0, row).unwrap()]).unwrap();
        }
        let order = keys.sort(&[OrderType::Ascending], OrderByNullType::NullsLast).unwrap();
        let heap = keys.heap(&[OrderType::Ascending], OrderByNullType::NullsLast, 37).unwrap();
        assert_eq!(heap, order[..37].to_vec());
        assert!(keys.heap(&[OrderType::Ascending], OrderByNullType::NullsLast, 0).unwrap().is_empty());
        assert_eq!(keys.heap(&[OrderType::Ascending], OrderByNullType::NullsLast, 5000).unwrap(), order);
    }

    #[test]
    fn test_reorder_and_equals() {
        let mut collection = random_collection(1100, 5);
        let copy = {
            let mut copy = ChunkCollection::new();
            copy.append_collection(&collection).unwrap();
            copy
        };
        assert!(collection.equals(&copy).unwrap());
        let reversed: Vec<usize> = (0..collection.count()).rev().collect();
        collection.reorder(&reversed).unwrap();
        assert!(!collection.equals(&copy).unwrap());
        assert_eq!(collection.get_row(0).unwrap(), copy.get_row(1099).unwrap());
        collection.reorder(&reversed).unwrap();
        assert!(collection.equals(&copy).unwrap());
    }

    #[test]
    fn test_equals_ignores_chunk_boundaries() {
        let source = random_collection(10, 6);
        let mut split = ChunkCollection::new();
        for row in 0..10 {
            let mut chunk = DataChunk::with_types(source.types());
            for column in 0..2 {
                chunk.set_value(column, 0, &source.get_value(column, row).unwrap()).unwrap();
            }
            chunk.set_cardinality(1);
            split.append(&chunk).unwrap();
        }
        assert_eq!(split.chunk_count(), 1);
        assert!(split.equals(&source).unwrap());
    }
}
