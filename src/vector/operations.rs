use std::rc::Rc;

use crate::error::{ExecutionError, Result};

use super::{buffer::{dictionary_selection, BufferRef, ColumnData}, selection::SelectionVector, Vector, VectorData,
    VectorType, STANDARD_VECTOR_SIZE};

/*
    Copies rows [source_offset, source_count) of `source`, read through `selection`, into the
    flat `target` starting at `target_offset`. Strings that live in a heap are copied into the
    target's own heap so the result doesn't depend on the source staying alive.
 */
pub fn copy(source: &Vector, target: &mut Vector, selection: &SelectionVector, source_count: usize,
            source_offset: usize, target_offset: usize) -> Result<()> {
    if source_offset >= source_count {
        return Ok(());
    }
    if target.vector_type() != VectorType::Flat {
        return Err(ExecutionError::Representation(format!("copy into a {:?} vector", target.vector_type())));
    }
    debug_assert!(target_offset + (source_count - source_offset) <= STANDARD_VECTOR_SIZE);
    match source.vector_data() {
        VectorData::Dictionary { selection: dictionary, child } => {
            let composed = dictionary_selection(dictionary)?.slice(selection, source_count);
            copy(child, target, &composed, source_count, source_offset, target_offset)
        },
        VectorData::Sequence { .. } => {
            let mut flat = Vector::new_reference(source);
            flat.normalify(selection.required_count(source_count))?;
            copy(&flat, target, selection, source_count, source_offset, target_offset)
        },
        VectorData::Constant(buffer) => {
            let pairs = (source_offset..source_count).map(|i| (0, target_offset + i - source_offset));
            copy_physical(source, buffer, target, pairs)
        },
        VectorData::Flat(buffer) => {
            let pairs = (source_offset..source_count).map(|i| (selection.get_index(i), target_offset + i - source_offset));
            copy_physical(source, buffer, target, pairs)
        },
    }
}

// Copies a single logical row of any representation into a flat target
pub fn copy_entry(source: &Vector, source_idx: usize, target: &mut Vector, target_idx: usize) -> Result<()> {
    match source.vector_data() {
        VectorData::Dictionary { selection, child } => {
            let index = dictionary_selection(selection)?.get_index(source_idx);
            copy_entry(child, index, target, target_idx)
        },
        VectorData::Sequence { .. } => target.set_value(target_idx, &source.get_value(source_idx)?),
        VectorData::Constant(buffer) => copy_physical(source, buffer, target, std::iter::once((0, target_idx))),
        VectorData::Flat(buffer) => copy_physical(source, buffer, target, std::iter::once((source_idx, target_idx))),
    }
}

// `pairs` are (physical source slot, target row)
fn copy_physical(source: &Vector, source_buffer: &BufferRef, target: &mut Vector,
                 pairs: impl Iterator<Item = (usize, usize)>) -> Result<()> {
    let target_buffer = target.buffer()?.clone();
    if Rc::ptr_eq(source_buffer, &target_buffer) {
        return Err(ExecutionError::Representation("copy source and target share one buffer".to_string()));
    }
    if source.logical_type().is_nested() {
        for (source_idx, target_idx) in pairs {
            let value = source.get_value(source_idx)?;
            target.set_value(target_idx, &value)?;
        }
        return Ok(());
    }
    let shares_heap = match (source.auxiliary(), target.auxiliary()) {
        (Some(source_heap), Some(target_heap)) => Rc::ptr_eq(source_heap, target_heap),
        _ => false,
    };
    let source_ref = source_buffer.borrow();
    let source_data = source_ref.data()?;
    let mut target_ref = target_buffer.borrow_mut();
    let target_data = target_ref.data_mut()?;
    for (source_idx, target_idx) in pairs {
        let is_null = source.nullmask().get(source_idx);
        target.nullmask_mut().set(target_idx, is_null);
        if is_null {
            continue;
        }
        match (source_data, &mut *target_data) {
            (ColumnData::Varchar(strings), ColumnData::Varchar(targets)) if !shares_heap && !strings[source_idx].is_inlined() => {
                targets[target_idx] = target.add_string(strings[source_idx].as_bytes())?;
            },
            (source_data, target_data) => target_data.copy_slot(target_idx, source_data, source_idx)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::types::{LogicalType, Value};

    use super::*;

    fn varchars(values: &[Option<&str>]) -> Vector {
        let mut vector = Vector::new(LogicalType::Varchar);
        for (i, value) in values.iter().enumerate() {
            let value = value.map(Value::varchar).unwrap_or(Value::Null(LogicalType::Varchar));
            vector.set_value(i, &value).unwrap();
        }
        vector
    }

    #[test]
    fn test_copy_rehomes_strings() {
        let long = "this string lives in the source heap";
        let source = varchars(&[Some("a"), None, Some(long)]);
        let mut target = Vector::new(LogicalType::Varchar);
        copy(&source, &mut target, &SelectionVector::incremental(), 3, 0, 5).unwrap();
        drop(source);
        assert_eq!(target.get_value(5).unwrap(), Value::varchar("a"));
        assert!(target.is_null(6).unwrap());
        assert_eq!(target.get_value(7).unwrap(), Value::varchar(long));
        assert!(!target.is_null(0).unwrap());
    }

    #[test]
    fn test_copy_with_offset_and_selection() {
        let mut source = Vector::new(LogicalType::BigInt);
        for i in 0..6 {
            source.set_value(i, &Value::BigInt(i as i64 * 10)).unwrap();
        }
        let mut sliced = Vector::new(LogicalType::BigInt);
        sliced.slice_other(&source, &SelectionVector::from_vec(vec![5, 4, 3, 2]), 4).unwrap();
        let mut target = Vector::new(LogicalType::BigInt);
        copy(&sliced, &mut target, &SelectionVector::from_vec(vec![0, 1, 2, 3]), 4, 2, 0).unwrap();
        assert_eq!(target.get_value(0).unwrap(), Value::BigInt(30));
        assert_eq!(target.get_value(1).unwrap(), Value::BigInt(20));
    }

    #[test]
    fn test_copy_constant_and_sequence() {
        let constant = Vector::from_value(&Value::Double(2.5)).unwrap();
        let mut target = Vector::new(LogicalType::Double);
        copy(&constant, &mut target, &SelectionVector::incremental(), 3, 0, 0).unwrap();
        assert_eq!(target.get_value(2).unwrap(), Value::Double(2.5));

        let sequence = Vector::sequence(LogicalType::Integer, 1, 1);
        let mut target = Vector::new(LogicalType::Integer);
        copy(&sequence, &mut target, &SelectionVector::from_vec(vec![9, 0]), 2, 0, 0).unwrap();
        assert_eq!(target.get_value(0).unwrap(), Value::Integer(10));
        assert_eq!(target.get_value(1).unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_copy_rejects_non_flat_target() {
        let source = varchars(&[Some("a")]);
        let mut target = Vector::from_value(&Value::varchar("b")).unwrap();
        assert!(copy(&source, &mut target, &SelectionVector::incremental(), 1, 0, 0).is_err());
        let mut alias = Vector::new_reference(&source);
        assert!(copy(&source, &mut alias, &SelectionVector::incremental(), 1, 0, 0).is_err());
    }

    #[test]
    fn test_copy_entry_nested() {
        let value = Value::Struct(vec![("x".to_string(), Value::Integer(1))]);
        let source = Vector::from_value(&value).unwrap();
        let mut target = Vector::new(value.logical_type());
        copy_entry(&source, 17, &mut target, 3).unwrap();
        assert_eq!(target.get_value(3).unwrap(), value);
    }
}
