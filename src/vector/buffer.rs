use std::{cell::RefCell, rc::Rc};

use crate::{chunk::ChunkCollection, error::{ExecutionError, Result}, types::{LogicalType, Value}};

use super::{selection::SelectionVector, string_heap::{StringBuffer, StringT}, Vector, STANDARD_VECTOR_SIZE};

pub type BufferRef = Rc<RefCell<VectorBuffer>>; // Only single threaded execution for now

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListEntry {
    pub offset: u64,
    pub length: u64,
}

// Typed slot storage of a standard buffer
#[derive(Debug)]
pub enum ColumnData {
    Boolean(Vec<bool>),
    TinyInt(Vec<i8>),
    SmallInt(Vec<i16>),
    Integer(Vec<i32>),
    BigInt(Vec<i64>),
    Hash(Vec<u64>),
    Pointer(Vec<usize>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Varchar(Vec<StringT>),
    List(Vec<ListEntry>),
    // Struct values live in the child vectors of the auxiliary buffer
    Struct,
}

macro_rules! with_column_data {
    ($data:expr, $values:ident => $body:expr, $nested:pat => $nested_body:expr) => {
        match $data {
            ColumnData::Boolean($values) => $body,
            ColumnData::TinyInt($values) => $body,
            ColumnData::SmallInt($values) => $body,
            ColumnData::Integer($values) => $body,
            ColumnData::BigInt($values) => $body,
            ColumnData::Hash($values) => $body,
            ColumnData::Pointer($values) => $body,
            ColumnData::Float($values) => $body,
            ColumnData::Double($values) => $body,
            ColumnData::Varchar($values) => $body,
            ColumnData::List($values) => $body,
            $nested => $nested_body,
        }
    };
}

impl ColumnData {
    pub fn new(logical_type: &LogicalType, capacity: usize) -> Self {
        match logical_type {
            LogicalType::Boolean => ColumnData::Boolean(vec![false; capacity]),
            LogicalType::TinyInt => ColumnData::TinyInt(vec![0; capacity]),
            LogicalType::SmallInt => ColumnData::SmallInt(vec![0; capacity]),
            LogicalType::Integer => ColumnData::Integer(vec![0; capacity]),
            LogicalType::BigInt => ColumnData::BigInt(vec![0; capacity]),
            LogicalType::Hash => ColumnData::Hash(vec![0; capacity]),
            LogicalType::Pointer => ColumnData::Pointer(vec![0; capacity]),
            LogicalType::Float => ColumnData::Float(vec![0.0; capacity]),
            LogicalType::Double => ColumnData::Double(vec![0.0; capacity]),
            LogicalType::Varchar => ColumnData::Varchar(vec![StringT::empty(); capacity]),
            LogicalType::List(_) => ColumnData::List(vec![ListEntry::default(); capacity]),
            LogicalType::Struct(_) => ColumnData::Struct,
        }
    }

    pub fn capacity(&self) -> usize {
        with_column_data!(self, values => values.len(), ColumnData::Struct => STANDARD_VECTOR_SIZE)
    }

    pub fn matches(&self, logical_type: &LogicalType) -> bool {
        matches!((self, logical_type),
            (ColumnData::Boolean(_), LogicalType::Boolean)
            | (ColumnData::TinyInt(_), LogicalType::TinyInt)
            | (ColumnData::SmallInt(_), LogicalType::SmallInt)
            | (ColumnData::Integer(_), LogicalType::Integer)
            | (ColumnData::BigInt(_), LogicalType::BigInt)
            | (ColumnData::Hash(_), LogicalType::Hash)
            | (ColumnData::Pointer(_), LogicalType::Pointer)
            | (ColumnData::Float(_), LogicalType::Float)
            | (ColumnData::Double(_), LogicalType::Double)
            | (ColumnData::Varchar(_), LogicalType::Varchar)
            | (ColumnData::List(_), LogicalType::List(_))
            | (ColumnData::Struct, LogicalType::Struct(_)))
    }

    // Copies one slot of the same physical type. Strings copy only the descriptor.
    pub fn copy_slot(&mut self, target_idx: usize, source: &ColumnData, source_idx: usize) -> Result<()> {
        match (self, source) {
            (ColumnData::Boolean(t), ColumnData::Boolean(s)) => t[target_idx] = s[source_idx],
            (ColumnData::TinyInt(t), ColumnData::TinyInt(s)) => t[target_idx] = s[source_idx],
            (ColumnData::SmallInt(t), ColumnData::SmallInt(s)) => t[target_idx] = s[source_idx],
            (ColumnData::Integer(t), ColumnData::Integer(s)) => t[target_idx] = s[source_idx],
            (ColumnData::BigInt(t), ColumnData::BigInt(s)) => t[target_idx] = s[source_idx],
            (ColumnData::Hash(t), ColumnData::Hash(s)) => t[target_idx] = s[source_idx],
            (ColumnData::Pointer(t), ColumnData::Pointer(s)) => t[target_idx] = s[source_idx],
            (ColumnData::Float(t), ColumnData::Float(s)) => t[target_idx] = s[source_idx],
            (ColumnData::Double(t), ColumnData::Double(s)) => t[target_idx] = s[source_idx],
            (ColumnData::Varchar(t), ColumnData::Varchar(s)) => t[target_idx] = s[source_idx],
            (ColumnData::List(t), ColumnData::List(s)) => t[target_idx] = s[source_idx],
            (ColumnData::Struct, ColumnData::Struct) => {},
            (target, source) => {
                return Err(ExecutionError::Representation(format!(
                    "cannot copy {} slot into {} buffer", source.type_name(), target.type_name()
                )));
            },
        }
        Ok(())
    }

    // Value of a primitive slot. Strings, lists and structs need their auxiliary data and
    // are resolved by the vector.
    pub fn get_primitive(&self, idx: usize) -> Option<Value> {
        Some(match self {
            ColumnData::Boolean(v) => Value::Boolean(v[idx]),
            ColumnData::TinyInt(v) => Value::TinyInt(v[idx]),
            ColumnData::SmallInt(v) => Value::SmallInt(v[idx]),
            ColumnData::Integer(v) => Value::Integer(v[idx]),
            ColumnData::BigInt(v) => Value::BigInt(v[idx]),
            ColumnData::Hash(v) => Value::Hash(v[idx]),
            ColumnData::Pointer(v) => Value::Pointer(v[idx]),
            ColumnData::Float(v) => Value::Float(v[idx]),
            ColumnData::Double(v) => Value::Double(v[idx]),
            ColumnData::Varchar(_) | ColumnData::List(_) | ColumnData::Struct => return None,
        })
    }

    // `value` must already have the buffer's type
    pub fn set_primitive(&mut self, idx: usize, value: &Value) -> Result<()> {
        match (self, value) {
            (ColumnData::Boolean(v), Value::Boolean(x)) => v[idx] = *x,
            (ColumnData::TinyInt(v), Value::TinyInt(x)) => v[idx] = *x,
            (ColumnData::SmallInt(v), Value::SmallInt(x)) => v[idx] = *x,
            (ColumnData::Integer(v), Value::Integer(x)) => v[idx] = *x,
            (ColumnData::BigInt(v), Value::BigInt(x)) => v[idx] = *x,
            (ColumnData::Hash(v), Value::Hash(x)) => v[idx] = *x,
            (ColumnData::Pointer(v), Value::Pointer(x)) => v[idx] = *x,
            (ColumnData::Float(v), Value::Float(x)) => v[idx] = *x,
            (ColumnData::Double(v), Value::Double(x)) => v[idx] = *x,
            (data, value) => {
                return Err(ExecutionError::Representation(format!(
                    "cannot store {} in a {} buffer", value.logical_type(), data.type_name()
                )));
            },
        }
        Ok(())
    }

    // Writes start + increment * i into the first `count` slots of an integral buffer. Fails like
    // Value::integral on the first entry that does not fit the slot type.
    pub fn fill_sequence(&mut self, start: i64, increment: i64, count: usize) -> Result<()> {
        macro_rules! fill {
            ($values:expr, $t:ty, $logical_type:expr) => {
                for (i, slot) in $values.iter_mut().take(count).enumerate() {
                    let value = start.wrapping_add(increment.wrapping_mul(i as i64));
                    *slot = <$t>::try_from(value).map_err(|_| ExecutionError::InvalidCast {
                        from: LogicalType::BigInt,
                        to: $logical_type,
                        value: value.to_string(),
                    })?;
                }
            };
        }
        match self {
            ColumnData::TinyInt(v) => fill!(v, i8, LogicalType::TinyInt),
            ColumnData::SmallInt(v) => fill!(v, i16, LogicalType::SmallInt),
            ColumnData::Integer(v) => fill!(v, i32, LogicalType::Integer),
            ColumnData::BigInt(v) => fill!(v, i64, LogicalType::BigInt),
            ColumnData::Hash(v) => fill!(v, u64, LogicalType::Hash),
            ColumnData::Pointer(v) => fill!(v, usize, LogicalType::Pointer),
            other => {
                return Err(ExecutionError::Representation(format!("sequence over {} buffer", other.type_name())));
            },
        }
        Ok(())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Boolean(_) => "BOOLEAN",
            ColumnData::TinyInt(_) => "TINYINT",
            ColumnData::SmallInt(_) => "SMALLINT",
            ColumnData::Integer(_) => "INTEGER",
            ColumnData::BigInt(_) => "BIGINT",
            ColumnData::Hash(_) => "HASH",
            ColumnData::Pointer(_) => "POINTER",
            ColumnData::Float(_) => "FLOAT",
            ColumnData::Double(_) => "DOUBLE",
            ColumnData::Varchar(_) => "VARCHAR",
            ColumnData::List(_) => "LIST",
            ColumnData::Struct => "STRUCT",
        }
    }
}

#[derive(Debug, Default)]
pub struct StructBuffer {
    pub children: Vec<(String, Vector)>,
}

#[derive(Debug)]
pub struct ListBuffer {
    // Flattened payload of all lists, rows are addressed by ListEntry offsets
    pub child: ChunkCollection,
}

/*
    The different kinds of buffers a vector can point at. Standard buffers own the typed slots,
    dictionary buffers only a selection over some other vector, the rest are auxiliary buffers
    for variable size or nested payloads.
 */
#[derive(Debug)]
pub enum VectorBuffer {
    Standard(ColumnData),
    Dictionary(SelectionVector),
    String(StringBuffer),
    Struct(StructBuffer),
    List(ListBuffer),
}

impl VectorBuffer {
    // One standard vector worth of slots. Slots always start out zeroed.
    pub fn create_standard(logical_type: &LogicalType) -> BufferRef {
        Self::create_with_capacity(logical_type, STANDARD_VECTOR_SIZE)
    }

    pub fn create_constant(logical_type: &LogicalType) -> BufferRef {
        Self::create_with_capacity(logical_type, 1)
    }

    pub fn create_with_capacity(logical_type: &LogicalType, capacity: usize) -> BufferRef {
        Rc::new(RefCell::new(VectorBuffer::Standard(ColumnData::new(logical_type, capacity))))
    }

    pub fn create_dictionary(selection: SelectionVector) -> BufferRef {
        Rc::new(RefCell::new(VectorBuffer::Dictionary(selection)))
    }

    pub fn create_string() -> BufferRef {
        Rc::new(RefCell::new(VectorBuffer::String(StringBuffer::new())))
    }

    pub fn create_struct(children: Vec<(String, Vector)>) -> BufferRef {
        Rc::new(RefCell::new(VectorBuffer::Struct(StructBuffer { children })))
    }

    pub fn create_list(child_type: &LogicalType) -> BufferRef {
        let mut child = ChunkCollection::new();
        child.set_types(vec![child_type.clone()]);
        Rc::new(RefCell::new(VectorBuffer::List(ListBuffer { child })))
    }

    pub fn data(&self) -> Result<&ColumnData> {
        match self {
            VectorBuffer::Standard(data) => Ok(data),
            other => Err(other.unexpected("standard")),
        }
    }

    pub fn data_mut(&mut self) -> Result<&mut ColumnData> {
        match self {
            VectorBuffer::Standard(data) => Ok(data),
            other => Err(other.unexpected("standard")),
        }
    }

    pub fn selection(&self) -> Result<&SelectionVector> {
        match self {
            VectorBuffer::Dictionary(selection) => Ok(selection),
            other => Err(other.unexpected("dictionary")),
        }
    }

    pub fn string_buffer_mut(&mut self) -> Result<&mut StringBuffer> {
        match self {
            VectorBuffer::String(buffer) => Ok(buffer),
            other => Err(other.unexpected("string")),
        }
    }

    pub fn struct_buffer(&self) -> Result<&StructBuffer> {
        match self {
            VectorBuffer::Struct(buffer) => Ok(buffer),
            other => Err(other.unexpected("struct")),
        }
    }

    pub fn struct_buffer_mut(&mut self) -> Result<&mut StructBuffer> {
        match self {
            VectorBuffer::Struct(buffer) => Ok(buffer),
            other => Err(other.unexpected("struct")),
        }
    }

    pub fn list_buffer(&self) -> Result<&ListBuffer> {
        match self {
            VectorBuffer::List(buffer) => Ok(buffer),
            other => Err(other.unexpected("list")),
        }
    }

    pub fn list_buffer_mut(&mut self) -> Result<&mut ListBuffer> {
        match self {
            VectorBuffer::List(buffer) => Ok(buffer),
            other => Err(other.unexpected("list")),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            VectorBuffer::Standard(_) => "standard",
            VectorBuffer::Dictionary(_) => "dictionary",
            VectorBuffer::String(_) => "string",
            VectorBuffer::Struct(_) => "struct",
            VectorBuffer::List(_) => "list",
        }
    }

    fn unexpected(&self, expected: &str) -> ExecutionError {
        ExecutionError::Representation(format!("expected a {} buffer, found a {} buffer", expected, self.kind()))
    }
}

// Dictionary buffers are never written after creation, so handing out a clone of the
// (shared) selection is enough
pub fn dictionary_selection(buffer: &BufferRef) -> Result<SelectionVector> {
    Ok(buffer.borrow().selection()?.clone())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_create_standard() {
        let buffer = VectorBuffer::create_standard(&LogicalType::Integer);
        let buffer = buffer.borrow();
        let data = buffer.data().unwrap();
        assert_eq!(data.capacity(), STANDARD_VECTOR_SIZE);
        assert!(data.matches(&LogicalType::Integer));
        assert_eq!(data.get_primitive(17), Some(Value::Integer(0)));
        assert!(buffer.selection().is_err());
    }

    #[test]
    fn test_copy_slot_type_checked() {
        let mut target = ColumnData::new(&LogicalType::BigInt, 4);
        let mut source = ColumnData::new(&LogicalType::BigInt, 4);
        source.set_primitive(2, &Value::BigInt(-7)).unwrap();
        target.copy_slot(0, &source, 2).unwrap();
        assert_eq!(target.get_primitive(0), Some(Value::BigInt(-7)));

        let other = ColumnData::new(&LogicalType::Double, 4);
        assert!(matches!(target.copy_slot(0, &other, 0), Err(ExecutionError::Representation(_))));
        assert!(target.set_primitive(0, &Value::Integer(1)).is_err());
    }

    #[test]
    fn test_fill_sequence() {
        let mut data = ColumnData::new(&LogicalType::SmallInt, 8);
        data.fill_sequence(10, -3, 5).unwrap();
        assert_eq!(data.get_primitive(4), Some(Value::SmallInt(-2)));
        assert_eq!(data.get_primitive(5), Some(Value::SmallInt(0)));
        assert!(ColumnData::new(&LogicalType::Double, 2).fill_sequence(0, 1, 2).is_err());
    }
}
