/*
    Columnar vectors. A vector is a typed view over reference counted buffers in one of four
    representations (flat, constant, dictionary, sequence). Vectors never switch representation
    on their own, only `normalify` (to flat) and `slice`/`reference` change it.
    Operators that need plain indexed access either normalify the vector or orrify it, which
    yields a selection + buffer pair for every representation without touching the vector.
 */

use std::{cell::Ref, rc::Rc};

use ahash::AHashMap;
use itertools::Itertools;

use crate::{chunk::ChunkCollection, error::{ExecutionError, Result}, types::{LogicalType, Value}};

use self::{buffer::{dictionary_selection, BufferRef, ColumnData, ListEntry, VectorBuffer},
    nullmask::NullMask, selection::SelectionVector, string_heap::{StringT, STRING_INLINE_LENGTH}};

pub mod buffer;
pub mod nullmask;
pub mod operations;
pub mod selection;
pub mod string_heap;

pub const STANDARD_VECTOR_SIZE: usize = 1024;
const _: () = assert!(STANDARD_VECTOR_SIZE.is_power_of_two() && STANDARD_VECTOR_SIZE % 64 == 0);

pub type SelT = u32;

// Composed dictionary selections keyed by the selection they were composed from
pub type SelectionCache = AHashMap<usize, BufferRef>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorType {
    Flat,
    Constant,
    Dictionary,
    Sequence,
}

#[derive(Debug)]
pub enum VectorData {
    Flat(BufferRef),
    // Single slot buffer, its NULL state is bit 0 of the null mask
    Constant(BufferRef),
    // `selection` is a dictionary buffer mapping our rows to rows of `child`
    Dictionary { selection: BufferRef, child: Box<Vector> },
    Sequence { start: i64, increment: i64 },
}

impl VectorData {
    fn new_reference(&self) -> VectorData {
        match self {
            VectorData::Flat(buffer) => VectorData::Flat(buffer.clone()),
            VectorData::Constant(buffer) => VectorData::Constant(buffer.clone()),
            VectorData::Dictionary { selection, child } => VectorData::Dictionary {
                selection: selection.clone(),
                child: Box::new(Vector::new_reference(child)),
            },
            VectorData::Sequence { start, increment } => VectorData::Sequence { start: *start, increment: *increment },
        }
    }
}

#[derive(Debug)]
pub struct Vector {
    logical_type: LogicalType,
    data: VectorData,
    nullmask: NullMask,
    // String heap, struct children or list payload, depending on the type
    auxiliary: Option<BufferRef>,
}

// Read only projection of any vector onto a standard buffer
pub struct VectorView {
    pub selection: SelectionVector,
    pub(crate) data: BufferRef,
    pub nullmask: NullMask,
    pub(crate) auxiliary: Option<BufferRef>,
}

impl VectorView {
    #[inline]
    pub fn index(&self, idx: usize) -> usize {
        self.selection.get_index(idx)
    }

    #[inline]
    pub fn is_null(&self, idx: usize) -> bool {
        self.nullmask.get(self.index(idx))
    }
}

impl Vector {
    pub fn new(logical_type: LogicalType) -> Vector {
        let data = VectorBuffer::create_standard(&logical_type);
        let auxiliary = Vector::create_auxiliary(&logical_type, false);
        Vector { logical_type, data: VectorData::Flat(data), nullmask: NullMask::zero(), auxiliary }
    }

    /*
        Flat vector over an existing standard buffer, with no NULLs and a fresh auxiliary buffer.
        Strings left in the buffer point into the previous heap, so they are blanked.
     */
    pub(crate) fn with_buffer(logical_type: LogicalType, data: BufferRef) -> Vector {
        if let Ok(ColumnData::Varchar(strings)) = data.borrow_mut().data_mut() {
            strings.fill(StringT::empty());
        }
        let auxiliary = Vector::create_auxiliary(&logical_type, false);
        Vector { logical_type, data: VectorData::Flat(data), nullmask: NullMask::zero(), auxiliary }
    }

    fn new_constant(logical_type: LogicalType) -> Vector {
        let data = VectorBuffer::create_constant(&logical_type);
        let auxiliary = Vector::create_auxiliary(&logical_type, true);
        Vector { logical_type, data: VectorData::Constant(data), nullmask: NullMask::zero(), auxiliary }
    }

    // Varchar vectors get their heap right away, every reference has to share the same one
    fn create_auxiliary(logical_type: &LogicalType, constant: bool) -> Option<BufferRef> {
        match logical_type {
            LogicalType::Struct(children) => {
                let children = children.iter()
                    .map(|(name, child_type)| {
                        let child = if constant {
                            Vector::new_constant(child_type.clone())
                        } else {
                            Vector::new(child_type.clone())
                        };
                        (name.clone(), child)
                    })
                    .collect();
                Some(VectorBuffer::create_struct(children))
            },
            LogicalType::List(child_type) => Some(VectorBuffer::create_list(child_type)),
            LogicalType::Varchar => Some(VectorBuffer::create_string()),
            _ => None,
        }
    }

    pub fn from_value(value: &Value) -> Result<Vector> {
        let mut vector = Vector::new_constant(value.logical_type());
        vector.set_value(0, value)?;
        Ok(vector)
    }

    pub fn sequence(logical_type: LogicalType, start: i64, increment: i64) -> Vector {
        debug_assert!(logical_type.is_integral() || matches!(logical_type, LogicalType::Hash | LogicalType::Pointer));
        Vector {
            logical_type,
            data: VectorData::Sequence { start, increment },
            nullmask: NullMask::zero(),
            auxiliary: None,
        }
    }

    // Aliasing view sharing all buffers of `other`
    pub fn new_reference(other: &Vector) -> Vector {
        Vector {
            logical_type: other.logical_type.clone(),
            data: other.data.new_reference(),
            nullmask: other.nullmask.clone(),
            auxiliary: other.auxiliary.clone(),
        }
    }

    pub fn reference(&mut self, other: &Vector) {
        *self = Vector::new_reference(other);
    }

    // Turns this vector into a constant vector holding `value` cast to our type
    pub fn reference_value(&mut self, value: &Value) -> Result<()> {
        let value = value.cast_as(&self.logical_type)?;
        *self = Vector::from_value(&value)?;
        Ok(())
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    pub fn vector_type(&self) -> VectorType {
        match self.data {
            VectorData::Flat(_) => VectorType::Flat,
            VectorData::Constant(_) => VectorType::Constant,
            VectorData::Dictionary { .. } => VectorType::Dictionary,
            VectorData::Sequence { .. } => VectorType::Sequence,
        }
    }

    pub(crate) fn vector_data(&self) -> &VectorData {
        &self.data
    }

    pub fn nullmask(&self) -> &NullMask {
        &self.nullmask
    }

    pub fn nullmask_mut(&mut self) -> &mut NullMask {
        &mut self.nullmask
    }

    pub(crate) fn auxiliary(&self) -> Option<&BufferRef> {
        self.auxiliary.as_ref()
    }

    // Standard buffer of a flat or constant vector
    pub(crate) fn buffer(&self) -> Result<&BufferRef> {
        match &self.data {
            VectorData::Flat(buffer) | VectorData::Constant(buffer) => Ok(buffer),
            _ => Err(ExecutionError::Representation(format!("{:?} vector has no standard buffer", self.vector_type()))),
        }
    }

    /*
        Makes this vector a dictionary over its previous self. Constants stay constant, an
        existing dictionary gets its selection composed instead of stacking another level.
     */
    pub fn slice(&mut self, selection: &SelectionVector, count: usize) -> Result<()> {
        if let VectorData::Constant(_) = self.data {
            return Ok(());
        }
        if let VectorData::Dictionary { selection: current, .. } = &mut self.data {
            let composed = dictionary_selection(current)?.slice(selection, count);
            *current = VectorBuffer::create_dictionary(composed);
            return Ok(());
        }
        let child = Vector {
            logical_type: self.logical_type.clone(),
            data: std::mem::replace(&mut self.data, VectorData::Sequence { start: 0, increment: 0 }),
            nullmask: std::mem::take(&mut self.nullmask),
            auxiliary: self.auxiliary.take(),
        };
        self.data = VectorData::Dictionary {
            selection: VectorBuffer::create_dictionary(selection.clone()),
            child: Box::new(child),
        };
        Ok(())
    }

    // Like `slice`, but dictionaries sharing one selection end up sharing one composed selection
    pub fn slice_with_cache(&mut self, selection: &SelectionVector, count: usize, cache: &mut SelectionCache) -> Result<()> {
        if let VectorData::Dictionary { selection: current, .. } = &mut self.data {
            let current_selection = dictionary_selection(current)?;
            let composed = cache.entry(current_selection.data_id())
                .or_insert_with(|| VectorBuffer::create_dictionary(current_selection.slice(selection, count)))
                .clone();
            *current = composed;
            Ok(())
        } else {
            self.slice(selection, count)
        }
    }

    pub fn slice_other(&mut self, other: &Vector, selection: &SelectionVector, count: usize) -> Result<()> {
        self.reference(other);
        self.slice(selection, count)
    }

    // View of `other` starting at row `offset`
    pub fn slice_offset(&mut self, other: &Vector, offset: usize) -> Result<()> {
        if offset == 0 || other.vector_type() == VectorType::Constant {
            self.reference(other);
            return Ok(());
        }
        self.slice_other(other, &SelectionVector::offset(offset), STANDARD_VECTOR_SIZE - offset)
    }

    pub fn normalify(&mut self, count: usize) -> Result<()> {
        debug_assert!(count <= STANDARD_VECTOR_SIZE);
        match &self.data {
            VectorData::Flat(_) => Ok(()),
            &VectorData::Sequence { start, increment } => {
                let buffer = VectorBuffer::create_standard(&self.logical_type);
                buffer.borrow_mut().data_mut()?.fill_sequence(start, increment, count)?;
                self.data = VectorData::Flat(buffer);
                self.nullmask = NullMask::zero();
                Ok(())
            },
            VectorData::Constant(_) | VectorData::Dictionary { .. } => {
                let view = self.orrify(count)?;
                *self = Vector::flatten(&self.logical_type, &view, count)?;
                Ok(())
            },
        }
    }

    // Gathers the rows of a view into a new flat vector. Strings stay in their heap, the new
    // vector only keeps a reference to it.
    fn flatten(logical_type: &LogicalType, view: &VectorView, count: usize) -> Result<Vector> {
        let mut nullmask = NullMask::zero();
        if view.nullmask.any() {
            for i in 0..count {
                nullmask.set(i, view.is_null(i));
            }
        }
        let data = VectorBuffer::create_standard(logical_type);
        let auxiliary = match logical_type {
            LogicalType::Struct(_) => {
                let auxiliary = required_auxiliary(&view.auxiliary)?;
                let auxiliary = auxiliary.borrow();
                let mut children = Vec::new();
                for (name, child) in &auxiliary.struct_buffer()?.children {
                    let mut child = Vector::new_reference(child);
                    child.slice(&view.selection, count)?;
                    child.normalify(count)?;
                    children.push((name.clone(), child));
                }
                Some(VectorBuffer::create_struct(children))
            },
            _ => {
                {
                    let source = view.data.borrow();
                    let source = source.data()?;
                    let mut target = data.borrow_mut();
                    let target = target.data_mut()?;
                    for i in 0..count {
                        target.copy_slot(i, source, view.index(i))?;
                    }
                }
                match (logical_type, &view.auxiliary) {
                    (LogicalType::Varchar, Some(heap)) => {
                        let auxiliary = VectorBuffer::create_string();
                        auxiliary.borrow_mut().string_buffer_mut()?.add_heap_reference(heap.clone());
                        Some(auxiliary)
                    },
                    (LogicalType::List(_), auxiliary) => auxiliary.clone(),
                    _ => None,
                }
            },
        };
        Ok(Vector { logical_type: logical_type.clone(), data: VectorData::Flat(data), nullmask, auxiliary })
    }

    pub fn orrify(&self, count: usize) -> Result<VectorView> {
        match &self.data {
            VectorData::Flat(buffer) => Ok(VectorView {
                selection: SelectionVector::incremental(),
                data: buffer.clone(),
                nullmask: self.nullmask.clone(),
                auxiliary: self.auxiliary.clone(),
            }),
            VectorData::Constant(buffer) => Ok(VectorView {
                selection: SelectionVector::zero(),
                data: buffer.clone(),
                nullmask: self.nullmask.clone(),
                auxiliary: self.auxiliary.clone(),
            }),
            VectorData::Dictionary { selection, child } => {
                let dictionary = dictionary_selection(selection)?;
                let child_view = child.orrify(dictionary.required_count(count))?;
                let selection = if child_view.selection.is_incremental() {
                    dictionary
                } else {
                    child_view.selection.slice(&dictionary, count)
                };
                Ok(VectorView { selection, ..child_view })
            },
            VectorData::Sequence { start, increment } => {
                let buffer = VectorBuffer::create_standard(&self.logical_type);
                buffer.borrow_mut().data_mut()?.fill_sequence(*start, *increment, count)?;
                Ok(VectorView {
                    selection: SelectionVector::incremental(),
                    data: buffer,
                    nullmask: NullMask::zero(),
                    auxiliary: None,
                })
            },
        }
    }

    pub fn get_value(&self, idx: usize) -> Result<Value> {
        match &self.data {
            VectorData::Flat(buffer) => self.get_physical(buffer, idx),
            VectorData::Constant(buffer) => self.get_physical(buffer, 0),
            VectorData::Dictionary { selection, child } => {
                let index = dictionary_selection(selection)?.get_index(idx);
                child.get_value(index)
            },
            VectorData::Sequence { start, increment } => {
                Value::integral(&self.logical_type, start.wrapping_add(increment.wrapping_mul(idx as i64)))
            },
        }
    }

    fn get_physical(&self, buffer: &BufferRef, idx: usize) -> Result<Value> {
        if self.nullmask.get(idx) {
            return Ok(Value::Null(self.logical_type.clone()));
        }
        let buffer = buffer.borrow();
        let data = buffer.data()?;
        if let Some(value) = data.get_primitive(idx) {
            return Ok(value);
        }
        match (data, &self.logical_type) {
            (ColumnData::Varchar(strings), _) => Ok(Value::Varchar(strings[idx].to_string_lossy())),
            (ColumnData::List(entries), LogicalType::List(child_type)) => {
                let entry = entries[idx];
                let auxiliary = required_auxiliary(&self.auxiliary)?.borrow();
                let list = auxiliary.list_buffer()?;
                let values = (entry.offset..entry.offset + entry.length)
                    .map(|row| list.child.get_value(0, row as usize))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List((**child_type).clone(), values))
            },
            (ColumnData::Struct, _) => {
                let auxiliary = required_auxiliary(&self.auxiliary)?.borrow();
                let children = auxiliary.struct_buffer()?.children.iter()
                    .map(|(name, child)| Ok((name.clone(), child.get_value(idx)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Struct(children))
            },
            (data, logical_type) => Err(ExecutionError::Representation(
                format!("{} buffer in a {} vector", data.type_name(), logical_type)
            )),
        }
    }

    // Only flat vectors (and slot 0 of constants) can be written
    pub fn set_value(&mut self, idx: usize, value: &Value) -> Result<()> {
        let buffer = match &self.data {
            VectorData::Flat(buffer) => buffer.clone(),
            VectorData::Constant(buffer) if idx == 0 => buffer.clone(),
            _ => {
                return Err(ExecutionError::Representation(format!("cannot write into a {:?} vector", self.vector_type())));
            },
        };
        if value.is_null() {
            self.nullmask.set(idx, true);
            if let Some(auxiliary) = &self.auxiliary {
                if let VectorBuffer::Struct(children) = &mut *auxiliary.borrow_mut() {
                    for (_, child) in children.children.iter_mut() {
                        let null = Value::Null(child.logical_type.clone());
                        child.set_value(idx, &null)?;
                    }
                }
            }
            return Ok(());
        }
        let value = value.cast_as(&self.logical_type)?;
        self.nullmask.set(idx, false);
        match &value {
            Value::Varchar(string) => {
                let string = self.add_string(string.as_bytes())?;
                match buffer.borrow_mut().data_mut()? {
                    ColumnData::Varchar(strings) => strings[idx] = string,
                    other => {
                        return Err(ExecutionError::Representation(format!("string in a {} buffer", other.type_name())));
                    },
                }
            },
            Value::Struct(values) => {
                let auxiliary = required_auxiliary(&self.auxiliary)?;
                let mut auxiliary = auxiliary.borrow_mut();
                let children = &mut auxiliary.struct_buffer_mut()?.children;
                for ((_, child), (_, child_value)) in children.iter_mut().zip(values) {
                    child.set_value(idx, child_value)?;
                }
            },
            Value::List(_, values) => {
                let entry = {
                    let auxiliary = required_auxiliary(&self.auxiliary)?;
                    let mut auxiliary = auxiliary.borrow_mut();
                    let list = auxiliary.list_buffer_mut()?;
                    let offset = list.child.count();
                    for child_value in values {
                        list.child.append_row(std::slice::from_ref(child_value))?;
                    }
                    ListEntry { offset: offset as u64, length: values.len() as u64 }
                };
                match buffer.borrow_mut().data_mut()? {
                    ColumnData::List(entries) => entries[idx] = entry,
                    other => {
                        return Err(ExecutionError::Representation(format!("list in a {} buffer", other.type_name())));
                    },
                }
            },
            primitive => buffer.borrow_mut().data_mut()?.set_primitive(idx, primitive)?,
        }
        Ok(())
    }

    pub fn is_null(&self, idx: usize) -> Result<bool> {
        match &self.data {
            VectorData::Flat(_) => Ok(self.nullmask.get(idx)),
            VectorData::Constant(_) => Ok(self.nullmask.get(0)),
            VectorData::Dictionary { selection, child } => {
                child.is_null(dictionary_selection(selection)?.get_index(idx))
            },
            VectorData::Sequence { .. } => Ok(false),
        }
    }

    pub fn set_null(&mut self, idx: usize, is_null: bool) {
        debug_assert!(matches!(self.data, VectorData::Flat(_) | VectorData::Constant(_)));
        let idx = if self.vector_type() == VectorType::Constant { 0 } else { idx };
        self.nullmask.set(idx, is_null);
    }

    // Stores `bytes` in this vector's own heap (unless short enough to be inlined)
    pub(crate) fn add_string(&mut self, bytes: &[u8]) -> Result<StringT> {
        if bytes.len() <= STRING_INLINE_LENGTH {
            return Ok(StringT::inlined(bytes));
        }
        let auxiliary = self.auxiliary.get_or_insert_with(VectorBuffer::create_string);
        let mut auxiliary = auxiliary.borrow_mut();
        Ok(auxiliary.string_buffer_mut()?.add_string(bytes))
    }

    // Keeps the string heap of `other` alive for as long as this vector's heap lives
    pub fn add_heap_reference(&mut self, other: &Vector) -> Result<()> {
        let heap = match other.string_auxiliary() {
            Some(heap) => heap,
            None => return Ok(()),
        };
        let auxiliary = self.auxiliary.get_or_insert_with(VectorBuffer::create_string);
        if Rc::ptr_eq(auxiliary, &heap) {
            return Ok(());
        }
        auxiliary.borrow_mut().string_buffer_mut()?.add_heap_reference(heap);
        Ok(())
    }

    fn string_auxiliary(&self) -> Option<BufferRef> {
        match &self.data {
            VectorData::Dictionary { child, .. } => child.string_auxiliary(),
            _ => self.auxiliary.clone(),
        }
    }

    // Child vectors of a flat or constant struct vector, as references
    pub fn struct_children(&self) -> Result<Vec<(String, Vector)>> {
        self.buffer()?;
        let auxiliary = required_auxiliary(&self.auxiliary)?.borrow();
        Ok(auxiliary.struct_buffer()?.children.iter()
            .map(|(name, child)| (name.clone(), Vector::new_reference(child)))
            .collect())
    }

    pub fn list_entry(&self, idx: usize) -> Result<ListEntry> {
        let idx = if self.vector_type() == VectorType::Constant { 0 } else { idx };
        match self.buffer()?.borrow().data()? {
            ColumnData::List(entries) => Ok(entries[idx]),
            other => Err(ExecutionError::Representation(format!("expected list entries, found {}", other.type_name()))),
        }
    }

    // Flattened payload of all lists of a flat or constant list vector
    pub fn list_child(&self) -> Result<Ref<'_, ChunkCollection>> {
        let auxiliary = required_auxiliary(&self.auxiliary)?.borrow();
        Ref::filter_map(auxiliary, |buffer| buffer.list_buffer().ok().map(|list| &list.child))
            .map_err(|_| ExecutionError::Representation("list vector without list payload".to_string()))
    }

    pub fn verify(&self, count: usize) -> Result<()> {
        if count > STANDARD_VECTOR_SIZE {
            return Err(ExecutionError::CapacityExceeded { requested: count, capacity: STANDARD_VECTOR_SIZE });
        }
        match &self.data {
            VectorData::Flat(buffer) | VectorData::Constant(buffer) => {
                let count = if self.vector_type() == VectorType::Constant { count.min(1) } else { count };
                let buffer = buffer.borrow();
                let data = buffer.data()?;
                if !data.matches(&self.logical_type) {
                    return Err(ExecutionError::Representation(
                        format!("{} buffer in a {} vector", data.type_name(), self.logical_type)
                    ));
                }
                if data.capacity() < count {
                    return Err(ExecutionError::CapacityExceeded { requested: count, capacity: data.capacity() });
                }
                match data {
                    ColumnData::Varchar(strings) => {
                        for (i, string) in strings.iter().take(count).enumerate() {
                            if !self.nullmask.get(i) && std::str::from_utf8(string.as_bytes()).is_err() {
                                return Err(ExecutionError::Representation(format!("invalid UTF-8 string in row {}", i)));
                            }
                        }
                    },
                    ColumnData::List(entries) => {
                        let child_count = self.list_child()?.count() as u64;
                        for (i, entry) in entries.iter().take(count).enumerate() {
                            if !self.nullmask.get(i) && entry.offset + entry.length > child_count {
                                return Err(ExecutionError::Representation(format!("list entry {} out of range", i)));
                            }
                        }
                    },
                    ColumnData::Struct => {
                        for (_, child) in &required_auxiliary(&self.auxiliary)?.borrow().struct_buffer()?.children {
                            child.verify(count)?;
                        }
                    },
                    _ => {},
                }
                Ok(())
            },
            VectorData::Dictionary { selection, child } => {
                let selection = dictionary_selection(selection)?;
                if selection.len() < count {
                    return Err(ExecutionError::Representation(
                        format!("dictionary selection of {} entries used for {} rows", selection.len(), count)
                    ));
                }
                child.verify(selection.required_count(count))
            },
            VectorData::Sequence { .. } => {
                if self.logical_type.is_integral() || matches!(self.logical_type, LogicalType::Hash | LogicalType::Pointer) {
                    Ok(())
                } else {
                    Err(ExecutionError::Representation(format!("sequence vector of type {}", self.logical_type)))
                }
            },
        }
    }

    pub fn to_string(&self, count: usize) -> String {
        let values = (0..count)
            .map(|i| self.get_value(i).map(|v| v.to_string()).unwrap_or_else(|e| format!("<{}>", e)))
            .join(", ");
        format!("{:?} {}: {} = [ {} ]", self.vector_type(), self.logical_type, count, values)
    }
}

fn required_auxiliary(auxiliary: &Option<BufferRef>) -> Result<&BufferRef> {
    auxiliary.as_ref().ok_or_else(|| ExecutionError::Representation("missing auxiliary buffer".to_string()))
}
