use std::{fmt::Debug, ptr};

use super::buffer::BufferRef;

pub const STRING_PREFIX_LENGTH: usize = 4;
// Strings up to this length live entirely inside the descriptor
pub const STRING_INLINE_LENGTH: usize = 12;

const MINIMUM_CHUNK_SIZE: usize = 4096;
const MAXIMUM_CHUNK_GROWTH: usize = 1 << 20;

#[repr(C)]
#[derive(Clone, Copy)]
union StringPayload {
    inlined: [u8; 8],
    ptr: *const u8,
}

/*
    16 byte string descriptor: 4 byte length, 4 byte prefix and then either the remaining 8 bytes
    of an inlined string or a pointer into a string heap. For inlined strings prefix and payload
    form one contiguous 12 byte region.
    A descriptor does not own its bytes. Non inlined descriptors are only valid as long as the
    heap that produced them (or a heap that merged or references it) is alive, so they are only
    handed out together with a handle to that heap.
 */
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StringT {
    length: u32,
    prefix: [u8; STRING_PREFIX_LENGTH],
    value: StringPayload,
}

const _: () = assert!(std::mem::size_of::<StringT>() == 16);

impl StringT {
    pub fn empty() -> Self {
        StringT { length: 0, prefix: [0; STRING_PREFIX_LENGTH], value: StringPayload { inlined: [0; 8] } }
    }

    pub fn inlined(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= STRING_INLINE_LENGTH);
        let mut inline_bytes = [0u8; STRING_INLINE_LENGTH];
        inline_bytes[..bytes.len()].copy_from_slice(bytes);
        let mut prefix = [0u8; STRING_PREFIX_LENGTH];
        prefix.copy_from_slice(&inline_bytes[..STRING_PREFIX_LENGTH]);
        let mut inlined = [0u8; 8];
        inlined.copy_from_slice(&inline_bytes[STRING_PREFIX_LENGTH..]);
        StringT { length: bytes.len() as u32, prefix, value: StringPayload { inlined } }
    }

    // Safety: `data` must point to `length` initialized bytes that stay put for the lifetime of
    // every copy of the descriptor.
    unsafe fn pointing_to(data: *const u8, length: usize) -> Self {
        let mut prefix = [0u8; STRING_PREFIX_LENGTH];
        ptr::copy_nonoverlapping(data, prefix.as_mut_ptr(), STRING_PREFIX_LENGTH.min(length));
        StringT { length: length as u32, prefix, value: StringPayload { ptr: data } }
    }

    pub fn size(&self) -> usize {
        self.length as usize
    }

    pub fn is_inlined(&self) -> bool {
        self.size() <= STRING_INLINE_LENGTH
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix[..STRING_PREFIX_LENGTH.min(self.size())]
    }

    // Only sound while the heap behind the descriptor is alive, callers go through the owning vector
    pub(crate) fn as_bytes(&self) -> &[u8] {
        if self.is_inlined() {
            // prefix and inlined payload are adjacent in the repr(C) layout
            unsafe {
                let start = (self as *const StringT as *const u8).add(STRING_PREFIX_LENGTH);
                std::slice::from_raw_parts(start, self.size())
            }
        } else {
            unsafe { std::slice::from_raw_parts(self.value.ptr, self.size()) }
        }
    }

    pub(crate) fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl PartialEq for StringT {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.prefix == other.prefix && self.as_bytes() == other.as_bytes()
    }
}

impl Debug for StringT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StringT({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl Default for StringT {
    fn default() -> Self {
        StringT::empty()
    }
}

// Raw allocation so that descriptors can point into it while new strings are written behind them
struct HeapChunk {
    data: *mut u8,
    capacity: usize,
    position: usize,
}

impl HeapChunk {
    fn new(capacity: usize) -> Self {
        let data = Box::into_raw(vec![0u8; capacity].into_boxed_slice()) as *mut u8;
        HeapChunk { data, capacity, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.capacity - self.position
    }
}

impl Drop for HeapChunk {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(ptr::slice_from_raw_parts_mut(self.data, self.capacity))) };
    }
}

/*
    Append only byte arena for strings that don't fit into a descriptor. Chunks are never moved
    or freed before the heap itself, new chunks grow geometrically.
 */
pub struct StringHeap {
    chunks: Vec<HeapChunk>,
    minimum_chunk_size: usize,
}

impl StringHeap {
    pub fn new() -> Self {
        Self::with_minimum_chunk_size(MINIMUM_CHUNK_SIZE)
    }

    pub fn with_minimum_chunk_size(minimum_chunk_size: usize) -> Self {
        StringHeap { chunks: Vec::new(), minimum_chunk_size: minimum_chunk_size.max(1) }
    }

    pub(crate) fn add_string(&mut self, bytes: &[u8]) -> StringT {
        if bytes.len() <= STRING_INLINE_LENGTH {
            return StringT::inlined(bytes);
        }
        let target = self.allocate(bytes.len());
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), target, bytes.len());
            StringT::pointing_to(target, bytes.len())
        }
    }

    fn allocate(&mut self, len: usize) -> *mut u8 {
        let fits = self.chunks.last().map_or(false, |chunk| chunk.remaining() >= len);
        if !fits {
            let last_capacity = self.chunks.last().map_or(0, |chunk| chunk.capacity);
            let capacity = self.minimum_chunk_size
                .max((last_capacity * 2).min(MAXIMUM_CHUNK_GROWTH))
                .max(len);
            self.chunks.push(HeapChunk::new(capacity));
        }
        let chunk = match self.chunks.last_mut() {
            Some(chunk) => chunk,
            None => unreachable!("a chunk was pushed above"),
        };
        let target = unsafe { chunk.data.add(chunk.position) };
        chunk.position += len;
        target
    }

    // Takes over all chunks of `other`, keeps appending into our own current chunk
    pub fn merge_heap(&mut self, other: StringHeap) {
        let current = self.chunks.pop();
        self.chunks.extend(other.chunks);
        self.chunks.extend(current);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.position).sum()
    }
}

impl Default for StringHeap {
    fn default() -> Self {
        StringHeap::new()
    }
}

impl Debug for StringHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringHeap")
            .field("chunks", &self.chunks.len())
            .field("allocated_bytes", &self.allocated_bytes())
            .finish()
    }
}

// Auxiliary buffer of a varchar vector: its own heap plus the heaps it borrows strings from
#[derive(Debug, Default)]
pub struct StringBuffer {
    pub heap: StringHeap,
    pub references: Vec<BufferRef>,
}

impl StringBuffer {
    pub fn new() -> Self {
        StringBuffer::default()
    }

    pub(crate) fn add_string(&mut self, bytes: &[u8]) -> StringT {
        self.heap.add_string(bytes)
    }

    pub fn add_heap_reference(&mut self, buffer: BufferRef) {
        if !self.references.iter().any(|existing| std::rc::Rc::ptr_eq(existing, &buffer)) {
            self.references.push(buffer);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_inlined() {
        let short = StringT::inlined(b"hello world!");
        assert!(short.is_inlined());
        assert_eq!(short.size(), 12);
        assert_eq!(short.as_bytes(), b"hello world!");
        assert_eq!(short.prefix(), b"hell");
        assert_eq!(StringT::inlined(b"ab").prefix(), b"ab");
        assert_eq!(StringT::empty().as_bytes(), b"");
    }

    #[test]
    fn test_heap_growth_keeps_descriptors_valid() {
        let mut heap = StringHeap::new();
        let first = heap.add_string(b"0123456789ABC");
        assert!(!first.is_inlined());
        assert_eq!(first.size(), 13);
        let big = vec![b'x'; 500];
        let second = heap.add_string(&big);
        assert_eq!(first.as_bytes(), b"0123456789ABC");
        assert_eq!(second.as_bytes(), big.as_slice());

        // Force a couple of new chunks
        let huge = vec![b'y'; 10_000];
        let third = heap.add_string(&huge);
        assert!(heap.chunk_count() >= 2);
        assert_eq!(first.to_string_lossy(), "0123456789ABC");
        assert_eq!(third.size(), 10_000);
    }

    #[test]
    fn test_geometric_growth() {
        let mut heap = StringHeap::with_minimum_chunk_size(16);
        for _ in 0..4 {
            heap.add_string(b"sixteen bytes!!!");
        }
        // 16, 32, 64 byte chunks hold the four strings
        assert_eq!(heap.chunk_count(), 3);
        assert_eq!(heap.allocated_bytes(), 64);
    }

    #[test]
    fn test_merge_heap() {
        let mut heap = StringHeap::new();
        let mut other = StringHeap::new();
        let borrowed = other.add_string(b"a string from another heap");
        let own = heap.add_string(b"a string from the own heap");
        heap.merge_heap(other);
        let appended = heap.add_string(b"appended after the merge");
        assert_eq!(heap.chunk_count(), 2);
        assert_eq!(borrowed.as_bytes(), b"a string from another heap");
        assert_eq!(own.as_bytes(), b"a string from the own heap");
        assert_eq!(appended.as_bytes(), b"appended after the merge");
    }
}
