use std::rc::Rc;

use once_cell::sync::Lazy;

use super::{SelT, STANDARD_VECTOR_SIZE};

static INCREMENTAL_SELECTION: Lazy<Vec<SelT>> = Lazy::new(|| (0..STANDARD_VECTOR_SIZE as SelT).collect());
static ZERO_SELECTION: Lazy<Vec<SelT>> = Lazy::new(|| vec![0; STANDARD_VECTOR_SIZE]);

/*
    Maps logical row positions to physical slots of a buffer. The incremental (identity) and the
    zero (broadcast) selections are process wide and only ever borrowed. Everything else owns its
    entries behind an Rc so that all columns sliced by one filter can share one mapping.
    Writing into a shared or borrowed selection copies it first.
 */
#[derive(Debug, Clone)]
pub enum SelectionVector {
    Borrowed(&'static [SelT]),
    Owned(Rc<Vec<SelT>>),
}

impl SelectionVector {
    pub fn new() -> Self {
        Self::with_capacity(STANDARD_VECTOR_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SelectionVector::Owned(Rc::new(vec![0; capacity]))
    }

    pub fn from_vec(entries: Vec<SelT>) -> Self {
        SelectionVector::Owned(Rc::new(entries))
    }

    pub fn incremental() -> Self {
        SelectionVector::Borrowed(INCREMENTAL_SELECTION.as_slice())
    }

    pub fn zero() -> Self {
        SelectionVector::Borrowed(ZERO_SELECTION.as_slice())
    }

    // [offset, offset + 1, ...] up to the end of a standard vector
    pub fn offset(offset: usize) -> Self {
        debug_assert!(offset <= STANDARD_VECTOR_SIZE);
        SelectionVector::from_vec((offset as SelT..STANDARD_VECTOR_SIZE as SelT).collect())
    }

    pub fn data(&self) -> &[SelT] {
        match self {
            SelectionVector::Borrowed(entries) => entries,
            SelectionVector::Owned(entries) => entries.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    // Address of the backing entries, identifies selections that share storage
    pub fn data_id(&self) -> usize {
        self.data().as_ptr() as usize
    }

    pub fn is_incremental(&self) -> bool {
        matches!(self, SelectionVector::Borrowed(entries) if entries.as_ptr() == INCREMENTAL_SELECTION.as_ptr())
    }

    #[inline]
    pub fn get_index(&self, idx: usize) -> usize {
        self.data()[idx] as usize
    }

    #[inline]
    pub fn set_index(&mut self, idx: usize, loc: usize) {
        debug_assert!(loc <= SelT::MAX as usize);
        self.data_mut()[idx] = loc as SelT;
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        self.data_mut().swap(i, j);
    }

    fn data_mut(&mut self) -> &mut Vec<SelT> {
        if let SelectionVector::Borrowed(entries) = self {
            *self = SelectionVector::Owned(Rc::new(entries.to_vec()));
        }
        match self {
            SelectionVector::Owned(entries) => Rc::make_mut(entries),
            SelectionVector::Borrowed(_) => unreachable!(),
        }
    }

    /*
        Composition used when stacking filters: result[i] = self[other[i]].
        `self` is the existing mapping, `other` selects from its logical rows.
     */
    pub fn slice(&self, other: &SelectionVector, count: usize) -> SelectionVector {
        let entries = self.data();
        SelectionVector::from_vec((0..count).map(|i| entries[other.get_index(i)]).collect())
    }

    // Largest physical index referenced by the first `count` entries, plus one
    pub fn required_count(&self, count: usize) -> usize {
        self.data()[..count].iter().map(|idx| *idx as usize + 1).max().unwrap_or(0)
    }
}

impl Default for SelectionVector {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SelectionVector {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}
