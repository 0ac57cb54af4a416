use std::sync::Arc;

use bitvec::prelude::*;
use once_cell::sync::Lazy;

use super::STANDARD_VECTOR_SIZE;

pub type NullBits = BitArray<[u64; STANDARD_VECTOR_SIZE / 64], Lsb0>;

static ZERO_MASK: Lazy<NullMask> = Lazy::new(|| NullMask(Arc::new(BitArray::ZERO)));

/*
    One bit per slot of a standard vector, set = NULL. Masks are shared between vectors that
    reference each other and copied on the first write, so the process wide zero mask that
    every fresh vector starts with is never written to.
 */
#[derive(Debug, Clone)]
pub struct NullMask(Arc<NullBits>);

impl NullMask {
    pub fn zero() -> NullMask {
        ZERO_MASK.clone()
    }

    pub fn is_zero_mask(&self) -> bool {
        Arc::ptr_eq(&self.0, &ZERO_MASK.0)
    }

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        self.0[idx]
    }

    #[inline]
    pub fn set(&mut self, idx: usize, is_null: bool) {
        // Avoid copying the shared mask when nothing changes
        if self.0[idx] != is_null {
            Arc::make_mut(&mut self.0).set(idx, is_null);
        }
    }

    pub fn set_range(&mut self, count: usize, is_null: bool) {
        let range = &self.0[..count];
        if count == 0 || (range.all() == is_null && range.any() == is_null) {
            return;
        }
        Arc::make_mut(&mut self.0)[..count].fill(is_null);
    }

    pub fn any(&self) -> bool {
        self.0.any()
    }

    pub fn any_in(&self, count: usize) -> bool {
        self.0[..count].any()
    }

    pub fn count_in(&self, count: usize) -> usize {
        self.0[..count].count_ones()
    }
}

impl Default for NullMask {
    fn default() -> Self {
        NullMask::zero()
    }
}

impl PartialEq for NullMask {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_zero_mask_never_written() {
        let mut mask = NullMask::zero();
        assert!(mask.is_zero_mask());
        mask.set(3, false);
        assert!(mask.is_zero_mask());
        mask.set(3, true);
        assert!(!mask.is_zero_mask());
        assert!(mask.get(3));
        assert!(!NullMask::zero().any());
    }

    #[test]
    fn test_empty_range_keeps_zero_mask() {
        let mut mask = NullMask::zero();
        mask.set_range(0, true);
        assert!(mask.is_zero_mask());
        mask.set_range(0, false);
        assert!(mask.is_zero_mask());
        mask.set_range(5, false);
        assert!(mask.is_zero_mask());
    }

    #[test]
    fn test_shared_copy_on_write() {
        let mut first = NullMask::zero();
        first.set_range(10, true);
        let mut second = first.clone();
        second.set(0, false);
        assert!(first.get(0));
        assert!(!second.get(0));
        assert_eq!(first.count_in(STANDARD_VECTOR_SIZE), 10);
        assert_eq!(second.count_in(10), 9);
        assert!(!second.any_in(1));
    }
}
