use core::ops::Range;

/// The size of a physical RAM bank.
pub const BANK_SIZE: usize = 32 * 1024;

/// The number of banks described by a bank configuration value.
pub const BANK_COUNT: usize = 16;

/// The address spans handed to the heap by platform bring-up code.
///
/// `heap` is where the banks are located: bank `i` starts at
/// `heap.start + i * BANK_SIZE`. `fragment` is an auxiliary span that is
/// recorded but never allocated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub heap: Range<usize>,
    pub fragment: Range<usize>,
}

impl Region {
    #[inline]
    pub const fn new(heap: Range<usize>, fragment: Range<usize>) -> Self {
        Self { heap, fragment }
    }

    /// The base address of bank `index`, if the whole bank lies inside the
    /// heap span.
    pub fn bank_base(&self, index: usize) -> Option<usize> {
        let base = index
            .checked_mul(BANK_SIZE)
            .and_then(|offset| self.heap.start.checked_add(offset))?;
        let end = base.checked_add(BANK_SIZE)?;
        if end <= self.heap.end {
            Some(base)
        } else {
            None
        }
    }

    /// Get the index of the bank containing `addr`.
    #[inline]
    pub fn bank_index(&self, addr: usize) -> Option<usize> {
        if self.heap.contains(&addr) {
            Some((addr - self.heap.start) / BANK_SIZE)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_base_rejects_partial_banks() {
        let region = Region::new(0x2000_0000..0x2000_0000 + BANK_SIZE * 2 + 100, 0..0);
        assert_eq!(region.bank_base(0), Some(0x2000_0000));
        assert_eq!(region.bank_base(1), Some(0x2000_0000 + BANK_SIZE));
        assert_eq!(region.bank_base(2), None);
        assert_eq!(region.bank_base(usize::MAX), None);
    }

    #[test]
    fn bank_index() {
        let region = Region::new(0x1000..0x1000 + BANK_SIZE * 4, 0..0);
        assert_eq!(region.bank_index(0xfff), None);
        assert_eq!(region.bank_index(0x1000), Some(0));
        assert_eq!(region.bank_index(0x1000 + BANK_SIZE * 3 + 5), Some(3));
        assert_eq!(region.bank_index(0x1000 + BANK_SIZE * 4), None);
    }
}
