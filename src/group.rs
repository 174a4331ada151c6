//! Heap groups: one per RAM bank
use crate::{
    block::{Block, BlockInfo, Slot, SlotIdx, BLOCK_HDR_SIZE},
    error::AllocError,
    region::BANK_SIZE,
};

mod compact;
pub use self::compact::CompactReport;
pub(crate) use self::compact::Relocation;

/// The number of bytes reserved at the start of every bank for the group
/// header.
pub const GROUP_HDR_SIZE: usize = 16;

const HDR: u16 = BLOCK_HDR_SIZE as u16;

// Offsets and payload sizes are stored in 16 bits
const _: () = assert!(BANK_SIZE <= 1 << 16);

/// The allocation domain for one bank.
///
#[doc = svgbobdoc::transform!(
/// ```svgbob
///  base                                                        base + BANK_SIZE
///   |                                                                  |
///   v                                                                  v
///   +--------+--------+-----------+--------+---------+--------+--------+
///   | group  | block  |  payload  | block  | payload | block  |payload |
///   | header | header |  (used)   | header | (free)  | header |(used)  |
///   +--------+--------+-----------+--------+---------+--------+--------+
///                 ^  |                ^  |               ^
///                 |  '----------------'  '---------------'  next
///                 '----------------------'                  prev
/// ```
)]
///
/// The blocks are linked in address order and tile the bank without gaps:
/// each block starts exactly where the previous block's payload ends.
/// Two adjacent blocks are never both free.
#[derive(Debug)]
pub(crate) struct Group<const N: usize> {
    pub id: u8,
    /// The absolute address of the bank.
    pub base: usize,
    pub prev: Option<u8>,
    pub next: Option<u8>,
    first: Option<SlotIdx>,
    free_size: usize,
    used_size: usize,
    free_blocks: u16,
    used_blocks: u16,
    slots: [Slot; N],
}

/// A snapshot of a group's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStats {
    pub id: u8,
    /// The absolute address of the bank.
    pub base: usize,
    /// The bytes available for blocks (headers and payloads), i.e., the bank
    /// size minus the group header.
    pub total_size: usize,
    /// The sum of free payload sizes.
    pub free_size: usize,
    /// The sum of used payload sizes.
    pub used_size: usize,
    pub free_blocks: usize,
    pub used_blocks: usize,
    /// The payload size of the largest free block.
    pub largest_free: usize,
}

impl GroupStats {
    /// The bytes taken up by block headers.
    #[inline]
    pub fn overhead(&self) -> usize {
        (self.free_blocks + self.used_blocks) * BLOCK_HDR_SIZE
    }
}

impl<const N: usize> Group<N> {
    /// The bytes available for blocks.
    pub const TOTAL_SIZE: usize = BANK_SIZE - GROUP_HDR_SIZE;

    /// The payload size of the single free block of a fresh group.
    pub const INITIAL_PAYLOAD: usize = Self::TOTAL_SIZE - BLOCK_HDR_SIZE;

    /// Create a group whose whole bank is one free block.
    pub fn new(id: u8, base: usize) -> Self {
        let mut slots = [Slot::VACANT; N];
        slots[0].block = Some(Block {
            offset: GROUP_HDR_SIZE as u16,
            size: Self::INITIAL_PAYLOAD as u16,
            prev: None,
            next: None,
            free: true,
            group: id,
            movable: false,
        });
        Self {
            id,
            base,
            prev: None,
            next: None,
            first: Some(0),
            free_size: Self::INITIAL_PAYLOAD,
            used_size: 0,
            free_blocks: 1,
            used_blocks: 0,
            slots,
        }
    }

    #[inline]
    pub fn free_blocks(&self) -> u16 {
        self.free_blocks
    }

    #[inline]
    pub fn used_blocks(&self) -> u16 {
        self.used_blocks
    }

    #[inline]
    pub fn block(&self, i: SlotIdx) -> &Block {
        match &self.slots[i as usize].block {
            Some(block) => block,
            None => unreachable!("slot {} is linked but vacant", i),
        }
    }

    #[inline]
    fn block_mut(&mut self, i: SlotIdx) -> &mut Block {
        match &mut self.slots[i as usize].block {
            Some(block) => block,
            None => unreachable!("slot {} is linked but vacant", i),
        }
    }

    /// Get the occupant of slot `i`, if any.
    #[inline]
    pub fn get(&self, i: SlotIdx) -> Option<&Block> {
        self.slots.get(i as usize)?.block.as_ref()
    }

    #[inline]
    pub fn generation(&self, i: SlotIdx) -> u32 {
        self.slots[i as usize].generation
    }

    fn vacant_slot(&self) -> Option<SlotIdx> {
        self.slots
            .iter()
            .position(|slot| slot.block.is_none())
            .map(|i| i as SlotIdx)
    }

    fn vacate(&mut self, i: SlotIdx) {
        let slot = &mut self.slots[i as usize];
        debug_assert!(slot.block.is_some());
        slot.block = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Iterate over the linked blocks in address order.
    pub fn entries(&self) -> Entries<'_, N> {
        Entries {
            group: self,
            cur: self.first,
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        let base = self.base;
        self.entries().map(move |(_, block)| BlockInfo::new(base, block))
    }

    pub fn largest_free(&self) -> usize {
        self.entries()
            .filter(|(_, block)| block.free)
            .map(|(_, block)| block.size as usize)
            .max()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> GroupStats {
        GroupStats {
            id: self.id,
            base: self.base,
            total_size: Self::TOTAL_SIZE,
            free_size: self.free_size,
            used_size: self.used_size,
            free_blocks: self.free_blocks as usize,
            used_blocks: self.used_blocks as usize,
            largest_free: self.largest_free(),
        }
    }

    /// Find the first free block that can hold `size` bytes and turn it into a
    /// used block, splitting off the excess as a new free block.
    ///
    /// Returns `None` without changing anything if no free block is large
    /// enough. A full header table never causes a failure.
    pub fn first_fit(&mut self, size: u16, movable: bool) -> Option<SlotIdx> {
        debug_assert_ne!(size, 0);
        let mut cur = self.first;
        while let Some(i) = cur {
            let block = *self.block(i);
            cur = block.next;

            if !block.free || block.size < size {
                continue;
            }

            // Carve a new header out of the tail only if it leaves a non-empty
            // payload behind and a header slot is left to describe it;
            // otherwise the whole block is handed out.
            if block.size - size > HDR {
                match self.vacant_slot() {
                    Some(tail) => self.split(i, tail, size),
                    None => log::debug!(
                        "group {}: header table is full; handing out all {} bytes of block {}",
                        self.id,
                        block.size,
                        i
                    ),
                }
            }

            self.mark_used(i, movable);
            return Some(i);
        }
        None
    }

    /// Shrink the free block `i` to `size` bytes and link a new free block
    /// occupying slot `tail` right after it.
    fn split(&mut self, i: SlotIdx, tail: SlotIdx, size: u16) {
        let id = self.id;
        let block = self.block_mut(i);
        debug_assert!(block.free);
        debug_assert!(block.size - size > HDR);

        let new_block = Block {
            offset: block.offset + HDR + size,
            size: block.size - size - HDR,
            prev: Some(i),
            next: block.next,
            free: true,
            group: id,
            movable: false,
        };
        block.size = size;
        block.next = Some(tail);

        if let Some(next) = new_block.next {
            self.block_mut(next).prev = Some(tail);
        }
        self.slots[tail as usize].block = Some(new_block);

        self.free_blocks += 1;
        self.free_size -= BLOCK_HDR_SIZE;
    }

    fn mark_used(&mut self, i: SlotIdx, movable: bool) {
        let block = self.block_mut(i);
        debug_assert!(block.free);
        block.free = false;
        block.movable = movable;
        let size = block.size as usize;

        self.free_blocks -= 1;
        self.used_blocks += 1;
        self.free_size -= size;
        self.used_size += size;
    }

    /// Find the used block whose payload starts at `offset`.
    pub fn find_used(&self, offset: usize) -> Result<SlotIdx, AllocError> {
        for (i, block) in self.entries() {
            let payload = block.payload_offset();
            if payload == offset {
                debug_assert_eq!(block.group, self.id);
                return if block.free {
                    Err(AllocError::DoubleRelease)
                } else {
                    Ok(i)
                };
            } else if payload > offset {
                break;
            }
        }
        Err(AllocError::ForeignAddress)
    }

    /// Turn the used block `i` into a free block and merge it with its free
    /// neighbors. Returns the slot of the resulting free block.
    pub fn release(&mut self, i: SlotIdx) -> SlotIdx {
        let block = self.block_mut(i);
        debug_assert!(!block.free);
        block.free = true;
        block.movable = false;
        let size = block.size as usize;

        // Handles to the old occupant must not resolve to a future one
        let slot = &mut self.slots[i as usize];
        slot.generation = slot.generation.wrapping_add(1);

        self.used_blocks -= 1;
        self.free_blocks += 1;
        self.used_size -= size;
        self.free_size += size;

        self.coalesce(i)
    }

    /// Merge the free block `i` with the free blocks following it, then merge
    /// the result into the free blocks preceding it. Returns the slot of the
    /// resulting free block.
    ///
    /// The forward merge must come first so that the backward merge absorbs
    /// the already-enlarged block.
    fn coalesce(&mut self, mut i: SlotIdx) -> SlotIdx {
        debug_assert!(self.block(i).free);

        while let Some(next) = self.block(i).next {
            if !self.block(next).free {
                break;
            }
            self.absorb_next(i);
        }

        while let Some(prev) = self.block(i).prev {
            if !self.block(prev).free {
                break;
            }
            self.absorb_next(prev);
            i = prev;
        }

        i
    }

    /// Merge the free block following `i` into `i`, reclaiming its header.
    fn absorb_next(&mut self, i: SlotIdx) {
        let next = match self.block(i).next {
            Some(next) => next,
            None => unreachable!(),
        };
        let absorbed = *self.block(next);
        debug_assert!(self.block(i).free && absorbed.free);
        debug_assert_eq!(self.block(i).end(), absorbed.offset as usize);

        let block = self.block_mut(i);
        block.size += HDR + absorbed.size;
        block.next = absorbed.next;
        if let Some(after) = absorbed.next {
            self.block_mut(after).prev = Some(i);
        }
        self.vacate(next);

        log::trace!(
            "group {}: merged block at {:#x} into block {}",
            self.id,
            absorbed.offset,
            i
        );

        self.free_blocks -= 1;
        self.free_size += BLOCK_HDR_SIZE;
    }
}

/// Iterator over a group's linked blocks.
pub(crate) struct Entries<'a, const N: usize> {
    group: &'a Group<N>,
    cur: Option<SlotIdx>,
}

impl<'a, const N: usize> Iterator for Entries<'a, N> {
    type Item = (SlotIdx, &'a Block);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let i = self.cur?;
        let block = self.group.block(i);
        self.cur = block.next;
        Some((i, block))
    }
}
