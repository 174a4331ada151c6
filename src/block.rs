//! Block headers and the per-group header table
use core::ops::Range;

/// The number of bytes reserved in front of every block's payload.
pub const BLOCK_HDR_SIZE: usize = 16;

/// The index of a header slot in a group's table.
pub(crate) type SlotIdx = u16;

/// The header of a memory block.
///
/// A block spans `offset..offset + BLOCK_HDR_SIZE + size` relative to the base
/// address of its group.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Block {
    /// The offset of the header from the group base.
    pub offset: u16,
    /// The payload size.
    pub size: u16,
    pub prev: Option<SlotIdx>,
    pub next: Option<SlotIdx>,
    pub free: bool,
    /// The id of the owning group. Cached so that a header can be checked
    /// against the group it was found in.
    pub group: u8,
    /// Whether this block was handed out as a [`Handle`] and may be
    /// relocated by compaction.
    pub movable: bool,
}

impl Block {
    /// The offset of the byte immediately following the payload, i.e., where
    /// the next block's header starts.
    #[inline]
    pub fn end(&self) -> usize {
        self.payload_offset() + self.size as usize
    }

    #[inline]
    pub fn payload_offset(&self) -> usize {
        self.offset as usize + BLOCK_HDR_SIZE
    }
}

/// An entry of a group's header table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    /// Incremented whenever the occupant is released or the slot is
    /// vacated, so that handles to the old occupant can be told apart from
    /// handles to a new one. Wraps around after `2^32` increments.
    pub generation: u32,
    pub block: Option<Block>,
}

impl Slot {
    pub const VACANT: Self = Self {
        generation: 0,
        block: None,
    };
}

/// A stable reference to a movable allocation.
///
/// The payload address of a movable allocation can change during
/// [`Heap::compact`]; resolve it with [`Heap::resolve`] after the last
/// compaction instead of keeping the address around.
///
/// [`Heap::compact`]: crate::Heap::compact
/// [`Heap::resolve`]: crate::Heap::resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) group: u8,
    pub(crate) slot: SlotIdx,
    pub(crate) generation: u32,
}

impl Handle {
    /// The id of the group the allocation belongs to.
    #[inline]
    pub fn group(&self) -> u8 {
        self.group
    }
}

/// A read-only description of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// The absolute address range of the header.
    pub header: Range<usize>,
    /// The absolute address range of the payload.
    pub payload: Range<usize>,
    pub free: bool,
    pub movable: bool,
    pub group: u8,
}

impl BlockInfo {
    pub(crate) fn new(base: usize, block: &Block) -> Self {
        let start = base + block.offset as usize;
        let payload_start = base + block.payload_offset();
        Self {
            header: start..payload_start,
            payload: payload_start..base + block.end(),
            free: block.free,
            movable: block.movable,
            group: block.group,
        }
    }

    /// The payload size.
    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
