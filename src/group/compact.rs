//! Relocating compaction of movable blocks
use core::ops;

use super::{Group, HDR};
use crate::block::SlotIdx;

/// The outcome of a compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactReport {
    /// The number of times a movable block was slid over a free block.
    pub moved_blocks: usize,
    /// The number of payload bytes copied.
    pub moved_bytes: usize,
    /// The number of free blocks that disappeared by merging.
    pub merged_blocks: usize,
}

impl ops::AddAssign for CompactReport {
    fn add_assign(&mut self, rhs: Self) {
        self.moved_blocks += rhs.moved_blocks;
        self.moved_bytes += rhs.moved_bytes;
        self.merged_blocks += rhs.merged_blocks;
    }
}

/// A payload move requested by [`Group::compact`]. Offsets are relative to
/// the group base; the ranges may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Relocation {
    pub from: usize,
    pub to: usize,
    pub len: usize,
}

impl<const N: usize> Group<N> {
    /// The fragmentation of the free space in percent: `0` if all free bytes
    /// are in one block (or there are none), approaching `100` as the largest
    /// free block shrinks relative to the total.
    pub fn fragmentation(&self) -> u8 {
        if self.free_size == 0 {
            return 0;
        }
        (100 - self.largest_free() * 100 / self.free_size) as u8
    }

    /// Slide movable used blocks toward the start of the bank, so that free
    /// space collects behind them. Pinned used blocks are left in place and
    /// act as barriers.
    ///
    /// `relocate` is called to move the payload bytes *before* the headers are
    /// updated.
    pub fn compact(&mut self, mut relocate: impl FnMut(Relocation)) -> CompactReport {
        let mut report = CompactReport::default();
        let mut cur = self.first;

        while let Some(i) = cur {
            let block = *self.block(i);

            if block.free {
                if let Some(next) = block.next {
                    let next_block = *self.block(next);

                    // Invariant: No two adjacent free blocks
                    debug_assert!(!next_block.free);

                    if next_block.movable {
                        relocate(Relocation {
                            from: next_block.payload_offset(),
                            to: block.payload_offset(),
                            len: next_block.size as usize,
                        });
                        self.swap_with_next(i);

                        report.moved_blocks += 1;
                        report.moved_bytes += next_block.size as usize;

                        let free_blocks = self.free_blocks;
                        let merged = self.coalesce(i);
                        debug_assert_eq!(merged, i);
                        report.merged_blocks += (free_blocks - self.free_blocks) as usize;

                        // Keep pushing the same free block
                        continue;
                    }
                }
            }

            cur = block.next;
        }

        if report.moved_blocks > 0 {
            log::trace!("group {}: compacted {:?}", self.id, report);
        }

        report
    }

    /// Exchange the positions of the free block `i` and the used block
    /// following it. The used block takes over `i`'s offset, and `i` moves to
    /// right after the used block's payload.
    fn swap_with_next(&mut self, i: SlotIdx) {
        let free = *self.block(i);
        let next = match free.next {
            Some(next) => next,
            None => unreachable!(),
        };
        let used = *self.block(next);
        debug_assert!(free.free && !used.free);

        let used_block = self.block_mut(next);
        used_block.offset = free.offset;
        used_block.prev = free.prev;
        used_block.next = Some(i);

        let free_block = self.block_mut(i);
        free_block.offset = free.offset + HDR + used.size;
        free_block.prev = Some(next);
        free_block.next = used.next;

        if let Some(prev) = free.prev {
            self.block_mut(prev).next = Some(next);
        } else {
            self.first = Some(next);
        }
        if let Some(after) = used.next {
            self.block_mut(after).prev = Some(i);
        }

        debug_assert_eq!(self.block(next).end(), self.block(i).offset as usize);
        debug_assert_eq!(self.block(i).end(), used.end());
    }
}
