//! The allocator context
use core::{
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::{self, NonNull},
};

use crate::{
    bank::BankConfig,
    block::{BlockInfo, Handle, SlotIdx},
    error::AllocError,
    group::{CompactReport, Group, GroupStats, Relocation},
    init::Init,
    region::{Region, BANK_COUNT},
};

/// The default capacity of each group's block header table.
pub const DEFAULT_MAX_BLOCKS: usize = 128;

/// The largest size that can be requested. Payload sizes are stored in 16
/// bits.
pub const MAX_REQUEST: usize = u16::MAX as usize;

/// The banked first-fit heap.
///
/// `N` is the capacity of each group's block header table, i.e., the maximum
/// number of blocks (free or used) a single bank can be divided into. Once a
/// group's table is full, a request takes the whole free block it fits in.
///
/// # Invariants
///
///  - Within a group, the blocks tile the bank in address order: the header
///    of each block starts right after the previous block's payload, and the
///    last payload ends at the end of the bank.
///
///  - No two adjacent blocks are free.
///
///  - A group's free and used block counts add up to the number of blocks
///    linked in that group.
///
pub struct Heap<'pool, const N: usize = DEFAULT_MAX_BLOCKS> {
    region: Option<Region>,
    /// Points to `region.heap.start`. Bank addresses are derived from this
    /// pointer.
    origin: *mut u8,
    /// Indexed by group id, which is the bank index.
    groups: [Option<Group<N>>; BANK_COUNT],
    head: Option<u8>,
    tail: Option<u8>,
    cursor: Option<(u8, Option<SlotIdx>)>,
    _phantom: PhantomData<&'pool mut ()>,
}

// Safety: The banks referenced by `origin` are logically owned by `Heap` and
//         are only accessed through `&mut self`.
unsafe impl<const N: usize> Send for Heap<'_, N> {}

unsafe impl<const N: usize> Sync for Heap<'_, N> {}

/// Where the last successful search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// The group the next search starts from.
    pub group: u8,
    /// The block handed out by the last allocation, if it still exists.
    pub block: Option<BlockInfo>,
}

impl<const N: usize> Init for Heap<'_, N> {
    const INIT: Self = Self::INIT;
}

impl<const N: usize> const_default1::ConstDefault for Heap<'_, N> {
    const DEFAULT: Self = Self::INIT;
}

impl<const N: usize> Default for Heap<'_, N> {
    fn default() -> Self {
        Self::INIT
    }
}

impl<const N: usize> core::fmt::Debug for Heap<'_, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap")
            .field("region", &self.region)
            .field("groups", &DebugGroups(self))
            .field("cursor", &self.cursor)
            .finish()
    }
}

struct DebugGroups<'a, 'pool, const N: usize>(&'a Heap<'pool, N>);

impl<const N: usize> core::fmt::Debug for DebugGroups<'_, '_, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.0.groups()).finish()
    }
}

impl<'pool, const N: usize> Heap<'pool, N> {
    const NO_GROUP: Option<Group<N>> = None;

    /// Evaluates successfully if the parameters are valid.
    const VALID: () = assert!(
        N > 0 && N <= SlotIdx::MAX as usize + 1,
        "`N` must be in range `1..=65536`"
    );

    /// A heap without any group. Call [`Self::discover`] or
    /// [`Self::discover_in`] before allocating.
    pub const INIT: Self = Self {
        region: None,
        origin: ptr::null_mut(),
        groups: [Self::NO_GROUP; BANK_COUNT],
        head: None,
        tail: None,
        cursor: None,
        _phantom: {
            let () = Self::VALID;
            PhantomData
        },
    };

    /// Create one group for every bank that `banks` assigns to
    /// general-purpose RAM and that lies inside `region.heap`.
    ///
    /// Returns the number of groups created. Zero is not an error, but every
    /// allocation will fail with [`AllocError::Uninitialized`].
    ///
    /// # Safety
    ///
    /// `region.heap` must be valid for reads and writes and is considered
    /// owned by `self`. It must outlive `self`.
    pub unsafe fn discover(
        &mut self,
        region: Region,
        banks: BankConfig,
    ) -> Result<usize, AllocError> {
        let origin = region.heap.start as *mut u8;
        self.discover_inner(origin, region, banks)
    }

    /// Like [`Self::discover`], but the heap span is the memory block `pool`.
    /// Bank `0` starts at the first byte of `pool`. The fragment span is
    /// empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use bankheap::{BankConfig, BankKind, Heap, BANK_SIZE};
    /// use std::mem::MaybeUninit;
    /// let mut pool = vec![MaybeUninit::uninit(); BANK_SIZE * 3];
    /// let banks = BankConfig::default()
    ///     .with(0, BankKind::DataTcm)
    ///     .with(2, BankKind::Ram);
    /// let mut heap: Heap<'_> = Heap::INIT;
    /// assert_eq!(heap.discover_in(&mut pool, banks), Ok(1));
    /// assert_eq!(heap.groups().next().unwrap().id, 2);
    /// ```
    pub fn discover_in(
        &mut self,
        pool: &'pool mut [MaybeUninit<u8>],
        banks: BankConfig,
    ) -> Result<usize, AllocError> {
        let range = pool.as_mut_ptr_range();
        let heap = range.start as usize..range.end as usize;
        let region = Region::new(heap.clone(), heap.end..heap.end);
        self.discover_inner(range.start as *mut u8, region, banks)
    }

    fn discover_inner(
        &mut self,
        origin: *mut u8,
        region: Region,
        banks: BankConfig,
    ) -> Result<usize, AllocError> {
        if self.region.is_some() {
            return Err(AllocError::AlreadyInitialized);
        }

        let mut count = 0;
        for index in banks.ram_banks() {
            let base = match region.bank_base(index) {
                Some(base) => base,
                None => {
                    log::warn!(
                        "bank {} is outside the heap span {:#x?}; skipping",
                        index,
                        region.heap
                    );
                    continue;
                }
            };

            let id = index as u8;
            let mut group = Group::new(id, base);
            group.prev = self.tail;
            match self.tail {
                Some(tail) => self.linked_group_mut(tail).next = Some(id),
                None => self.head = Some(id),
            }
            self.tail = Some(id);
            self.groups[index] = Some(group);
            count += 1;

            log::debug!("bank {}: group at {:#x}", index, base);
        }

        log::debug!(
            "discovered {} group(s) in {:#x?} (fragment: {:#x?})",
            count,
            region.heap,
            region.fragment
        );

        self.origin = origin;
        self.region = Some(region);
        self.cursor = self.head.map(|id| (id, None));
        Ok(count)
    }

    /// The region descriptor given to discovery.
    #[inline]
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    #[inline]
    fn group(&self, id: u8) -> Option<&Group<N>> {
        self.groups.get(id as usize)?.as_ref()
    }

    #[inline]
    fn group_mut(&mut self, id: u8) -> Option<&mut Group<N>> {
        self.groups.get_mut(id as usize)?.as_mut()
    }

    #[inline]
    fn linked_group_mut(&mut self, id: u8) -> &mut Group<N> {
        match self.group_mut(id) {
            Some(group) => group,
            None => unreachable!("group {} is linked but absent", id),
        }
    }

    /// Get the address of the payload of a block in `group`.
    #[inline]
    fn payload_ptr(&self, group: &Group<N>, slot: SlotIdx) -> NonNull<u8> {
        let start = match &self.region {
            Some(region) => region.heap.start,
            None => unreachable!(),
        };
        let offset = group.base - start + group.block(slot).payload_offset();
        // Safety: The payload is located at least one header past the start
        //         of the heap span, and the heap span does not wrap around,
        //         so the result is not null.
        unsafe { NonNull::new_unchecked(self.origin.wrapping_add(offset)) }
    }

    /// Allocate `size` bytes.
    ///
    /// The search starts at the group where the previous search succeeded,
    /// visits every group once (wrapping around at the end of the group
    /// list), and picks the first free block in a group that is large
    /// enough. The returned block never moves.
    ///
    /// The returned address is not aligned to any particular boundary unless
    /// the base of the heap span is aligned and every request so far was a
    /// multiple of the desired alignment.
    ///
    /// # Time Complexity
    ///
    /// This method will complete in linear time (`O(blocks)`).
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let (id, slot) = self.allocate_block(size, false)?;
        let group = match self.group(id) {
            Some(group) => group,
            None => unreachable!(),
        };
        let ptr = self.payload_ptr(group, slot);
        log::trace!("allocate({}) = {:p} (group {})", size, ptr, id);
        Ok(ptr)
    }

    /// Allocate `size` bytes that [`Self::compact`] is allowed to relocate.
    ///
    /// Use [`Self::resolve`] to obtain the current address.
    pub fn allocate_movable(&mut self, size: usize) -> Result<Handle, AllocError> {
        let (id, slot) = self.allocate_block(size, true)?;
        let group = match self.group(id) {
            Some(group) => group,
            None => unreachable!(),
        };
        let handle = Handle {
            group: id,
            slot,
            generation: group.generation(slot),
        };
        log::trace!("allocate_movable({}) = {:?}", size, handle);
        Ok(handle)
    }

    fn allocate_block(&mut self, size: usize, movable: bool) -> Result<(u8, SlotIdx), AllocError> {
        if size == 0 || size > MAX_REQUEST {
            return Err(AllocError::InvalidRequest);
        }
        let start = self
            .cursor
            .map(|(id, _)| id)
            .or(self.head)
            .ok_or(AllocError::Uninitialized)?;

        let head = self.head;
        let mut id = start;
        loop {
            let group = self.linked_group_mut(id);

            if group.free_blocks() > 0 {
                if let Some(slot) = group.first_fit(size as u16, movable) {
                    self.cursor = Some((id, Some(slot)));
                    return Ok((id, slot));
                }
            }

            match group.next.or(head) {
                Some(next) if next != start => id = next,
                _ => break,
            }
        }

        log::trace!("allocate({}): out of memory", size);
        Err(AllocError::OutOfMemory)
    }

    /// Release an allocation made by [`Self::allocate`] (or the current
    /// address of a movable allocation) and merge it with its free neighbors.
    ///
    /// Nothing is changed if `ptr` is not the payload address of a used block
    /// of this heap.
    ///
    /// # Time Complexity
    ///
    /// This method will complete in linear time (`O(blocks)`).
    pub fn release(&mut self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        let region = self.region.as_ref().ok_or(AllocError::Uninitialized)?;
        let addr = ptr.as_ptr() as usize;
        let id = region
            .bank_index(addr)
            .ok_or(AllocError::ForeignAddress)? as u8;
        let group = self.group_mut(id).ok_or(AllocError::ForeignAddress)?;
        let slot = group.find_used(addr - group.base)?;
        let merged = group.release(slot);
        log::trace!("release({:p}) = block {} (group {})", ptr, merged, id);

        self.forget_vacated_cursor_block();
        Ok(())
    }

    /// Get the current address of a movable allocation.
    pub fn resolve(&self, handle: Handle) -> Result<NonNull<u8>, AllocError> {
        let group = self.group(handle.group).ok_or(AllocError::StaleHandle)?;
        self.check_handle(group, handle)?;
        Ok(self.payload_ptr(group, handle.slot))
    }

    /// Release a movable allocation.
    pub fn release_handle(&mut self, handle: Handle) -> Result<(), AllocError> {
        let group = self.group(handle.group).ok_or(AllocError::StaleHandle)?;
        self.check_handle(group, handle)?;
        self.linked_group_mut(handle.group).release(handle.slot);
        log::trace!("release_handle({:?})", handle);

        self.forget_vacated_cursor_block();
        Ok(())
    }

    fn check_handle(&self, group: &Group<N>, handle: Handle) -> Result<(), AllocError> {
        match group.get(handle.slot) {
            Some(block)
                if !block.free
                    && block.movable
                    && group.generation(handle.slot) == handle.generation =>
            {
                Ok(())
            }
            _ => Err(AllocError::StaleHandle),
        }
    }

    fn forget_vacated_cursor_block(&mut self) {
        if let Some((id, Some(slot))) = self.cursor {
            let vacant = self.group(id).map_or(true, |group| group.get(slot).is_none());
            if vacant {
                self.cursor = Some((id, None));
            }
        }
    }

    /// Slide every movable allocation toward the start of its bank, merging
    /// the free space it leaves behind. Addresses previously obtained by
    /// [`Self::resolve`] are invalidated.
    ///
    /// # Time Complexity
    ///
    /// This method will complete in `O(blocks² + moved bytes)` time.
    pub fn compact(&mut self) -> CompactReport {
        self.compact_groups(|_| true)
    }

    /// Like [`Self::compact`], but only for the groups whose
    /// [fragmentation](Self::fragmentation) exceeds `threshold` percent.
    pub fn compact_if_fragmented(&mut self, threshold: u8) -> CompactReport {
        self.compact_groups(|group| group.fragmentation() > threshold)
    }

    fn compact_groups(&mut self, mut filter: impl FnMut(&Group<N>) -> bool) -> CompactReport {
        let start = match &self.region {
            Some(region) => region.heap.start,
            None => return CompactReport::default(),
        };
        let origin = self.origin;

        let mut report = CompactReport::default();
        for group in self.groups.iter_mut().flatten() {
            if !filter(&*group) {
                continue;
            }
            let bank = origin.wrapping_add(group.base - start);
            report += group.compact(|Relocation { from, to, len }| {
                // Safety: Both ranges are inside the bank, which is owned by
                //         `self`. They may overlap.
                unsafe { ptr::copy(bank.add(from), bank.add(to), len) };
            });
        }

        self.forget_vacated_cursor_block();
        report
    }

    /// The fragmentation of group `id`'s free space in percent.
    pub fn fragmentation(&self, id: u8) -> Option<u8> {
        self.group(id).map(Group::fragmentation)
    }

    /// The number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.iter().flatten().count()
    }

    /// Iterate over the groups' statistics in group list order.
    pub fn groups(&self) -> impl Iterator<Item = GroupStats> + '_ {
        let mut cur = self.head;
        core::iter::from_fn(move || {
            let group = self.group(cur?)?;
            cur = group.next;
            Some(group.stats())
        })
    }

    pub fn group_stats(&self, id: u8) -> Option<GroupStats> {
        self.group(id).map(Group::stats)
    }

    /// Iterate over the blocks of group `id` in address order.
    pub fn blocks(&self, id: u8) -> impl Iterator<Item = BlockInfo> + '_ {
        self.group(id).into_iter().flat_map(Group::blocks)
    }

    /// The number of free blocks of every group, indexed by group id. Absent
    /// groups have zero.
    pub fn free_block_counts(&self) -> [u16; BANK_COUNT] {
        let mut counts = [0; BANK_COUNT];
        for group in self.groups.iter().flatten() {
            counts[group.id as usize] = group.free_blocks();
        }
        counts
    }

    /// The number of used blocks of every group, indexed by group id. Absent
    /// groups have zero.
    pub fn used_block_counts(&self) -> [u16; BANK_COUNT] {
        let mut counts = [0; BANK_COUNT];
        for group in self.groups.iter().flatten() {
            counts[group.id as usize] = group.used_blocks();
        }
        counts
    }

    /// Where the next search starts.
    pub fn cursor(&self) -> Option<Cursor> {
        let (id, slot) = self.cursor?;
        let group = self.group(id)?;
        let block = slot
            .and_then(|slot| group.get(slot))
            .map(|block| BlockInfo::new(group.base, block));
        Some(Cursor { group: id, block })
    }
}
