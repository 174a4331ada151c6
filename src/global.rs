use core::{
    alloc::{GlobalAlloc, Layout},
    cell::UnsafeCell,
    ops,
    ptr::{self, NonNull},
};

use crate::{
    bank::BankConfig,
    error::AllocError,
    heap::{Heap, DEFAULT_MAX_BLOCKS},
    init::Init,
    region::Region,
};

/// The alignment guaranteed by [`GlobalHeap`], provided that the heap span
/// starts at a multiple of it.
pub const GLOBAL_ALIGN: usize = 8;

// Every block starts at a multiple of `GLOBAL_ALIGN` only if the headers do
const _: () = assert!(crate::block::BLOCK_HDR_SIZE % GLOBAL_ALIGN == 0);
const _: () = assert!(crate::group::GROUP_HDR_SIZE % GLOBAL_ALIGN == 0);

/// A lock protecting a [`GlobalHeap`].
///
/// On a single-core microcontroller, `lock` should mask interrupts and
/// `unlock` should restore them, so that an interrupt handler cannot enter
/// the heap while the main program is inside it.
///
/// # Safety
///
/// Between a call to `lock` and the following call to `unlock`, no other
/// call to `lock` may return.
pub unsafe trait RawLock: Init {
    fn lock(&self);
    fn unlock(&self);
}

// `doc(cfg(...))` is attached to each lock type so that it shows up on the
// type's page.
cfg_if::cfg_if! {
    if #[cfg(target_has_atomic = "8")] {
        mod spin;
        pub use self::spin::SpinLock;
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use self::unix::PthreadMutex;
    }
}

/// [`Heap`] as a global allocator.
///
/// Allocation sizes are rounded up to multiples of [`GLOBAL_ALIGN`]. Requests
/// for a greater alignment fail.
///
/// # Examples
///
/// ```rust,ignore
/// static HEAP: GlobalHeap<InterruptLock> = GlobalHeap::INIT;
///
/// fn init() {
///     let region = Region::new(0x2020_0000..0x2028_0000, 0x2028_0000..0x2028_1000);
///     let banks = BankConfig::from_raw(read_bank_config_register());
///     unsafe { HEAP.init(region, banks) }.unwrap();
/// }
/// ```
pub struct GlobalHeap<L, const N: usize = DEFAULT_MAX_BLOCKS> {
    inner: UnsafeCell<Heap<'static, N>>,
    lock: L,
}

impl<L: RawLock, const N: usize> Init for GlobalHeap<L, N> {
    const INIT: Self = Self::INIT;
}

// Safety: `inner` is only accessed while `lock` is held
unsafe impl<L: RawLock, const N: usize> Send for GlobalHeap<L, N> {}
unsafe impl<L: RawLock, const N: usize> Sync for GlobalHeap<L, N> {}

impl<L: RawLock, const N: usize> GlobalHeap<L, N> {
    /// The initializer.
    pub const INIT: Self = Self {
        inner: UnsafeCell::new(Heap::INIT),
        lock: L::INIT,
    };

    #[inline]
    fn lock_inner(&self) -> impl ops::DerefMut<Target = Heap<'static, N>> + '_ {
        struct LockGuard<'a, L: RawLock, const N: usize>(&'a GlobalHeap<L, N>);

        impl<L: RawLock, const N: usize> ops::Deref for LockGuard<'_, L, N> {
            type Target = Heap<'static, N>;

            #[inline]
            fn deref(&self) -> &Self::Target {
                // Safety: Protected by `lock`
                unsafe { &*self.0.inner.get() }
            }
        }

        impl<L: RawLock, const N: usize> ops::DerefMut for LockGuard<'_, L, N> {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                // Safety: Protected by `lock`
                unsafe { &mut *self.0.inner.get() }
            }
        }

        impl<L: RawLock, const N: usize> Drop for LockGuard<'_, L, N> {
            #[inline]
            fn drop(&mut self) {
                self.0.lock.unlock();
            }
        }

        self.lock.lock();
        LockGuard(self)
    }

    /// Run bank discovery. See [`Heap::discover`].
    ///
    /// # Safety
    ///
    /// `region.heap` must be valid for reads and writes for the rest of the
    /// program and must not be accessed by anything but `self`. It should
    /// start at a multiple of [`GLOBAL_ALIGN`].
    pub unsafe fn init(&self, region: Region, banks: BankConfig) -> Result<usize, AllocError> {
        self.lock_inner().discover(region, banks)
    }

    /// Inspect the underlying heap while holding the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&Heap<'static, N>) -> R) -> R {
        let inner = self.lock_inner();
        f(&*inner)
    }
}

#[inline]
fn global_size(layout: Layout) -> Option<usize> {
    let size = layout.size().max(1);
    Some(size.checked_add(GLOBAL_ALIGN - 1)? & !(GLOBAL_ALIGN - 1))
}

unsafe impl<L: RawLock, const N: usize> GlobalAlloc for GlobalHeap<L, N> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > GLOBAL_ALIGN {
            return ptr::null_mut();
        }
        let size = match global_size(layout) {
            Some(size) => size,
            None => return ptr::null_mut(),
        };

        let mut inner = self.lock_inner();
        match inner.allocate(size) {
            Ok(ptr) if ptr.as_ptr() as usize % layout.align() == 0 => ptr.as_ptr(),
            Ok(ptr) => {
                // The heap span is misaligned
                let _ = inner.release(ptr);
                ptr::null_mut()
            }
            Err(_) => ptr::null_mut(),
        }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut inner = self.lock_inner();
        // Safety: All allocations are non-null
        let ptr = NonNull::new_unchecked(ptr);
        let result = inner.release(ptr);
        debug_assert_eq!(result, Ok(()), "dealloc({:p})", ptr);
    }
}
