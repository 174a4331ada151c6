use core::cell::UnsafeCell;

use super::RawLock;
use crate::Init;

/// A [`RawLock`] backed by `pthread_mutex_t`, for running a [`GlobalHeap`] in
/// a hosted environment.
///
/// `pthread_mutex_t` might be unsafe to move, so this lock must not be moved
/// after its first use. Placing it (or the `GlobalHeap` containing it) in a
/// `static` satisfies this.
///
/// [`GlobalHeap`]: super::GlobalHeap
#[cfg_attr(feature = "doc_cfg", doc(cfg(unix)))]
pub struct PthreadMutex(UnsafeCell<libc::pthread_mutex_t>);

impl Init for PthreadMutex {
    const INIT: Self = Self(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
}

// Safety: `pthread_mutex_t` is designed to be shared between threads
unsafe impl Send for PthreadMutex {}
unsafe impl Sync for PthreadMutex {}

unsafe impl RawLock for PthreadMutex {
    #[inline]
    fn lock(&self) {
        let result = unsafe { libc::pthread_mutex_lock(self.0.get()) };
        if result != 0 {
            unsafe { libc::abort() };
        }
    }

    #[inline]
    fn unlock(&self) {
        unsafe { libc::pthread_mutex_unlock(self.0.get()) };
    }
}
