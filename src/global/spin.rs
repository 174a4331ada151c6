use core::sync::atomic::{AtomicBool, Ordering};

use super::RawLock;
use crate::Init;

/// A spinning [`RawLock`].
///
/// It does not mask interrupts. An interrupt handler that allocates while
/// the interrupted code holds this lock will spin forever.
#[derive(Debug)]
#[cfg_attr(feature = "doc_cfg", doc(cfg(target_has_atomic = "8")))]
pub struct SpinLock {
    locked: AtomicBool,
}

impl Init for SpinLock {
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };
}

impl const_default1::ConstDefault for SpinLock {
    const DEFAULT: Self = Self::INIT;
}

unsafe impl RawLock for SpinLock {
    #[inline]
    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}
