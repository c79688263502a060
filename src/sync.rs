//! Atomics and spin hints, swapped for `loom`'s model-checked versions when
//! built with `RUSTFLAGS="--cfg loom"`.

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicPtr, Ordering};

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicPtr, Ordering};

#[inline(always)]
pub(crate) fn spin_loop() {
    #[cfg(not(loom))]
    core::hint::spin_loop();

    #[cfg(loom)]
    loom::hint::spin_loop();
}

#[cfg(feature = "std")]
#[inline(always)]
pub(crate) fn yield_now() {
    #[cfg(not(loom))]
    std::thread::yield_now();

    #[cfg(loom)]
    loom::thread::yield_now();
}
