//! # Relax
//!
//! What a thread does while it waits for a busy link slot.
//!
//! Every list operation retries until the slots it needs are free. Between two
//! attempts it calls [`Relax::relax`] on a strategy value created fresh for that
//! operation. The strategy only changes how the CPU spends the wait; it never
//! affects the result of an operation.
//!
//! The strategy is picked per list through the `R` type parameter of
//! [`MtList`](crate::MtList), so each target can plug in its own pause or
//! yield primitive at compile time:
//!
//! | Strategy                     | Wait between attempts                          |
//! |------------------------------|------------------------------------------------|
//! | [`Spin`] (default)           | one [`core::hint::spin_loop`]                  |
//! | [`NoRelax`]                  | nothing, retry immediately                     |
//! | [`BackOff`](crate::BackOff)  | exponentially growing spin, then yield (`std`) |
//! | [`Yield`] (`std` only)       | [`std::thread::yield_now`]                     |
//!
//! ## Example
//! ```rust
//! use axiom_mtlist::{BackOff, MtList};
//!
//! static QUEUE: MtList<BackOff> = MtList::new();
//! assert!(QUEUE.is_empty());
//! ```

use crate::sync;

/// A waiting strategy for contended link slots.
///
/// A new value is created with [`Default`] at the start of every operation, so
/// stateful strategies (like [`BackOff`](crate::BackOff)) start cold each time.
pub trait Relax: Default {
    /// Called once after every failed attempt. Does nothing by default.
    #[inline(always)]
    fn relax(&mut self) {}
}

/// Issues one CPU pause hint per failed attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn relax(&mut self) {
        sync::spin_loop();
    }
}

/// Retries immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRelax;

impl Relax for NoRelax {}

/// Gives the rest of the time slice back to the OS scheduler.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Yield;

#[cfg(feature = "std")]
impl Relax for Yield {
    #[inline(always)]
    fn relax(&mut self) {
        sync::yield_now();
    }
}

/// Runs `attempt` until it returns `Some`, relaxing with a fresh `R` between
/// attempts.
#[inline]
pub(crate) fn retry<R: Relax, T>(mut attempt: impl FnMut() -> Option<T>) -> T {
    let mut relax = R::default();
    loop {
        if let Some(done) = attempt() {
            return done;
        }
        relax.relax();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn retry_runs_until_success() {
        let mut calls = 0;
        let out = retry::<Spin, _>(|| {
            calls += 1;
            (calls == 5).then_some(calls * 10)
        });

        assert_eq!(out, 50);
        assert_eq!(calls, 5);
    }

    #[test]
    fn no_relax_retries_immediately() {
        let mut left = 3;
        retry::<NoRelax, _>(|| {
            left -= 1;
            (left == 0).then_some(())
        });
        assert_eq!(left, 0);
    }
}
