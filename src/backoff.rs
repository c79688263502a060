//! # BackOff
//!
//! An exponential backoff [`Relax`] strategy for lists that see long bursts of
//! contention on the same links (a hot list head shared by many producers, for
//! instance).
//!
//! Each call to [`BackOff::wait`] spins for a number of iterations that doubles
//! after every call, up to a fixed limit. When built with the `std` feature it
//! also yields the thread once the spin count passes a threshold, so a thread
//! stuck behind a preempted lock holder lets that holder run.
//!
//! ## Example
//! ```rust
//! use axiom_mtlist::{BackOff, MtList};
//!
//! let backoff = BackOff::new();
//! backoff.wait();
//! assert!(backoff.current() > BackOff::new().current());
//!
//! // Or let the list drive it.
//! let list: MtList<BackOff> = MtList::new();
//! assert!(list.pop().is_none());
//! ```
//!
//! ## Feature flags
//! - **`std`**: yield the thread when contention persists beyond the threshold.

use core::cell::Cell;

use crate::relax::Relax;
use crate::sync::spin_loop;

/// Maximum spin iteration limit.
const MAX_SPIN: u32 = 1 << 16;

/// Default starting spin count.
const START_VALUE: u32 = 1 << 2;

/// Yield threshold used only under the `std` feature.
#[cfg(feature = "std")]
const YIELD_THRESHOLD: u32 = 1 << 10;

/// Bit shift applied during [`BackOff::ease`] to reduce spin intensity.
const EASE_DIV_BIT_VAL: u32 = 1;

/// An exponential backoff counter.
///
/// Each call to [`wait`](BackOff::wait) spins for the current count, then
/// doubles it (up to [`MAX_SPIN`]).
#[derive(Debug)]
pub struct BackOff {
    spin: Cell<u32>,
}

impl BackOff {
    /// Creates a new [`BackOff`] with the default starting spin count.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            spin: Cell::new(START_VALUE),
        }
    }

    /// Creates a new [`BackOff`] with a custom starting spin value.
    ///
    /// # Examples
    /// ```
    /// use axiom_mtlist::BackOff;
    /// let b = BackOff::new_with(128);
    /// assert_eq!(b.current(), 128);
    /// ```
    #[inline(always)]
    pub const fn new_with(start: u32) -> Self {
        Self {
            spin: Cell::new(start),
        }
    }

    /// Spins for the current count, then doubles it.
    ///
    /// Under the `std` feature this also yields the thread once the count has
    /// grown past the yield threshold.
    #[inline(always)]
    pub fn wait(&self) {
        let end = self.spin.get();

        for _ in 0..end {
            spin_loop();
        }

        let next = (end << 1).clamp(1, MAX_SPIN);
        self.spin.set(next);

        #[cfg(feature = "std")]
        {
            if end <= YIELD_THRESHOLD && next > YIELD_THRESHOLD {
                crate::logging::trace!("link contention persists after {} spins, yielding", end);
            }
            if end > YIELD_THRESHOLD {
                crate::sync::yield_now();
            }
        }
    }

    /// Halves the current spin count.
    ///
    /// Useful to recover slowly from aggressive backoff without starting cold.
    #[inline(always)]
    pub fn ease(&self) {
        let c_spin = self.spin.get();
        self.spin.set(c_spin >> EASE_DIV_BIT_VAL);
    }

    /// Returns the current spin iteration value.
    #[inline(always)]
    pub fn current(&self) -> u32 {
        self.spin.get()
    }

    /// Resets the spin count to the default starting value.
    #[inline(always)]
    pub fn reset(&self) {
        self.spin.set(START_VALUE);
    }
}

impl Default for BackOff {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl Relax for BackOff {
    #[inline(always)]
    fn relax(&mut self) {
        self.wait();
    }
}
