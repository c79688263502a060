//! # axiom-mtlist 🌀
//!
//! A lightweight, **`no_std`-compatible**, intrusive, circular, doubly-linked
//! list whose links are also its locks.
//!
//! Every [`MtList`] has two pointer slots, `next` and `prev`. A thread that
//! wants to change a slot first swaps it for a reserved **busy** marker; other
//! threads that find the marker spin until the real pointer comes back. Locks
//! are therefore as fine as the list itself: operations on different parts of
//! a list never contend, and there is no global lock, no allocation and no
//! blocking syscall anywhere.
//!
//! The crate includes:
//!
//! - [`MtList`]: the link, which is both a list head and an element.
//! - [`Cursor`] and [`Iter`]: locking and weak walks over a list.
//! - [`LockedLink`], [`ElemGuard`] and [`Cut`]: RAII guards for multi-step edits.
//! - [`Relax`] with [`Spin`], [`NoRelax`], [`BackOff`] and `Yield`: what a
//!   thread does while it waits for a busy slot.
//! - [`mt_list_entry!`]: from a link back to the structure embedding it.
//!
//! ## 🚀 Quick Example
//!
//! ```rust
//! use std::ptr::NonNull;
//! use std::thread;
//! use axiom_mtlist::{mt_list_entry, MtList};
//!
//! struct Task {
//!     id: usize,
//!     link: MtList,
//! }
//!
//! static RUN_QUEUE: MtList = MtList::new();
//!
//! let tasks: &'static [Task] = Box::leak(
//!     (0..8)
//!         .map(|id| Task { id, link: MtList::new() })
//!         .collect::<Box<[Task]>>(),
//! );
//!
//! thread::scope(|s| {
//!     for chunk in tasks.chunks(2) {
//!         s.spawn(move || {
//!             for task in chunk {
//!                 // SAFETY: tasks are leaked, so they never move or go away.
//!                 unsafe { RUN_QUEUE.append(NonNull::from(&task.link)) };
//!             }
//!         });
//!     }
//! });
//!
//! let mut ids = Vec::new();
//! while let Some(link) = RUN_QUEUE.pop() {
//!     ids.push(unsafe { mt_list_entry!(link, Task, link).as_ref() }.id);
//! }
//! ids.sort();
//! assert_eq!(ids, (0..8).collect::<Vec<_>>());
//! ```
//!
//! ## 🧠 Design
//!
//! Operations that touch several slots take them one at a time with a single
//! compare-and-swap each. If one of them is busy, everything already taken is
//! put back and the operation starts over after a [`Relax`] pause. Nobody
//! waits while holding a slot someone else needs, which keeps the list free of
//! deadlocks without any global lock order.
//!
//! A slot that points back at its own link is stored as null. Detached links
//! and empty heads are position-independent, and [`MtList::new`] is a
//! `const fn` usable in `static`s.
//!
//! ## ⚠️ Safety & Usage Notes
//!
//! - Linking is `unsafe`: a linked node, and the anchor it was linked to,
//!   must stay valid and must not move until it is detached again.
//! - Hold guards and cursors briefly. Never block while holding one.
//! - Nothing is reentrant. A thread holding a slot deadlocks if it runs a list
//!   operation that needs the same slot.
//! - Spinning is unbounded and unfair under contention.
//!
//! ## Feature flags
//!
//! - **`std`** (default): [`log`](https://docs.rs/log) output on contended
//!   paths, the `Yield` strategy, and the `mtlist-stress` binary.
//!
//! ## 📦 Modules
//!
//! - [`list`]: the link type and its insert/remove operations.
//! - [`slot`]: the lockable pointer slot.
//! - [`lock`]: explicit link locks.
//! - [`cursor`]: walking a list.
//! - [`relax`] and [`backoff`]: waiting strategies.
//! - [`entry`]: link-to-container arithmetic.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod backoff;
pub mod cursor;
pub mod entry;
pub mod list;
pub mod lock;
pub mod relax;
pub mod slot;

mod sync;

pub use backoff::BackOff;
pub use cursor::{Cursor, Iter};
pub use entry::container_of;
pub use list::MtList;
pub use lock::{Cut, ElemGuard, LockedLink};
#[cfg(feature = "std")]
pub use relax::Yield;
pub use relax::{NoRelax, Relax, Spin};
pub use slot::Slot;

pub(crate) mod logging {
    #[cfg(feature = "std")]
    pub(crate) use log::trace;

    #[cfg(not(feature = "std"))]
    #[allow(unused_macros)]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    #[cfg(not(feature = "std"))]
    #[allow(unused_imports)]
    pub(crate) use trace;
}
