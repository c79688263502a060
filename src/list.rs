//! # MtList
//!
//! An intrusive, circular, doubly-linked list whose two link pointers are also
//! the list's locks.
//!
//! There is no list object separate from its nodes: an [`MtList`] is both a
//! list head and an element, embedded as a field in caller-owned structures.
//! Threads insert, remove and walk elements concurrently by locking only the
//! pointer [`Slot`]s a mutation touches, so operations on distant parts of a
//! list never contend.
//!
//! ## Locking
//!
//! A slot is locked by swapping its value for [`MtList::BUSY`]. Operations
//! that need several slots take them one by one with a non-blocking attempt;
//! if any slot is busy they put back everything already taken, relax (see
//! [`Relax`]), and start over. No thread ever waits while holding a slot
//! someone else needs, so operations cannot deadlock one another.
//!
//! ## Safety
//!
//! Links never own the structures they are embedded in. Linking is the one
//! `unsafe` step: whoever inserts a link promises that it, and the anchor it
//! is inserted next to, stay valid and do not move until it is detached
//! again. Everything reached through a linked neighbour relies on that promise.
//!
//! ## Example
//! ```rust
//! use std::ptr::NonNull;
//! use axiom_mtlist::{mt_list_entry, MtList};
//!
//! struct Job {
//!     id: u32,
//!     link: MtList,
//! }
//!
//! let queue: MtList = MtList::new();
//! let a = Job { id: 1, link: MtList::new() };
//! let b = Job { id: 2, link: MtList::new() };
//!
//! // SAFETY: `a`, `b` and `queue` outlive their membership and never move.
//! unsafe {
//!     queue.append(NonNull::from(&a.link));
//!     queue.append(NonNull::from(&b.link));
//! }
//!
//! let first = queue.pop().unwrap();
//! // SAFETY: `first` is the `link` field of a live `Job`.
//! let job = unsafe { mt_list_entry!(first, Job, link).as_ref() };
//! assert_eq!(job.id, 1);
//! assert!(b.link.delete());
//! assert!(queue.is_empty());
//! ```

use core::fmt;
use core::marker::PhantomPinned;
use core::ptr::{self, NonNull};

use crate::relax::{retry, Relax, Spin};
use crate::slot::Slot;

/// A list head or list element. See the [module documentation](self).
///
/// `R` picks how threads wait on busy slots of this list; every link of one
/// list must use the same `R`.
#[repr(C)]
pub struct MtList<R = Spin> {
    next: Slot<R>,
    prev: Slot<R>,
    _pin: PhantomPinned,
}

/// Borrows a linked neighbour.
///
/// # Safety
///
/// `link` must point at a live `MtList`. Any link currently reachable through a
/// cycle is live, by the insertion contract.
#[inline(always)]
pub(crate) unsafe fn link<'a, R>(link: NonNull<MtList<R>>) -> &'a MtList<R> {
    unsafe { link.as_ref() }
}

impl<R> MtList<R> {
    /// The value of a locked slot. Never a valid link address.
    pub const BUSY: *mut Self = ptr::without_provenance_mut(1);

    /// Creates a detached link, which is also an empty list head.
    ///
    /// This is a `const fn`, so heads can live in `static`s.
    #[cfg(not(loom))]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: Slot::new(),
            prev: Slot::new(),
            _pin: PhantomPinned,
        }
    }

    #[cfg(loom)]
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: Slot::new(),
            prev: Slot::new(),
            _pin: PhantomPinned,
        }
    }

    /// Forces this link back to the detached state.
    ///
    /// # Safety
    ///
    /// The link must not be a member of any list, and no other thread may be
    /// operating on it. Resetting a linked node leaves its neighbours pointing
    /// at it.
    pub unsafe fn init(&self) {
        self.next.clear();
        self.prev.clear();
    }

    #[inline(always)]
    pub(crate) fn ptr(&self) -> NonNull<Self> {
        NonNull::from(self)
    }

    /// The `next` slot, for inspection.
    #[inline]
    pub fn next_slot(&self) -> &Slot<R> {
        &self.next
    }

    /// The `prev` slot, for inspection.
    #[inline]
    pub fn prev_slot(&self) -> &Slot<R> {
        &self.prev
    }

    /// The following link, or `None` while the `next` slot is locked.
    ///
    /// A detached link and an empty head return themselves.
    #[inline]
    pub fn next(&self) -> Option<NonNull<Self>> {
        self.next.get(self.ptr())
    }

    /// The preceding link, or `None` while the `prev` slot is locked.
    #[inline]
    pub fn prev(&self) -> Option<NonNull<Self>> {
        self.prev.get(self.ptr())
    }

    /// Whether this head has no elements.
    ///
    /// A head whose `next` slot is locked at this instant counts as non-empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let next = self.next.value();
        next.is_null() || next == self.ptr().as_ptr()
    }

    /// Whether this link is a member of some list.
    #[inline]
    pub fn in_list(&self) -> bool {
        !self.is_empty()
    }

    /// Whether either slot of this link is locked right now.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.next.is_busy() || self.prev.is_busy()
    }

    #[inline(always)]
    pub(crate) fn take_next(&self) -> Option<NonNull<Self>> {
        self.next.try_lock(self.ptr())
    }

    #[inline(always)]
    pub(crate) fn take_prev(&self) -> Option<NonNull<Self>> {
        self.prev.try_lock(self.ptr())
    }

    #[inline(always)]
    pub(crate) fn put_next(&self, value: NonNull<Self>) {
        self.next.unlock(self.ptr(), value);
    }

    #[inline(always)]
    pub(crate) fn put_prev(&self, value: NonNull<Self>) {
        self.prev.unlock(self.ptr(), value);
    }

    /// Detaches a link whose two slots this thread holds.
    #[inline(always)]
    pub(crate) fn put_self(&self) {
        let me = self.ptr();
        self.put_prev(me);
        self.put_next(me);
    }
}

impl<R: Relax> MtList<R> {
    /// Spins until `next` is locked, returning what it pointed at.
    #[inline]
    pub(crate) fn lock_next_slot(&self) -> NonNull<Self> {
        self.next.lock(self.ptr())
    }

    /// Spins until `prev` is locked, returning what it pointed at.
    #[inline]
    pub(crate) fn lock_prev_slot(&self) -> NonNull<Self> {
        self.prev.lock(self.ptr())
    }

    /// Links the detached `el` right after `self`.
    ///
    /// On a list head this pushes `el` to the front.
    ///
    /// # Safety
    ///
    /// `el` must point at a live, detached link that no other thread touches
    /// until this returns. Both `el` and `self` must stay valid and must not
    /// move for as long as `el` is linked. Once linked, `el` may be popped and
    /// freed by another thread before this call returns; it is taken as a raw
    /// pointer so that is allowed.
    pub unsafe fn insert(&self, el: NonNull<Self>) {
        // SAFETY: `el` is live and unpublished until the unlocks below.
        let new = unsafe { link(el) };
        debug_assert!(!new.in_list(), "inserting a link that is already in a list");

        retry::<R, _>(|| {
            let n = self.take_next()?;
            // SAFETY: `n` is linked after `self`.
            let next = unsafe { link(n) };
            let Some(p) = next.take_prev() else {
                self.put_next(n);
                return None;
            };
            debug_assert_eq!(p, self.ptr());

            new.next.set(el, n);
            new.prev.set(el, p);
            next.put_prev(el);
            self.put_next(el);
            Some(())
        })
    }

    /// Links the detached `el` right before `self`.
    ///
    /// On a list head this pushes `el` to the back.
    ///
    /// # Safety
    ///
    /// Same contract as [`insert`](Self::insert).
    pub unsafe fn append(&self, el: NonNull<Self>) {
        // SAFETY: `el` is live and unpublished until the unlocks below.
        let new = unsafe { link(el) };
        debug_assert!(!new.in_list(), "appending a link that is already in a list");

        retry::<R, _>(|| {
            let p = self.take_prev()?;
            // SAFETY: `p` is linked before `self`.
            let prev = unsafe { link(p) };
            let Some(n) = prev.take_next() else {
                self.put_prev(p);
                return None;
            };
            debug_assert_eq!(n, self.ptr());

            new.next.set(el, n);
            new.prev.set(el, p);
            prev.put_next(el);
            self.put_prev(el);
            Some(())
        })
    }

    /// Links `el` right after `self` unless `el` is already in a list.
    ///
    /// Unlike [`insert`](Self::insert), `el`'s own slots are locked as well, so
    /// several threads may race to link the same element; exactly one wins.
    /// Returns `true` if `el` was linked by this call.
    ///
    /// # Safety
    ///
    /// `el` must point at a live link. If this returns `true`, `el` and `self`
    /// must stay valid and must not move for as long as `el` is linked.
    pub unsafe fn try_insert(&self, el: NonNull<Self>) -> bool {
        retry::<R, _>(|| {
            let n = self.take_next()?;
            // SAFETY: `n` is linked after `self`.
            let next = unsafe { link(n) };
            let Some(p) = next.take_prev() else {
                self.put_next(n);
                return None;
            };

            // One of `el`'s slots is already held by us: it is `self` or the
            // node right after it.
            let linked = if n == el || p == el {
                Some(false)
            } else {
                // SAFETY: `el` is live; it is only dereferenced before publishing.
                match lock_detached(unsafe { link(el) }) {
                    Claim::Detached => {
                        let new = unsafe { link(el) };
                        new.put_next(n);
                        new.put_prev(p);
                        next.put_prev(el);
                        self.put_next(el);
                        return Some(true);
                    }
                    Claim::Linked => Some(false),
                    Claim::Busy => None,
                }
            };
            next.put_prev(p);
            self.put_next(n);
            linked
        })
    }

    /// Links `el` right before `self` unless `el` is already in a list.
    ///
    /// The counterpart of [`try_insert`](Self::try_insert) at the back.
    ///
    /// # Safety
    ///
    /// Same contract as [`try_insert`](Self::try_insert).
    pub unsafe fn try_append(&self, el: NonNull<Self>) -> bool {
        retry::<R, _>(|| {
            let p = self.take_prev()?;
            // SAFETY: `p` is linked before `self`.
            let prev = unsafe { link(p) };
            let Some(n) = prev.take_next() else {
                self.put_prev(p);
                return None;
            };

            // `el` is `self` or the current tail.
            let linked = if n == el || p == el {
                Some(false)
            } else {
                // SAFETY: `el` is live; it is only dereferenced before publishing.
                match lock_detached(unsafe { link(el) }) {
                    Claim::Detached => {
                        let new = unsafe { link(el) };
                        new.put_next(n);
                        new.put_prev(p);
                        prev.put_next(el);
                        self.put_prev(el);
                        return Some(true);
                    }
                    Claim::Linked => Some(false),
                    Claim::Busy => None,
                }
            };
            prev.put_next(n);
            self.put_prev(p);
            linked
        })
    }

    /// Detaches `self` from whatever list it is in.
    ///
    /// Returns `false` without doing anything if `self` was already detached.
    /// Afterwards `self.next()` and `self.prev()` both return `self`.
    pub fn delete(&self) -> bool {
        let me = self.ptr();

        retry::<R, _>(|| {
            let n = self.take_next()?;
            let Some(p) = self.take_prev() else {
                self.put_next(n);
                return None;
            };
            if p == me && n == me {
                self.put_self();
                return Some(false);
            }
            debug_assert!(p != me && n != me, "half-linked element");

            // SAFETY: the neighbours of a linked element are live.
            let (prev, next) = unsafe { (link(p), link(n)) };
            if prev.take_next().is_none() {
                self.put_prev(p);
                self.put_next(n);
                return None;
            }
            if next.take_prev().is_none() {
                prev.put_next(me);
                self.put_prev(p);
                self.put_next(n);
                return None;
            }

            next.put_prev(p);
            prev.put_next(n);
            self.put_self();
            Some(true)
        })
    }

    /// Detaches and returns the first element after this head.
    ///
    /// Returns `None` if the list is empty. The element is read and detached in
    /// one critical section, so it was a member when the call observed it.
    pub fn pop(&self) -> Option<NonNull<Self>> {
        let me = self.ptr();

        retry::<R, _>(|| {
            let n = self.take_next()?;
            if n == me {
                self.put_next(n);
                return Some(None);
            }

            // SAFETY: `n` is linked after `self`.
            let first = unsafe { link(n) };
            let Some(p) = first.take_prev() else {
                self.put_next(n);
                return None;
            };
            debug_assert_eq!(p, me);
            let Some(n2) = first.take_next() else {
                first.put_prev(p);
                self.put_next(n);
                return None;
            };
            // SAFETY: `n2` is linked after `first`.
            let after = unsafe { link(n2) };
            if after.take_prev().is_none() {
                first.put_next(n2);
                first.put_prev(p);
                self.put_next(n);
                return None;
            }

            after.put_prev(me);
            self.put_next(n2);
            first.put_self();
            Some(Some(n))
        })
    }

    /// Detaches every element at once, leaving this head empty.
    ///
    /// The former elements stay linked to each other as a cycle without a head;
    /// the first of them is returned, or `None` if the list was empty. A single
    /// former element comes back detached.
    pub fn behead(&self) -> Option<NonNull<Self>> {
        let me = self.ptr();

        retry::<R, _>(|| {
            let p = self.take_prev()?;
            if p == me {
                self.put_prev(p);
                return Some(None);
            }
            let Some(n) = self.take_next() else {
                self.put_prev(p);
                return None;
            };
            if n == me {
                self.put_next(n);
                self.put_prev(p);
                return Some(None);
            }

            // SAFETY: `n` and `p` are the first and last elements.
            let (first, last) = unsafe { (link(n), link(p)) };
            if first.take_prev().is_none() {
                self.put_next(n);
                self.put_prev(p);
                return None;
            }
            if last.take_next().is_none() {
                first.put_prev(me);
                self.put_next(n);
                self.put_prev(p);
                return None;
            }

            self.put_self();
            first.put_prev(p);
            last.put_next(n);
            Some(Some(n))
        })
    }
}

/// Outcome of trying to claim an element's own slots for linking.
enum Claim {
    /// Both slots are now held and `el` was detached.
    Detached,
    /// `el` is already a member somewhere; nothing is held.
    Linked,
    /// A slot was busy; nothing is held.
    Busy,
}

fn lock_detached<R>(el: &MtList<R>) -> Claim {
    let me = el.ptr();
    let Some(n) = el.take_next() else {
        return Claim::Busy;
    };
    if n != me {
        el.put_next(n);
        return Claim::Linked;
    }
    match el.take_prev() {
        None => {
            el.put_next(n);
            Claim::Busy
        }
        Some(p) if p != me => {
            el.put_prev(p);
            el.put_next(n);
            Claim::Linked
        }
        Some(_) => Claim::Detached,
    }
}

impl<R> Default for MtList<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for MtList<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MtList")
            .field("self", &self.ptr())
            .field("next", &self.next)
            .field("prev", &self.prev)
            .finish()
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    struct Shared {
        head: MtList,
        a: MtList,
        b: MtList,
    }

    fn shared() -> Arc<Shared> {
        Arc::new(Shared {
            head: MtList::new(),
            a: MtList::new(),
            b: MtList::new(),
        })
    }

    #[test]
    fn racing_inserts() {
        loom::model(|| {
            let s = shared();
            let s2 = s.clone();
            let t = thread::spawn(move || unsafe { s2.head.insert(NonNull::from(&s2.a)) });
            unsafe { s.head.append(NonNull::from(&s.b)) };
            t.join().unwrap();

            assert!(s.a.in_list() && s.b.in_list());
            assert!(!s.head.is_busy());
            assert_eq!(s.head.cursor().count(), 2);
        });
    }

    #[test]
    fn delete_races_pop() {
        loom::model(|| {
            let s = shared();
            unsafe {
                s.head.append(NonNull::from(&s.a));
                s.head.append(NonNull::from(&s.b));
            }
            let s2 = s.clone();
            let t = thread::spawn(move || s2.b.delete());
            let popped = s.head.pop();
            assert!(t.join().unwrap());

            assert_eq!(popped, Some(s.a.ptr()));
            assert!(s.head.is_empty());
            assert!(!s.a.in_list() && !s.b.in_list());
        });
    }

    #[test]
    fn try_insert_same_element_once() {
        loom::model(|| {
            let s = shared();
            let s2 = s.clone();
            let t = thread::spawn(move || unsafe { s2.head.try_insert(NonNull::from(&s2.a)) });
            let here = unsafe { s.head.try_append(NonNull::from(&s.a)) };
            let there = t.join().unwrap();

            assert!(here ^ there, "exactly one thread links the element");
            assert_eq!(s.head.cursor().count(), 1);
        });
    }
}
