//! # Explicit link locks
//!
//! RAII guards over the slots that list operations lock internally, for callers
//! that need to inspect or rearrange a neighbourhood in several steps.
//!
//! - [`LockedLink`] holds the link between two adjacent nodes (both facing
//!   slots). Nothing can be inserted into or removed from that link while it
//!   is held.
//! - [`ElemGuard`] holds both slots of one node. The node cannot be removed,
//!   and nothing can be inserted directly next to it.
//! - [`Cut`] holds a node, its two slots and both facing neighbour slots. The
//!   node is effectively out of the list; it can be put back or detached for
//!   good.
//!
//! Every guard restores what it holds when dropped. As with any spinlock, keep
//! them short: other threads spin on the held slots, and the holding thread
//! itself deadlocks if it runs a list operation that needs one of them.
//!
//! ## Example
//! ```rust
//! use std::ptr::NonNull;
//! use axiom_mtlist::MtList;
//!
//! let head: MtList = MtList::new();
//! let a: MtList = MtList::new();
//! let b: MtList = MtList::new();
//! unsafe { head.append(NonNull::from(&a)) };
//!
//! // Insert `b` right after `a`, as one step with the link held.
//! let locked = a.lock_next();
//! assert_eq!(locked.next(), NonNull::from(&head));
//! unsafe { locked.splice(NonNull::from(&b)) };
//!
//! // Take `a` out, look around, then drop it from the list.
//! let cut = a.cut().unwrap();
//! assert_eq!(cut.next(), NonNull::from(&b));
//! cut.detach();
//! assert!(!a.in_list());
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

use crate::list::{link, MtList};
use crate::relax::{retry, Relax, Spin};

/// The locked link between two adjacent nodes, from
/// [`MtList::lock_next`] or [`MtList::lock_prev`].
///
/// `prev`'s `next` slot and `next`'s `prev` slot are held. Dropping the guard
/// releases both unchanged.
#[must_use = "dropping the guard releases the link immediately"]
pub struct LockedLink<'a, R = Spin> {
    prev: NonNull<MtList<R>>,
    next: NonNull<MtList<R>>,
    _list: PhantomData<&'a MtList<R>>,
}

impl<'a, R> LockedLink<'a, R> {
    /// The node before the held link.
    #[inline]
    pub fn prev(&self) -> NonNull<MtList<R>> {
        self.prev
    }

    /// The node after the held link.
    #[inline]
    pub fn next(&self) -> NonNull<MtList<R>> {
        self.next
    }

    /// Links the detached `el` into the held link, between
    /// [`prev`](Self::prev) and [`next`](Self::next), and releases it.
    ///
    /// # Safety
    ///
    /// Same contract as [`MtList::insert`].
    pub unsafe fn splice(self, el: NonNull<MtList<R>>) {
        // SAFETY: `el` is live and unpublished until the unlocks below.
        let new = unsafe { link(el) };
        debug_assert!(!new.in_list(), "splicing a link that is already in a list");
        let (prev, next) = self.into_raw();
        new.next_slot().set(el, next);
        new.prev_slot().set(el, prev);
        // SAFETY: both ends are linked and held by us.
        unsafe {
            link(next).put_prev(el);
            link(prev).put_next(el);
        }
    }

    /// Gives up the guard without releasing the held slots.
    pub(crate) fn into_raw(self) -> (NonNull<MtList<R>>, NonNull<MtList<R>>) {
        let ends = (self.prev, self.next);
        mem::forget(self);
        ends
    }

    /// Rebuilds a guard over slots the caller holds.
    ///
    /// # Safety
    ///
    /// `prev.next` and `next.prev` must be held by this thread and belong to
    /// the same link.
    pub(crate) unsafe fn from_raw(prev: NonNull<MtList<R>>, next: NonNull<MtList<R>>) -> Self {
        Self {
            prev,
            next,
            _list: PhantomData,
        }
    }
}

impl<R> Drop for LockedLink<'_, R> {
    fn drop(&mut self) {
        // SAFETY: both ends are linked and held by us.
        unsafe {
            link(self.next).put_prev(self.prev);
            link(self.prev).put_next(self.next);
        }
    }
}

impl<R> fmt::Debug for LockedLink<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedLink")
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Both slots of one node, from [`MtList::lock_elem`].
#[must_use = "dropping the guard releases the element immediately"]
pub struct ElemGuard<'a, R = Spin> {
    el: &'a MtList<R>,
    prev: NonNull<MtList<R>>,
    next: NonNull<MtList<R>>,
}

impl<R> ElemGuard<'_, R> {
    /// What the element's `prev` slot held when it was locked.
    #[inline]
    pub fn prev(&self) -> NonNull<MtList<R>> {
        self.prev
    }

    /// What the element's `next` slot held when it was locked.
    #[inline]
    pub fn next(&self) -> NonNull<MtList<R>> {
        self.next
    }

    /// Whether the element was detached when it was locked.
    #[inline]
    pub fn is_detached(&self) -> bool {
        let me = self.el.ptr();
        self.prev == me && self.next == me
    }
}

impl<R> Drop for ElemGuard<'_, R> {
    fn drop(&mut self) {
        self.el.put_prev(self.prev);
        self.el.put_next(self.next);
    }
}

impl<R> fmt::Debug for ElemGuard<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElemGuard")
            .field("el", &self.el.ptr())
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// A node isolated from its list, from [`MtList::cut`].
///
/// Dropping the guard puts the node back where it was; [`Cut::detach`] joins
/// its neighbours instead and leaves it detached.
#[must_use = "dropping the cut puts the element back immediately"]
pub struct Cut<'a, R = Spin> {
    el: &'a MtList<R>,
    prev: NonNull<MtList<R>>,
    next: NonNull<MtList<R>>,
}

impl<R> Cut<'_, R> {
    /// The node that preceded the cut element.
    #[inline]
    pub fn prev(&self) -> NonNull<MtList<R>> {
        self.prev
    }

    /// The node that followed the cut element.
    #[inline]
    pub fn next(&self) -> NonNull<MtList<R>> {
        self.next
    }

    /// Joins the neighbours to each other and leaves the element detached.
    pub fn detach(self) {
        let this = mem::ManuallyDrop::new(self);
        // SAFETY: both neighbours are linked and their facing slots are held.
        unsafe {
            link(this.next).put_prev(this.prev);
            link(this.prev).put_next(this.next);
        }
        this.el.put_self();
    }
}

impl<R> Drop for Cut<'_, R> {
    fn drop(&mut self) {
        let me = self.el.ptr();
        self.el.put_prev(self.prev);
        self.el.put_next(self.next);
        // SAFETY: both neighbours are linked and their facing slots are held.
        unsafe {
            link(self.next).put_prev(me);
            link(self.prev).put_next(me);
        }
    }
}

impl<R> fmt::Debug for Cut<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cut")
            .field("el", &self.el.ptr())
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

impl<R: Relax> MtList<R> {
    /// Locks the link between `self` and the node after it.
    pub fn lock_next(&self) -> LockedLink<'_, R> {
        let me = self.ptr();
        retry::<R, _>(|| {
            let n = self.take_next()?;
            // SAFETY: `n` is linked after `self`.
            match unsafe { link(n) }.take_prev() {
                Some(p) => {
                    debug_assert_eq!(p, me);
                    // SAFETY: we hold `self.next` and `n.prev`.
                    Some(unsafe { LockedLink::from_raw(me, n) })
                }
                None => {
                    self.put_next(n);
                    None
                }
            }
        })
    }

    /// Locks the link between the node before `self` and `self`.
    pub fn lock_prev(&self) -> LockedLink<'_, R> {
        let me = self.ptr();
        retry::<R, _>(|| {
            let p = self.take_prev()?;
            // SAFETY: `p` is linked before `self`.
            match unsafe { link(p) }.take_next() {
                Some(n) => {
                    debug_assert_eq!(n, me);
                    // SAFETY: we hold `p.next` and `self.prev`.
                    Some(unsafe { LockedLink::from_raw(p, me) })
                }
                None => {
                    self.put_prev(p);
                    None
                }
            }
        })
    }

    /// Locks both of `self`'s own slots.
    ///
    /// Works on detached links too; see [`ElemGuard::is_detached`].
    pub fn lock_elem(&self) -> ElemGuard<'_, R> {
        retry::<R, _>(|| {
            let next = self.take_next()?;
            let Some(prev) = self.take_prev() else {
                self.put_next(next);
                return None;
            };
            Some(ElemGuard {
                el: self,
                prev,
                next,
            })
        })
    }

    /// Isolates `self` from its list: its own slots and the facing slots of
    /// both neighbours are locked.
    ///
    /// Returns `None`, holding nothing, if `self` is detached.
    pub fn cut(&self) -> Option<Cut<'_, R>> {
        let me = self.ptr();
        retry::<R, _>(|| {
            let n = self.take_next()?;
            let Some(p) = self.take_prev() else {
                self.put_next(n);
                return None;
            };
            if p == me && n == me {
                self.put_self();
                return Some(None);
            }

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
            Some(Some(Cut {
                el: self,
                prev: p,
                next: n,
            }))
        })
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use test_log::test;

    fn order(head: &MtList, nodes: &[MtList]) -> Vec<usize> {
        head.cursor()
            .map(|l| nodes.iter().position(|n| n.ptr() == l).unwrap())
            .collect()
    }

    fn chain(head: &MtList, nodes: &[MtList]) {
        for n in nodes {
            unsafe { head.append(NonNull::from(n)) };
        }
    }

    #[test]
    fn locked_link_drop_restores_link() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..2).map(|_| MtList::new()).collect();
        chain(&head, &nodes);

        {
            let locked = nodes[0].lock_next();
            assert_eq!(locked.prev(), nodes[0].ptr());
            assert_eq!(locked.next(), nodes[1].ptr());
            assert!(nodes[0].next_slot().is_busy());
            assert!(nodes[1].prev_slot().is_busy());
        }

        assert!(!nodes[0].is_busy() && !nodes[1].is_busy());
        assert_eq!(order(&head, &nodes), [0, 1]);
    }

    #[test]
    fn lock_prev_then_splice() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..3).map(|_| MtList::new()).collect();
        chain(&head, &nodes[..2]);

        let locked = nodes[1].lock_prev();
        assert_eq!(locked.prev(), nodes[0].ptr());
        unsafe { locked.splice(NonNull::from(&nodes[2])) };

        assert_eq!(order(&head, &nodes), [0, 2, 1]);
        assert!(nodes.iter().all(|n| !n.is_busy()));
    }

    #[test]
    fn lock_next_on_empty_head_spans_head() {
        let head: MtList = MtList::new();
        let el = MtList::new();

        let locked = head.lock_next();
        assert_eq!(locked.prev(), head.ptr());
        assert_eq!(locked.next(), head.ptr());
        unsafe { locked.splice(NonNull::from(&el)) };

        assert_eq!(head.next(), Some(el.ptr()));
        assert_eq!(head.prev(), Some(el.ptr()));
    }

    #[test]
    fn elem_guard_reports_neighbours() {
        let head = MtList::new();
        let lone: MtList = MtList::new();
        let nodes: Vec<MtList> = (0..1).map(|_| MtList::new()).collect();
        chain(&head, &nodes);

        {
            let guard = nodes[0].lock_elem();
            assert_eq!(guard.prev(), head.ptr());
            assert_eq!(guard.next(), head.ptr());
            assert!(!guard.is_detached());
        }
        assert!(lone.lock_elem().is_detached());
        assert!(!lone.is_busy() && !nodes[0].is_busy());
    }

    #[test]
    fn elem_guard_blocks_delete_until_dropped() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..1).map(|_| MtList::new()).collect();
        chain(&head, &nodes);

        thread::scope(|s| {
            let guard = nodes[0].lock_elem();
            let deleter = s.spawn(|| nodes[0].delete());
            thread::sleep(Duration::from_millis(20));
            assert!(nodes[0].in_list(), "delete went through a held element");
            drop(guard);
            assert!(deleter.join().unwrap());
        });
        assert!(head.is_empty());
    }

    #[test]
    fn cut_drop_puts_element_back() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..3).map(|_| MtList::new()).collect();
        chain(&head, &nodes);

        {
            let cut = nodes[1].cut().unwrap();
            assert_eq!(cut.prev(), nodes[0].ptr());
            assert_eq!(cut.next(), nodes[2].ptr());
        }

        assert_eq!(order(&head, &nodes), [0, 1, 2]);
        assert!(nodes.iter().all(|n| !n.is_busy()));
    }

    #[test]
    fn cut_detach_removes_element() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..3).map(|_| MtList::new()).collect();
        chain(&head, &nodes);

        nodes[1].cut().unwrap().detach();

        assert_eq!(order(&head, &nodes), [0, 2]);
        assert!(!nodes[1].in_list());
        assert!(nodes[1].cut().is_none());
        assert!(!nodes[1].is_busy());
    }
}
