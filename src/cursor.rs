//! # Walking a list
//!
//! Two ways to visit the elements after a head:
//!
//! - [`Cursor`] (from [`MtList::cursor`]) holds the visited element and the
//!   links on both sides of it locked while the caller looks at it. The
//!   element cannot disappear under the caller, and the caller can take it out
//!   of the list with [`Cursor::remove`] without losing its place. Other
//!   threads keep working on the rest of the list.
//! - [`Iter`] (from [`MtList::iter`]) locks only one `next` slot at a time, for
//!   a single read. It is cheaper but gives weak guarantees: elements linked
//!   or removed concurrently may or may not be seen, and nothing keeps the
//!   current element alive.
//!
//! Neither ever yields the head itself, and neither sees a busy slot as an
//! end: they spin until the slot is released.
//!
//! ## Example
//! ```rust
//! use std::ptr::NonNull;
//! use axiom_mtlist::MtList;
//!
//! let head: MtList = MtList::new();
//! let nodes: Vec<MtList> = (0..4).map(|_| MtList::new()).collect();
//! for n in &nodes {
//!     unsafe { head.append(NonNull::from(n)) };
//! }
//!
//! // Drop every other element while walking.
//! let mut cursor = head.cursor();
//! let mut keep = true;
//! while cursor.next().is_some() {
//!     if !keep {
//!         cursor.remove();
//!     }
//!     keep = !keep;
//! }
//! drop(cursor);
//!
//! assert_eq!(head.cursor().count(), 2);
//! assert!(!nodes[1].in_list() && !nodes[3].in_list());
//! ```

use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::list::{link, MtList};
use crate::relax::{Relax, Spin};

/// A locking walk over a list. See the [module documentation](self).
///
/// While an element returned by [`next`](Iterator::next) is current, these
/// slots are held: the previous node's `next`, both of the element's own
/// slots, and the following node's `prev`. Between elements only the link
/// being crossed is held. Dropping the cursor releases everything.
///
/// Code running between two calls to `next` must not run list operations
/// that need those slots (such as deleting the current element directly).
/// They would spin forever.
#[must_use = "a cursor holds part of the list locked until dropped"]
pub struct Cursor<'a, R: Relax = Spin> {
    head: NonNull<MtList<R>>,
    /// Node whose `next` slot is held.
    prev: NonNull<MtList<R>>,
    /// Node whose `prev` slot is held.
    next: NonNull<MtList<R>>,
    /// Element isolated between `prev` and `next`, all four slots held.
    current: Option<NonNull<MtList<R>>>,
    done: bool,
    _list: PhantomData<&'a MtList<R>>,
}

impl<R: Relax> MtList<R> {
    /// Starts a locking walk over the elements after this head.
    pub fn cursor(&self) -> Cursor<'_, R> {
        let (prev, next) = self.lock_next().into_raw();
        Cursor {
            head: self.ptr(),
            prev,
            next,
            current: None,
            done: false,
            _list: PhantomData,
        }
    }

    /// Starts a weak walk over the elements after this link.
    ///
    /// The starting link itself is never yielded, so a walk from a detached
    /// link yields nothing.
    ///
    /// # Safety
    ///
    /// No link the walk reaches may be freed or moved before the walk is done
    /// with it, even if another thread detaches it meanwhile.
    pub unsafe fn iter(&self) -> Iter<'_, R> {
        Iter {
            head: self.ptr(),
            cur: self.ptr(),
            _list: PhantomData,
        }
    }
}

impl<R: Relax> Cursor<'_, R> {
    /// The element the cursor is on, if it has not been removed.
    #[inline]
    pub fn current(&self) -> Option<NonNull<MtList<R>>> {
        self.current
    }

    /// Detaches the current element and returns it.
    ///
    /// The cursor does not touch the element again, so the caller may reuse or
    /// free it right away. The walk continues with the element that followed
    /// it. Returns `None` if there is no current element.
    pub fn remove(&mut self) -> Option<NonNull<MtList<R>>> {
        let cur = self.current.take()?;
        // SAFETY: `cur` is isolated and all of its slots are held by us.
        unsafe { link(cur) }.put_self();
        Some(cur)
    }

    /// Puts the current element back between `prev` and itself, keeping the
    /// link after it held.
    fn restore(&mut self) {
        if let Some(cur) = self.current.take() {
            // SAFETY: `cur` and `prev` are linked, and we hold the slots we write.
            unsafe {
                link(cur).put_prev(self.prev);
                link(self.prev).put_next(cur);
            }
            self.prev = cur;
        }
    }

    /// Releases the link between `prev` and `next`.
    fn release(&mut self) {
        // SAFETY: both ends are linked and their facing slots are held by us.
        unsafe {
            link(self.next).put_prev(self.prev);
            link(self.prev).put_next(self.next);
        }
        self.done = true;
    }
}

impl<R: Relax> Iterator for Cursor<'_, R> {
    type Item = NonNull<MtList<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.restore();
        if self.next == self.head {
            self.release();
            return None;
        }

        let cur = self.next;
        // SAFETY: `cur` cannot be unlinked while we hold the link before it,
        // and its successor cannot be unlinked once we hold `cur.next`.
        let after = unsafe { link(cur) }.lock_next_slot();
        let back = unsafe { link(after) }.lock_prev_slot();
        debug_assert_eq!(back, cur);

        self.current = Some(cur);
        self.next = after;
        Some(cur)
    }
}

impl<R: Relax> FusedIterator for Cursor<'_, R> {}

impl<R: Relax> Drop for Cursor<'_, R> {
    fn drop(&mut self) {
        if !self.done {
            self.restore();
            self.release();
        }
    }
}

impl<R: Relax> fmt::Debug for Cursor<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("head", &self.head)
            .field("current", &self.current)
            .field("done", &self.done)
            .finish()
    }
}

/// A weak walk over a list. See the [module documentation](self).
///
/// Ends when it gets back to the link it started from, or when the element it
/// stands on has been detached by someone else.
pub struct Iter<'a, R = Spin> {
    head: NonNull<MtList<R>>,
    cur: NonNull<MtList<R>>,
    _list: PhantomData<&'a MtList<R>>,
}

impl<R: Relax> Iterator for Iter<'_, R> {
    type Item = NonNull<MtList<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: `cur` is the head or was reached from it; the caller of
        // `MtList::iter` keeps every reached link alive.
        let cur = unsafe { link(self.cur) };
        let n = cur.lock_next_slot();
        cur.put_next(n);

        if n == self.head || n == self.cur {
            return None;
        }
        self.cur = n;
        Some(n)
    }
}

impl<R> fmt::Debug for Iter<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("head", &self.head)
            .field("cur", &self.cur)
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::thread;
    use test_log::test;

    fn positions(head: &MtList, nodes: &[MtList]) -> Vec<usize> {
        head.cursor()
            .map(|l| nodes.iter().position(|n| n.ptr() == l).unwrap())
            .collect()
    }

    fn filled(head: &MtList, nodes: &[MtList]) {
        for n in nodes {
            unsafe { head.append(NonNull::from(n)) };
        }
    }

    #[test]
    fn cursor_on_empty_list() {
        let head: MtList = MtList::new();
        let mut cursor = head.cursor();
        assert!(head.next_slot().is_busy());
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
        drop(cursor);
        assert!(!head.is_busy());
    }

    #[test]
    fn cursor_visits_in_order() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..5).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        assert_eq!(positions(&head, &nodes), [0, 1, 2, 3, 4]);
        assert!(!head.is_busy());
        assert!(nodes.iter().all(|n| !n.is_busy()));
    }

    #[test]
    fn cursor_holds_current_element() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..3).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        let mut cursor = head.cursor();
        assert_eq!(cursor.next(), Some(nodes[0].ptr()));
        assert_eq!(cursor.current(), Some(nodes[0].ptr()));
        assert!(head.next_slot().is_busy());
        assert!(nodes[0].next_slot().is_busy() && nodes[0].prev_slot().is_busy());
        assert!(nodes[1].prev_slot().is_busy());
        assert!(!nodes[1].next_slot().is_busy());
    }

    #[test]
    fn cursor_remove_every_element() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..4).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        let mut cursor = head.cursor();
        let mut removed = 0;
        while cursor.next().is_some() {
            assert!(cursor.remove().is_some());
            assert!(cursor.remove().is_none());
            removed += 1;
        }
        drop(cursor);

        assert_eq!(removed, 4);
        assert!(head.is_empty());
        assert!(nodes.iter().all(|n| !n.in_list() && !n.is_busy()));
    }

    #[test]
    fn cursor_dropped_midway_restores_list() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..4).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        {
            let mut cursor = head.cursor();
            cursor.next();
            cursor.next();
        }
        {
            let mut cursor = head.cursor();
            cursor.next();
            cursor.next();
            cursor.remove();
        }

        assert_eq!(positions(&head, &nodes), [0, 2, 3]);
        assert!(!head.is_busy());
        assert!(nodes.iter().all(|n| !n.is_busy()));
    }

    #[test]
    fn cursor_remove_last_element() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..2).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        let mut cursor = head.cursor();
        let last = cursor.by_ref().last();
        assert_eq!(last, Some(nodes[1].ptr()));
        drop(cursor);

        let mut cursor = head.cursor();
        cursor.nth(1);
        assert_eq!(cursor.remove(), Some(nodes[1].ptr()));
        assert!(cursor.next().is_none());
        drop(cursor);
        assert_eq!(head.prev(), Some(nodes[0].ptr()));
    }

    #[test]
    fn iter_walks_without_holding() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..3).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        let mut iter = unsafe { head.iter() };
        assert_eq!(iter.next(), Some(nodes[0].ptr()));
        assert!(!head.is_busy() && !nodes[0].is_busy());
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn iter_stops_on_detached_element() {
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..3).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        let mut iter = unsafe { head.iter() };
        assert_eq!(iter.next(), Some(nodes[0].ptr()));
        assert!(nodes[0].delete());
        assert!(iter.next().is_none());
    }

    #[test]
    fn iter_from_detached_link_is_empty() {
        let lone: MtList = MtList::new();
        assert_eq!(unsafe { lone.iter() }.count(), 0);
    }

    #[test]
    fn concurrent_cursors_and_deletes() {
        const NODES: usize = 512;
        let head = MtList::new();
        let nodes: Vec<MtList> = (0..NODES).map(|_| MtList::new()).collect();
        filled(&head, &nodes);

        thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    for _ in 0..20 {
                        let walked = head.cursor().count();
                        assert!(walked <= NODES);
                    }
                });
            }
            s.spawn(|| {
                for n in nodes.iter().skip(1).step_by(2) {
                    n.delete();
                }
            });
            s.spawn(|| {
                let mut cursor = head.cursor();
                let mut seen = 0;
                while cursor.next().is_some() {
                    seen += 1;
                    if seen % 2 == 1 {
                        cursor.remove();
                    }
                }
            });
        });

        assert!(!head.is_busy());
        assert!(nodes.iter().all(|n| !n.is_busy()));
        let left = head.cursor().count();
        assert_eq!(left, nodes.iter().filter(|n| n.in_list()).count());
    }
}
