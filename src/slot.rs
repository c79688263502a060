//! # Slot
//!
//! One pointer field of an [`MtList`] (`next` or `prev`), and the spinlock it
//! doubles as.
//!
//! A slot holds one of three things:
//!
//! - the address of a neighbouring link,
//! - null, meaning "my own link" (a detached link or an empty head),
//! - [`MtList::BUSY`], meaning another thread owns the slot right now.
//!
//! Storing the self-reference as null keeps detached links free of
//! self-pointers, so they can be moved before they are linked. Every reader
//! maps null back to the owning link, so callers always see a detached link
//! pointing at itself.
//!
//! Locking is a compare-and-swap from the observed real value to `BUSY`
//! (`Acquire`); unlocking stores the new real value (`Release`). Whatever a
//! thread wrote before unlocking a slot is visible to the next thread that
//! locks it. There is no fairness and no reentrancy.

use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use crate::list::MtList;
use crate::relax::{retry, Relax};
use crate::sync::{AtomicPtr, Ordering::*};

/// A lockable link pointer. See the [module documentation](self).
#[repr(transparent)]
pub struct Slot<R> {
    ptr: AtomicPtr<MtList<R>>,
    _relax: PhantomData<fn() -> R>,
}

impl<R> Slot<R> {
    #[cfg(not(loom))]
    pub(crate) const fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _relax: PhantomData,
        }
    }

    #[cfg(loom)]
    pub(crate) fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _relax: PhantomData,
        }
    }

    /// The raw stored value: a neighbour, null for "self", or
    /// [`MtList::BUSY`].
    #[inline]
    pub fn value(&self) -> *mut MtList<R> {
        self.ptr.load(Acquire)
    }

    /// Whether some thread holds this slot locked right now.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.value() == MtList::<R>::BUSY
    }

    /// The neighbour this slot points at, or `None` while the slot is busy.
    #[inline]
    pub(crate) fn get(&self, owner: NonNull<MtList<R>>) -> Option<NonNull<MtList<R>>> {
        let cur = self.value();
        if cur == MtList::<R>::BUSY {
            None
        } else {
            Some(NonNull::new(cur).unwrap_or(owner))
        }
    }

    /// Takes the slot if it is free, returning the neighbour it pointed at.
    ///
    /// Fails without writing anything when the slot is busy or changed under
    /// us.
    #[inline]
    pub(crate) fn try_lock(&self, owner: NonNull<MtList<R>>) -> Option<NonNull<MtList<R>>> {
        let cur = self.ptr.load(Relaxed);
        if cur == MtList::<R>::BUSY {
            return None;
        }
        self.ptr
            .compare_exchange(cur, MtList::<R>::BUSY, Acquire, Relaxed)
            .ok()
            .map(|prev| NonNull::new(prev).unwrap_or(owner))
    }

    /// Stores `value` into a slot this thread holds, releasing it.
    #[inline]
    pub(crate) fn unlock(&self, owner: NonNull<MtList<R>>, value: NonNull<MtList<R>>) {
        debug_assert!(self.is_busy(), "unlocking a slot that is not locked");
        self.set(owner, value);
    }

    /// Stores `value` into a slot no other thread can reach yet.
    #[inline]
    pub(crate) fn set(&self, owner: NonNull<MtList<R>>, value: NonNull<MtList<R>>) {
        let raw = if value == owner {
            ptr::null_mut()
        } else {
            value.as_ptr()
        };
        self.ptr.store(raw, Release);
    }

    /// Resets the slot to "self" without looking at what it held.
    #[inline]
    pub(crate) fn clear(&self) {
        self.ptr.store(ptr::null_mut(), Release);
    }
}

impl<R: Relax> Slot<R> {
    /// Spins until the slot is taken, returning the neighbour it pointed at.
    #[inline]
    pub(crate) fn lock(&self, owner: NonNull<MtList<R>>) -> NonNull<MtList<R>> {
        retry::<R, _>(|| self.try_lock(owner))
    }
}

impl<R> fmt::Debug for Slot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cur = self.value();
        if cur == MtList::<R>::BUSY {
            f.write_str("Busy")
        } else if cur.is_null() {
            f.write_str("Self")
        } else {
            write!(f, "{cur:p}")
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::relax::Spin;
    use test_log::test;

    #[test]
    fn lock_returns_owner_for_self_slot() {
        let link: MtList = MtList::new();
        let me = NonNull::from(&link);
        let slot = link.next_slot();

        assert_eq!(slot.lock(me), me);
        assert!(slot.is_busy());
        assert!(slot.try_lock(me).is_none(), "busy slot must not be taken twice");

        slot.unlock(me, me);
        assert!(!slot.is_busy());
        assert!(slot.value().is_null(), "self is stored as null");
        assert_eq!(slot.get(me), Some(me));
    }

    #[test]
    fn unlock_publishes_new_neighbour() {
        let a: MtList<Spin> = MtList::new();
        let b: MtList<Spin> = MtList::new();
        let a_ptr = NonNull::from(&a);
        let b_ptr = NonNull::from(&b);

        let old = a.next_slot().lock(a_ptr);
        assert_eq!(old, a_ptr);
        a.next_slot().unlock(a_ptr, b_ptr);

        assert_eq!(a.next_slot().get(a_ptr), Some(b_ptr));
        assert_eq!(a.next_slot().value(), b_ptr.as_ptr());
        a.next_slot().clear();
        assert_eq!(a.next_slot().get(a_ptr), Some(a_ptr));
    }

    #[test]
    fn busy_slot_reads_as_none() {
        let link: MtList = MtList::new();
        let me = NonNull::from(&link);

        let _ = link.prev_slot().lock(me);
        assert_eq!(link.prev_slot().get(me), None);
        assert_eq!(format!("{:?}", link.prev_slot()), "Busy");
        link.prev_slot().unlock(me, me);
        assert_eq!(format!("{:?}", link.prev_slot()), "Self");
    }
}
