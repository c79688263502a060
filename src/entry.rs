//! Getting from a link back to the structure it is embedded in.

use core::ptr::NonNull;

use crate::list::MtList;

/// Returns a pointer to the `T` whose field at byte `offset` is `link`.
///
/// Prefer the [`mt_list_entry!`](crate::mt_list_entry) macro, which computes
/// the offset from the field name.
///
/// # Safety
///
/// `link` must really be the field at `offset` inside a live `T`.
#[inline(always)]
pub unsafe fn container_of<T, R>(link: NonNull<MtList<R>>, offset: usize) -> NonNull<T> {
    unsafe { link.byte_sub(offset).cast::<T>() }
}

/// Turns a `NonNull<MtList>` into a `NonNull` to the structure embedding it.
///
/// `mt_list_entry!(link, Type, field)` must be used inside `unsafe`: `link`
/// has to be the `field` of a live `Type`.
///
/// ```rust
/// use std::ptr::NonNull;
/// use axiom_mtlist::{mt_list_entry, MtList};
///
/// struct Conn {
///     fd: i32,
///     idle: MtList,
/// }
///
/// let idle: MtList = MtList::new();
/// let conn = Conn { fd: 7, idle: MtList::new() };
/// unsafe { idle.insert(NonNull::from(&conn.idle)) };
///
/// let first = idle.pop().unwrap();
/// let conn_ref = unsafe { mt_list_entry!(first, Conn, idle).as_ref() };
/// assert_eq!(conn_ref.fd, 7);
/// ```
#[macro_export]
macro_rules! mt_list_entry {
    ($link:expr, $container:ty, $field:ident) => {
        $crate::container_of::<$container, _>($link, ::core::mem::offset_of!($container, $field))
    };
}
