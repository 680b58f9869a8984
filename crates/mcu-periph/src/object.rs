//! Single-block allocation of a public struct plus backend-private storage.
//!
//! Layout of one block, every region rounded up to pointer alignment:
//!
//! ```text
//! +--------+----------------+-----------------+
//! | header | public (size0) | private (size1) |
//! +--------+----------------+-----------------+
//!          ^ returned pointer
//! ```
//!
//! The header records the payload size (public + private) so [`release`]
//! can scrub exactly those bytes before handing the block back.

use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use std::alloc;

use tracing::error;

use crate::error::{Error, Result};

/// Alignment of every region in a block.
pub const ALIGN: usize = align_of::<*mut u8>();

#[repr(C)]
struct Header {
    size: usize,
}

const HEADER: usize = size_of::<Header>().next_multiple_of(ALIGN);

/// Round `n` up to a multiple of `align` (a power of two), or `None` if
/// that does not fit in a `usize`.
pub const fn align_up(n: usize, align: usize) -> Option<usize> {
    match n.checked_add(align - 1) {
        Some(end) => Some(end & !(align - 1)),
        None => None,
    }
}

fn block_layout(payload: usize) -> Result<Layout> {
    let total = HEADER.checked_add(payload).ok_or(Error::NoMemory)?;
    // The alignment is always valid, so only an oversized block fails here.
    Layout::from_size_align(total, ALIGN).map_err(|_| Error::NoMemory)
}

/// Allocate a zeroed block holding a `size0` public region and an optional
/// `size1` private region.
///
/// When `size1 > 0` the address of the private region is written as a
/// pointer at byte `offset` of the public region, which must leave room for
/// it. The returned pointer must be given back to [`release`].
pub fn allocate(size0: usize, offset: usize, size1: usize) -> Result<NonNull<u8>> {
    let size0 = align_up(size0, ALIGN).ok_or(Error::NoMemory)?;
    let size1 = align_up(size1, ALIGN).ok_or(Error::NoMemory)?;
    if size1 > 0 {
        let end = offset
            .checked_add(size_of::<*mut u8>())
            .ok_or(Error::InvalidParam)?;
        if offset % ALIGN != 0 || end > size0 {
            return Err(Error::InvalidParam);
        }
    }
    let payload = size0.checked_add(size1).ok_or(Error::NoMemory)?;
    let layout = block_layout(payload)?;

    // SAFETY: `layout` has non-zero size (the header alone is non-empty).
    let base = unsafe { alloc::alloc_zeroed(layout) };
    let Some(base) = NonNull::new(base) else {
        error!(payload, "object allocation failed");
        return Err(Error::NoMemory);
    };

    // SAFETY: the block is at least `HEADER + payload` bytes, aligned to
    // `ALIGN`, so the header slot and both regions are in bounds and aligned.
    unsafe {
        base.as_ptr().cast::<Header>().write(Header { size: payload });
        let public = base.as_ptr().add(HEADER);
        if size1 > 0 {
            let private = public.add(size0);
            public.add(offset).cast::<*mut u8>().write(private);
        }
        Ok(NonNull::new_unchecked(public))
    }
}

/// Zero the payload of a block in place, returning how many bytes were
/// cleared. The block stays allocated.
///
/// # Safety
///
/// `public` must have come from [`allocate`] and not yet been released.
pub unsafe fn scrub(public: NonNull<u8>) -> usize {
    let header = public.as_ptr().sub(HEADER).cast::<Header>();
    let size = (*header).size;
    ptr::write_bytes(public.as_ptr(), 0, size);
    size
}

/// Scrub and free a block. A null pointer is ignored.
///
/// # Safety
///
/// A non-null `public` must have come from [`allocate`] and must not be
/// used again afterwards.
pub unsafe fn release(public: *mut u8) {
    let Some(public) = NonNull::new(public) else {
        return;
    };
    let size = scrub(public);
    let base = public.as_ptr().sub(HEADER);
    // The layout was valid at allocation time with the same payload size.
    if let Ok(layout) = block_layout(size) {
        alloc::dealloc(base, layout);
    }
}

/// Owned value living in a block from [`allocate`].
///
/// Dropping the box drops the value, zeroes its storage and frees the
/// block. Backends keep their private state in one of these so nothing they
/// held (daemon addresses, device paths) lingers in freed memory.
pub struct ObjectBox<T> {
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

// SAFETY: ObjectBox uniquely owns its T, like Box<T>.
unsafe impl<T: Send> Send for ObjectBox<T> {}
// SAFETY: shared access only hands out &T.
unsafe impl<T: Sync> Sync for ObjectBox<T> {}

impl<T> ObjectBox<T> {
    /// Move `value` into a fresh block.
    ///
    /// Types aligned more strictly than a pointer are rejected with
    /// [`Error::InvalidParam`].
    pub fn new(value: T) -> Result<Self> {
        if align_of::<T>() > ALIGN {
            return Err(Error::InvalidParam);
        }
        let raw = allocate(size_of::<T>(), 0, 0)?;
        let ptr = raw.cast::<T>();
        // SAFETY: the region is at least size_of::<T>() bytes and aligned
        // to ALIGN >= align_of::<T>().
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self { ptr, _owns: PhantomData })
    }
}

impl<T> Deref for ObjectBox<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: initialised in `new`, dropped only in `drop`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for ObjectBox<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as for Deref, and `&mut self` guarantees uniqueness.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for ObjectBox<T> {
    fn drop(&mut self) {
        // SAFETY: the value is live and the block came from `allocate`;
        // neither is touched again after this.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            release(self.ptr.as_ptr().cast::<u8>());
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for ObjectBox<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        (**self).fmt(f)
    }
}
