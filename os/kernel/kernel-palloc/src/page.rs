use crate::PAGE_SIZE;
use core::fmt;
use core::ptr::NonNull;

/// An owned, page-aligned 4096-byte physical page.
///
/// A `Page` is a linear token: it is produced by
/// [`PageAllocator::alloc`](crate::PageAllocator::alloc) (or forged from a
/// known-good address during bootstrap), cannot be cloned, and is consumed by
/// [`PageAllocator::free`](crate::PageAllocator::free). While the token
/// exists, its holder has exclusive access to the page's bytes.
pub struct Page {
    base: NonNull<u8>,
}

// Safety: the holder is the page's only owner; the bytes may move cores with it.
unsafe impl Send for Page {}

impl Page {
    /// Wrap a raw page base address.
    ///
    /// # Safety
    /// - `base` must point to `PAGE_SIZE` bytes of valid, writable memory that
    ///   nothing else references.
    /// - `base` must be page-aligned and must stay valid until the page is
    ///   handed back via [`PageAllocator::free`](crate::PageAllocator::free).
    pub const unsafe fn from_raw(base: NonNull<u8>) -> Self {
        Self { base }
    }

    /// Consume the token, returning the raw base pointer.
    pub const fn into_raw(self) -> NonNull<u8> {
        self.base
    }

    /// Base address of the page.
    #[inline]
    pub fn addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Raw base pointer.
    #[inline]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// The page's bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        // Safety: owner has exclusive access for the token's lifetime.
        unsafe { &*self.base.as_ptr().cast() }
    }

    /// The page's bytes, mutably.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        // Safety: as above, plus `&mut self`.
        unsafe { &mut *self.base.as_ptr().cast() }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:#x})", self.addr())
    }
}
