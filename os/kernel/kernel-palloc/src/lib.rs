//! # Physical page allocator
//!
//! Hands out whole 4096-byte pages of physical memory for page tables, kernel
//! stacks, and user memory. Free pages are partitioned into **one free list
//! per core**, each behind its own short spin lock, so the allocation fast
//! path never crosses a core-shared lock. When the local list runs dry the
//! allocator probes the other cores' lists round-robin and steals a single
//! page from the first non-empty one; only a system-wide out-of-memory
//! condition is reported to the caller.
//!
//! Free pages carry no metadata of their own: each one is threaded into its
//! list through a run header written into the page itself, the same trick the
//! heap free list uses for block headers.
//!
//! ## Diagnostics
//!
//! Page contents are deliberately clobbered on both transitions — freed pages
//! are filled with [`FREE_FILL`], allocated pages with [`ALLOC_FILL`]. A read
//! through a dangling reference or of uninitialized memory then shows a
//! recognizable pattern instead of plausible stale data. The two patterns are
//! distinct and non-zero so the two bug classes are distinguishable.
//!
//! ## Core identity
//!
//! Every `alloc`/`free` call pins the task to its core for the duration of the
//! list access (see [`kernel_cpu::PinnedCore`]); "the calling core's list"
//! would otherwise be a moving target.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod allocator;
mod page;

pub use allocator::{AllocError, PageAllocator};
pub use page::Page;

/// Size of one physical page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Byte written across a page as it is freed.
pub const FREE_FILL: u8 = 0x01;

/// Byte written across a page as it is allocated.
pub const ALLOC_FILL: u8 = 0x05;
