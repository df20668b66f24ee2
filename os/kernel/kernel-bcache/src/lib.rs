//! # Disk-block buffer cache
//!
//! Keeps in-memory copies of disk blocks so repeated accesses skip the device,
//! and doubles as the synchronization point for blocks shared between tasks:
//! whoever holds a buffer's guard has exclusive use of that block's bytes.
//!
//! ## Shape
//!
//! The cache is a fixed pool of `N_BUF` buffer slots, never grown or shrunk.
//! Three structures index it:
//!
//! - a hash table of [`N_BUCKET`] chains keyed by `blockno % N_BUCKET`, each
//!   chain behind its own spin lock, so lookups of different blocks rarely
//!   contend;
//! - one global **recency list** with exactly one record per slot, ordered by
//!   how recently each buffer was released — this list, not any per-bucket
//!   order, decides who gets evicted;
//! - per-slot metadata (identity, validity, reference count) plus the payload
//!   behind a blocking exclusive lock.
//!
//! ## Lock discipline
//!
//! - Bucket locks guard only their chain and the metadata of slots currently
//!   chained there. Short holds, no sleeping.
//! - A single **eviction lock** (which owns the recency list) serializes every
//!   cache-miss recycle system-wide. That serialization — not bucket-id
//!   ordering — is what makes the two-bucket hand-off during relocation
//!   deadlock-free.
//! - The release path takes the eviction lock first, then the owning bucket's
//!   lock, the one fixed order shared with the eviction path.
//! - The per-buffer exclusive lock is a sleep lock and is the only lock held
//!   across the disk transfer.
//!
//! ## Interface
//!
//! [`BufCache::read`] returns a [`BufGuard`]; dropping the guard releases the
//! buffer and marks it most recently used. [`BufCache::write`] flushes a held
//! buffer. [`BufGuard::pin`] keeps a buffer cache-resident without holding its
//! exclusive lock, for callers (a journal, say) that revisit a block across
//! several lock/unlock cycles.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod bucket;
mod cache;
mod device;
mod recency;

pub use cache::{BufCache, BufGuard, BufPin};
pub use device::BlockDevice;

/// Number of hash chains in the bucket table.
pub const N_BUCKET: usize = 13;

/// Size of one disk block in bytes.
pub const BLOCK_SIZE: usize = 1024;
