use crate::bucket::{Bucket, ChainEntry};
use crate::device::BlockDevice;
use crate::recency::RecencyList;
use crate::{BLOCK_SIZE, N_BUCKET};
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use kernel_sync::{SleepLock, SleepLockGuard, SpinLock};
use log::{debug, trace};

/// One buffer slot: block metadata plus the payload behind its exclusive lock.
///
/// The metadata fields are atomics not because they are touched lock-free but
/// because different locks guard them at different times: identity and
/// reference count change under the owning bucket's lock, validity is cleared
/// during recycle (eviction + bucket locks held) and set by `read` while only
/// the exclusive lock is held.
struct Slot {
    dev: AtomicU32,
    blockno: AtomicU32,
    /// Active holders; zero means eligible for eviction.
    refcnt: AtomicU32,
    /// Whether the payload holds the block's current disk contents.
    valid: AtomicBool,
    data: SleepLock<[u8; BLOCK_SIZE]>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU32::new(0),
            refcnt: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            data: SleepLock::new([0; BLOCK_SIZE]),
        }
    }
}

fn bucket_of(blockno: u32) -> usize {
    blockno as usize % N_BUCKET
}

/// Fixed-capacity buffer cache over a [`BlockDevice`].
///
/// `N_BUF` buffer slots are allocated once and only ever change identity
/// through eviction. See the crate docs for the lock discipline.
pub struct BufCache<D, const N_BUF: usize> {
    device: D,
    buckets: [SpinLock<Bucket<N_BUF>>; N_BUCKET],
    /// The eviction lock. Owns the recency list; serializes every recycle.
    recency: SpinLock<RecencyList<N_BUF>>,
    slots: [Slot; N_BUF],
}

impl<D: BlockDevice, const N_BUF: usize> BufCache<D, N_BUF> {
    /// Build the cache: all locks, all slots, initial linkage.
    ///
    /// Every slot starts chained in bucket 0 with identity `(0, 0)` and an
    /// unloaded payload; first misses pull them apart through the normal
    /// eviction path.
    pub fn new(device: D) -> Self {
        assert!(N_BUF > 0, "buffer cache needs at least one slot");
        let mut cache = Self {
            device,
            buckets: [const { SpinLock::new(Bucket::new()) }; N_BUCKET],
            recency: SpinLock::new(RecencyList::new()),
            slots: [const { Slot::new() }; N_BUF],
        };
        let bucket0 = cache.buckets[0].get_mut();
        for slot in 0..N_BUF {
            bucket0.insert(ChainEntry {
                slot,
                dev: 0,
                blockno: 0,
            });
        }
        cache
    }

    /// Return a locked buffer holding the contents of `blockno` on `dev`.
    ///
    /// Cache hit: no device traffic. Miss: the least recently released idle
    /// buffer is recycled and the block is read from the device. Concurrent
    /// callers for the same block serialize on the buffer's exclusive lock;
    /// the guard may be held across further I/O.
    ///
    /// # Panics
    /// If every buffer in the pool is in use. There is no wait-for-a-buffer
    /// mechanism; a fully pinned cache is an unrecoverable kernel fault.
    pub fn read(&self, dev: u32, blockno: u32) -> BufGuard<'_, D, N_BUF> {
        let (slot, mut data) = self.get(dev, blockno);
        let meta = &self.slots[slot];
        if !meta.valid.load(Ordering::Acquire) {
            // May suspend; only this buffer's exclusive lock is held.
            self.device.read_block(dev, blockno, &mut data);
            meta.valid.store(true, Ordering::Release);
        }
        BufGuard {
            cache: self,
            slot,
            data: ManuallyDrop::new(data),
        }
    }

    /// Write a held buffer's payload to the device.
    ///
    /// Taking the guard makes the "caller holds the exclusive lock"
    /// precondition structural. Validity and the reference count are left
    /// untouched.
    pub fn write(&self, buf: &BufGuard<'_, D, N_BUF>) {
        self.device.write_block(buf.dev(), buf.blockno(), buf);
    }

    /// Look up or recycle a slot for (dev, blockno) and lock its payload.
    fn get(&self, dev: u32, blockno: u32) -> (usize, SleepLockGuard<'_, [u8; BLOCK_SIZE]>) {
        let target = bucket_of(blockno);

        // Fast path: only the target bucket's lock. The bump happens under
        // it, then the (possibly long) wait for the exclusive lock happens
        // with no spin lock held.
        {
            let chain = self.buckets[target].lock();
            if let Some(slot) = chain.find(dev, blockno) {
                self.slots[slot].refcnt.fetch_add(1, Ordering::Relaxed);
                drop(chain);
                trace!("bcache: hit dev {dev} block {blockno}");
                return (slot, self.slots[slot].data.lock());
            }
        }
        trace!("bcache: miss dev {dev} block {blockno}");

        // Slow path. All recycles serialize here; that guarantee is what
        // makes the two-bucket hand-off below safe, since no second thread
        // can be taking the same pair of bucket locks in the other order.
        let mut lru = self.recency.lock();

        // A racing miss may have cached the block while we waited for the
        // eviction lock; recycling a second slot for it would break the
        // one-buffer-per-block invariant.
        {
            let chain = self.buckets[target].lock();
            if let Some(slot) = chain.find(dev, blockno) {
                self.slots[slot].refcnt.fetch_add(1, Ordering::Relaxed);
                drop(chain);
                drop(lru);
                return (slot, self.slots[slot].data.lock());
            }
        }

        // Walk coldest to warmest and recycle the first buffer nobody holds.
        let mut record = lru.coldest();
        while let Some(rec) = record {
            let victim_no = lru.blockno(rec);
            let owner = bucket_of(victim_no);
            let mut chain = self.buckets[owner].lock();

            let mut chosen = None;
            for (index, entry) in chain.entries() {
                if entry.blockno == victim_no
                    && self.slots[entry.slot].refcnt.load(Ordering::Relaxed) == 0
                {
                    chosen = Some((index, entry.slot));
                    break;
                }
            }

            if let Some((index, slot)) = chosen {
                // Rewrite the buffer's identity. No holder exists (refcnt is
                // zero under the owning bucket's lock), so the half-written
                // state is unobservable.
                let meta = &self.slots[slot];
                meta.dev.store(dev, Ordering::Relaxed);
                meta.blockno.store(blockno, Ordering::Relaxed);
                meta.valid.store(false, Ordering::Release);
                meta.refcnt.store(1, Ordering::Relaxed);
                lru.set_blockno(rec, blockno);

                if owner == target {
                    let entry = chain.entry_mut(index);
                    entry.dev = dev;
                    entry.blockno = blockno;
                    drop(chain);
                } else {
                    // Owning bucket is already held; take the target second.
                    let mut dst = self.buckets[target].lock();
                    let mut entry = chain.take(index);
                    entry.dev = dev;
                    entry.blockno = blockno;
                    dst.insert(entry);
                    drop(dst);
                    drop(chain);
                    debug!("bcache: slot {slot} moved to bucket {target} for block {blockno}");
                }
                drop(lru);
                return (slot, self.slots[slot].data.lock());
            }

            drop(chain);
            record = lru.warmer(rec);
        }

        // Fully pinned cache: no backpressure mechanism exists, so halt.
        panic!("bcache: no reusable buffer (all {N_BUF} in use)");
    }

    /// Release-path bookkeeping, after the exclusive lock has been dropped.
    fn release_slot(&self, slot: usize) {
        let meta = &self.slots[slot];
        // Fixed order: eviction lock, then the owning bucket — the same
        // order the eviction path uses. The owning bucket comes from the
        // *current* block number, which cannot change while our reference
        // is still counted.
        let mut lru = self.recency.lock();
        let blockno = meta.blockno.load(Ordering::Relaxed);
        let _chain = self.buckets[bucket_of(blockno)].lock();
        let previous = meta.refcnt.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "bcache: refcount underflow on slot {slot}");
        if previous == 1 {
            // Newly idle: becomes the most recently released.
            assert!(
                lru.touch(blockno),
                "bcache: no recency record for block {blockno}"
            );
        }
    }

    /// Take an extra reference under the owning bucket's lock only.
    fn pin_slot(&self, slot: usize) {
        let meta = &self.slots[slot];
        let blockno = meta.blockno.load(Ordering::Relaxed);
        let _chain = self.buckets[bucket_of(blockno)].lock();
        meta.refcnt.fetch_add(1, Ordering::Relaxed);
    }

    fn unpin_slot(&self, slot: usize) {
        let meta = &self.slots[slot];
        let blockno = meta.blockno.load(Ordering::Relaxed);
        let _chain = self.buckets[bucket_of(blockno)].lock();
        let previous = meta.refcnt.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "bcache: unpin underflow on slot {slot}");
    }
}

/// Exclusive hold on one cached block.
///
/// Dereferences to the block's bytes. Dropping the guard releases the
/// exclusive lock and, if this was the last reference, marks the buffer most
/// recently released.
pub struct BufGuard<'a, D: BlockDevice, const N_BUF: usize> {
    cache: &'a BufCache<D, N_BUF>,
    slot: usize,
    data: ManuallyDrop<SleepLockGuard<'a, [u8; BLOCK_SIZE]>>,
}

impl<'a, D: BlockDevice, const N_BUF: usize> BufGuard<'a, D, N_BUF> {
    /// Device this buffer caches.
    pub fn dev(&self) -> u32 {
        self.cache.slots[self.slot].dev.load(Ordering::Relaxed)
    }

    /// Block number this buffer caches.
    pub fn blockno(&self) -> u32 {
        self.cache.slots[self.slot].blockno.load(Ordering::Relaxed)
    }

    /// Keep this buffer cache-resident past the guard's lifetime.
    ///
    /// The returned [`BufPin`] holds a reference without the exclusive lock,
    /// making the buffer ineligible for eviction until the pin drops.
    pub fn pin(&self) -> BufPin<'a, D, N_BUF> {
        self.cache.pin_slot(self.slot);
        BufPin {
            cache: self.cache,
            slot: self.slot,
        }
    }
}

impl<D: BlockDevice, const N_BUF: usize> Deref for BufGuard<'_, D, N_BUF> {
    type Target = [u8; BLOCK_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<D: BlockDevice, const N_BUF: usize> DerefMut for BufGuard<'_, D, N_BUF> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<D: BlockDevice, const N_BUF: usize> Drop for BufGuard<'_, D, N_BUF> {
    fn drop(&mut self) {
        // Exclusive lock first, then the reference-count bookkeeping — the
        // release path must not hold the sleep lock while taking spin locks.
        // Safety: dropped exactly once, here.
        unsafe { ManuallyDrop::drop(&mut self.data) };
        self.cache.release_slot(self.slot);
    }
}

/// A reference that keeps a buffer cached without locking it.
///
/// Created by [`BufGuard::pin`]; the reference is returned when the pin
/// drops. Pins stack: a buffer is evictable only when guards and pins are
/// all gone.
pub struct BufPin<'a, D: BlockDevice, const N_BUF: usize> {
    cache: &'a BufCache<D, N_BUF>,
    slot: usize,
}

impl<D: BlockDevice, const N_BUF: usize> Drop for BufPin<'_, D, N_BUF> {
    fn drop(&mut self) {
        self.cache.unpin_slot(self.slot);
    }
}
