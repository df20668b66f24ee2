use crate::page::Page;
use crate::{ALLOC_FILL, FREE_FILL, PAGE_SIZE};
use core::ptr::{NonNull, null_mut};
use kernel_cpu::{CpuOps, PinnedCore};
use kernel_sync::SpinLock;
use log::{debug, trace};

/// Recoverable allocation failure.
///
/// Callers must propagate this (and abort the operation that needed the page)
/// rather than retry in a loop; nothing frees memory on their behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of physical memory")]
    OutOfMemory,
}

/// Header threaded through every free page.
///
/// Lives at the page base while (and only while) the page sits on a free
/// list; allocation hands the full 4096 bytes to the caller and the header
/// ceases to exist.
#[repr(C)]
struct Run {
    next: *mut Run,
}

/// One core's free pages.
struct FreeList {
    head: *mut Run,
    count: usize,
}

// Safety: the raw links are only followed under the owning core's SpinLock.
unsafe impl Send for FreeList {}

impl FreeList {
    const fn new() -> Self {
        Self {
            head: null_mut(),
            count: 0,
        }
    }

    fn pop(&mut self) -> *mut Run {
        let run = self.head;
        if !run.is_null() {
            // Safety: head came from `push` on a valid free page.
            self.head = unsafe { (*run).next };
            self.count -= 1;
        }
        run
    }

    /// # Safety
    /// `run` must point into a valid, otherwise-unreferenced free page.
    unsafe fn push(&mut self, run: *mut Run) {
        unsafe { (*run).next = self.head };
        self.head = run;
        self.count += 1;
    }
}

/// Per-core physical page allocator with work-stealing.
///
/// Manages the page-aligned pages inside `[start, end)`. Each core owns a
/// free list behind its own [`SpinLock`]; [`alloc`](Self::alloc) pops from
/// the calling core's list and falls back to a single round-robin probe of
/// the other cores' lists. The probe is the only cross-core mutation path,
/// and it takes the target core's own lock like anyone else.
///
/// `N_CORES` bounds the number of cores the platform reports; unused slots
/// simply hold empty lists.
pub struct PageAllocator<C: CpuOps, const N_CORES: usize> {
    cpu: C,
    start: usize,
    end: usize,
    cores: [SpinLock<FreeList>; N_CORES],
}

impl<C: CpuOps, const N_CORES: usize> PageAllocator<C, N_CORES> {
    /// Create an allocator for the physical range `[start, end)`.
    ///
    /// All lists start empty; call [`bootstrap`](Self::bootstrap) once to
    /// seed them.
    ///
    /// # Panics
    /// If `N_CORES` is zero, smaller than `cpu.core_count()`, or the range is
    /// inverted.
    pub fn new(cpu: C, start: usize, end: usize) -> Self {
        assert!(N_CORES > 0, "page allocator needs at least one core slot");
        assert!(
            cpu.core_count() <= N_CORES,
            "platform reports {} cores but only {N_CORES} slots exist",
            cpu.core_count()
        );
        assert!(start <= end, "inverted physical range");
        Self {
            cpu,
            start,
            end,
            cores: [const { SpinLock::new(FreeList::new()) }; N_CORES],
        }
    }

    /// Release every page-aligned page in `[range_start, range_end)` onto the
    /// calling core's free list. Returns the number of pages released.
    ///
    /// Called once at kernel init, before the secondary cores schedule; the
    /// pages all land on whichever core runs the bootstrap and spread out
    /// through stealing afterwards.
    ///
    /// # Safety
    /// - The range must lie within the `[start, end)` the allocator was
    ///   created with.
    /// - The memory must be valid, writable, and referenced by nothing else;
    ///   the allocator takes ownership of every page in it.
    pub unsafe fn bootstrap(&self, range_start: usize, range_end: usize) -> usize {
        let mut addr = range_start.next_multiple_of(PAGE_SIZE);
        let mut released = 0usize;
        while addr + PAGE_SIZE <= range_end {
            let Some(base) = NonNull::new(addr as *mut u8) else {
                panic!("bootstrap: page at null");
            };
            // Safety: caller vouches for the range; each page is handed over
            // exactly once.
            self.free(unsafe { Page::from_raw(base) });
            released += 1;
            addr += PAGE_SIZE;
        }
        debug!(
            "palloc: bootstrap released {released} pages ({range_start:#x}..{range_end:#x})"
        );
        released
    }

    /// Allocate one page.
    ///
    /// Pops from the calling core's list; if that is empty, probes the other
    /// cores round-robin starting at the next id and steals one page from the
    /// first non-empty list. The returned page is filled with [`ALLOC_FILL`].
    pub fn alloc(&self) -> Result<Page, AllocError> {
        let pin = PinnedCore::new(&self.cpu);
        let id = pin.core();
        debug_assert!(id < N_CORES, "core id {id} out of range");

        let mut run = self.cores[id].lock().pop();
        if run.is_null() {
            let mut victim = (id + 1) % N_CORES;
            while victim != id {
                let mut remote = self.cores[victim].lock();
                if remote.count > 0 {
                    run = remote.pop();
                    drop(remote);
                    trace!("palloc: core {id} stole a page from core {victim}");
                    break;
                }
                drop(remote);
                victim = (victim + 1) % N_CORES;
            }
        }
        drop(pin);

        let Some(base) = NonNull::new(run.cast::<u8>()) else {
            return Err(AllocError::OutOfMemory);
        };
        // Clobber the page so reads of uninitialized memory are recognizable.
        // Safety: the page just left a free list; we are its only referent.
        unsafe { base.as_ptr().write_bytes(ALLOC_FILL, PAGE_SIZE) };
        Ok(unsafe { Page::from_raw(base) })
    }

    /// Return a page to the calling core's free list.
    ///
    /// The page is filled with [`FREE_FILL`] first, so dangling references
    /// read junk rather than stale contents.
    ///
    /// # Panics
    /// If the page is not page-aligned or lies outside the managed range;
    /// both are programming errors, not recoverable conditions.
    pub fn free(&self, page: Page) {
        let addr = page.addr();
        assert!(addr % PAGE_SIZE == 0, "free: unaligned page {addr:#x}");
        assert!(
            addr >= self.start && addr + PAGE_SIZE <= self.end,
            "free: page {addr:#x} outside managed range {:#x}..{:#x}",
            self.start,
            self.end
        );

        let base = page.into_raw();
        // Safety: we now own the page; fill happens before it becomes
        // reachable through any list.
        unsafe { base.as_ptr().write_bytes(FREE_FILL, PAGE_SIZE) };
        let run = base.as_ptr().cast::<Run>();

        let pin = PinnedCore::new(&self.cpu);
        let id = pin.core();
        debug_assert!(id < N_CORES, "core id {id} out of range");
        let mut local = self.cores[id].lock();
        // Safety: the page is exclusively ours until linked; the lock guards
        // the link itself.
        unsafe { local.push(run) };
    }

    /// Number of free pages currently on `core`'s list.
    pub fn free_count(&self, core: usize) -> usize {
        assert!(core < N_CORES, "core id {core} out of range");
        self.cores[core].lock().count
    }

    /// Number of free pages across all lists.
    pub fn free_total(&self) -> usize {
        (0..N_CORES).map(|core| self.free_count(core)).sum()
    }
}
