use kernel_cpu::{HostCpu, SingleCore};
use kernel_palloc::{ALLOC_FILL, AllocError, FREE_FILL, PAGE_SIZE, Page, PageAllocator};
use std::alloc::{Layout, alloc, dealloc};
use std::collections::HashSet;
use std::ptr::NonNull;
use std::thread;

/// Page-aligned backing memory standing in for a physical range.
struct Arena {
    base: *mut u8,
    layout: Layout,
}

impl Arena {
    fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let base = unsafe { alloc(layout) };
        assert!(!base.is_null());
        Self { base, layout }
    }

    fn start(&self) -> usize {
        self.base as usize
    }

    fn end(&self) -> usize {
        self.start() + self.layout.size()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) };
    }
}

#[test]
fn bootstrap_alloc_exhaust_and_refill() {
    let arena = Arena::new(8);
    let palloc: PageAllocator<_, 1> = PageAllocator::new(SingleCore, arena.start(), arena.end());

    let released = unsafe { palloc.bootstrap(arena.start(), arena.end()) };
    assert_eq!(released, 8);
    assert_eq!(palloc.free_total(), 8);

    let mut held: Vec<Page> = Vec::new();
    let mut seen = HashSet::new();
    for _ in 0..8 {
        let page = palloc.alloc().unwrap();
        assert!(page.addr() >= arena.start() && page.addr() + PAGE_SIZE <= arena.end());
        assert!(seen.insert(page.addr()), "same page handed out twice");
        held.push(page);
    }

    // Every page is out; the next request must fail, not block or retry.
    assert_eq!(palloc.alloc().unwrap_err(), AllocError::OutOfMemory);
    assert_eq!(palloc.free_total(), 0);

    for page in held {
        palloc.free(page);
    }
    assert_eq!(palloc.free_total(), 8);
}

#[test]
fn bootstrap_rounds_start_up_to_a_page() {
    let arena = Arena::new(4);
    let palloc: PageAllocator<_, 1> = PageAllocator::new(SingleCore, arena.start(), arena.end());

    // An unaligned start loses the partial leading page.
    let released = unsafe { palloc.bootstrap(arena.start() + 123, arena.end()) };
    assert_eq!(released, 3);
}

#[test]
fn allocated_page_is_filled_with_alloc_pattern() {
    let arena = Arena::new(2);
    let palloc: PageAllocator<_, 1> = PageAllocator::new(SingleCore, arena.start(), arena.end());
    unsafe { palloc.bootstrap(arena.start(), arena.end()) };

    let page = palloc.alloc().unwrap();
    assert!(page.as_bytes().iter().all(|&b| b == ALLOC_FILL));
    palloc.free(page);
}

#[test]
fn freed_page_is_filled_with_free_pattern() {
    let arena = Arena::new(2);
    let palloc: PageAllocator<_, 1> = PageAllocator::new(SingleCore, arena.start(), arena.end());
    unsafe { palloc.bootstrap(arena.start(), arena.end()) };

    let page = palloc.alloc().unwrap();
    let addr = page.addr();
    palloc.free(page);

    // The first word now holds the free-list link; everything after it must
    // carry the free-time junk pattern.
    let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, PAGE_SIZE) };
    assert!(
        bytes[std::mem::size_of::<*mut u8>()..]
            .iter()
            .all(|&b| b == FREE_FILL)
    );
}

#[test]
fn empty_local_list_steals_from_another_core() {
    let arena = Arena::new(6);
    let cpu = HostCpu::new(2);
    cpu.assign_current_thread(1);
    let palloc: PageAllocator<_, 2> = PageAllocator::new(&cpu, arena.start(), arena.end());

    // Bootstrap runs as core 1, so every page lands on core 1's list.
    unsafe { palloc.bootstrap(arena.start(), arena.end()) };
    assert_eq!(palloc.free_count(0), 0);
    assert_eq!(palloc.free_count(1), 6);

    cpu.assign_current_thread(0);
    let page = palloc.alloc().expect("steal should succeed");
    assert_eq!(palloc.free_count(0), 0);
    assert_eq!(palloc.free_count(1), 5);

    // Freeing lands on the *calling* core, not the list it came from.
    palloc.free(page);
    assert_eq!(palloc.free_count(0), 1);
    assert_eq!(palloc.free_count(1), 5);
}

#[test]
#[should_panic(expected = "unaligned page")]
fn freeing_a_misaligned_page_is_fatal() {
    let arena = Arena::new(2);
    let palloc: PageAllocator<_, 1> = PageAllocator::new(SingleCore, arena.start(), arena.end());
    unsafe { palloc.bootstrap(arena.start(), arena.end()) };

    let bogus = unsafe { Page::from_raw(NonNull::new((arena.start() + 1) as *mut u8).unwrap()) };
    palloc.free(bogus);
}

#[test]
#[should_panic(expected = "outside managed range")]
fn freeing_a_foreign_page_is_fatal() {
    let arena = Arena::new(2);
    let outside = Arena::new(1);
    let palloc: PageAllocator<_, 1> = PageAllocator::new(SingleCore, arena.start(), arena.end());
    unsafe { palloc.bootstrap(arena.start(), arena.end()) };

    let bogus = unsafe { Page::from_raw(NonNull::new(outside.start() as *mut u8).unwrap()) };
    palloc.free(bogus);
}

#[test]
fn pages_are_conserved_under_contention() {
    const PAGES: usize = 64;
    const CORES: usize = 4;
    const ITERS: usize = 500;

    let arena = Arena::new(PAGES);
    let cpu = HostCpu::new(CORES);
    cpu.assign_current_thread(0);
    let palloc: PageAllocator<_, CORES> = PageAllocator::new(&cpu, arena.start(), arena.end());
    unsafe { palloc.bootstrap(arena.start(), arena.end()) };

    thread::scope(|scope| {
        for core in 0..CORES {
            let palloc = &palloc;
            let cpu = &cpu;
            scope.spawn(move || {
                cpu.assign_current_thread(core);
                let tag = core as u8 ^ 0xA5;
                for _ in 0..ITERS {
                    let Ok(mut page) = palloc.alloc() else {
                        thread::yield_now();
                        continue;
                    };
                    // If two cores ever received the same page, these writes
                    // would tear each other up.
                    page.as_bytes_mut().fill(tag);
                    assert!(page.as_bytes().iter().all(|&b| b == tag));
                    palloc.free(page);
                }
            });
        }
    });

    assert_eq!(palloc.free_total(), PAGES);
}
