//! The global release-recency list.
//!
//! One record per buffer slot, always; records never leave the list, they
//! only move within it or have their block number rewritten when a slot is
//! recycled. The head end holds the most recently released buffer, the tail
//! end the coldest — eviction walks from the tail.
//!
//! Stored as a fixed arena with index links (`NONE` terminates), so there is
//! no self-referential memory and no allocation.

/// Absent-link marker.
const NONE: usize = usize::MAX;

#[derive(Clone, Copy)]
struct Record {
    blockno: u32,
    /// Toward the head (warmer).
    prev: usize,
    /// Toward the tail (colder).
    next: usize,
}

pub(crate) struct RecencyList<const N_BUF: usize> {
    records: [Record; N_BUF],
    /// Most recently released.
    head: usize,
    /// Least recently released; first eviction candidate.
    tail: usize,
}

impl<const N_BUF: usize> RecencyList<N_BUF> {
    /// All records start with block number 0, linked in index order.
    pub const fn new() -> Self {
        let mut records = [Record {
            blockno: 0,
            prev: NONE,
            next: NONE,
        }; N_BUF];
        let mut i = 0;
        while i < N_BUF {
            records[i].prev = if i == 0 { NONE } else { i - 1 };
            records[i].next = if i + 1 == N_BUF { NONE } else { i + 1 };
            i += 1;
        }
        Self {
            records,
            head: if N_BUF == 0 { NONE } else { 0 },
            tail: if N_BUF == 0 { NONE } else { N_BUF - 1 },
        }
    }

    /// Handle of the coldest record.
    pub fn coldest(&self) -> Option<usize> {
        (self.tail != NONE).then_some(self.tail)
    }

    /// Next record toward the warm end.
    pub fn warmer(&self, handle: usize) -> Option<usize> {
        let prev = self.records[handle].prev;
        (prev != NONE).then_some(prev)
    }

    pub fn blockno(&self, handle: usize) -> u32 {
        self.records[handle].blockno
    }

    /// Rewrite a record in place when its slot is recycled; the record keeps
    /// its list position until the new holder releases.
    pub fn set_blockno(&mut self, handle: usize, blockno: u32) {
        self.records[handle].blockno = blockno;
    }

    /// Move the record for `blockno` to the head (most recently released).
    ///
    /// Searches from the cold end, like the release path that calls it.
    /// Returns `false` if no record carries `blockno` — the caller treats
    /// that as a broken invariant.
    #[must_use]
    pub fn touch(&mut self, blockno: u32) -> bool {
        let mut handle = self.tail;
        while handle != NONE {
            if self.records[handle].blockno == blockno {
                self.unlink(handle);
                self.push_head(handle);
                return true;
            }
            handle = self.records[handle].prev;
        }
        false
    }

    fn unlink(&mut self, handle: usize) {
        let Record { prev, next, .. } = self.records[handle];
        if prev == NONE {
            self.head = next;
        } else {
            self.records[prev].next = next;
        }
        if next == NONE {
            self.tail = prev;
        } else {
            self.records[next].prev = prev;
        }
    }

    fn push_head(&mut self, handle: usize) {
        let old_head = self.head;
        self.records[handle].prev = NONE;
        self.records[handle].next = old_head;
        if old_head != NONE {
            self.records[old_head].prev = handle;
        }
        self.head = handle;
        if self.tail == NONE {
            self.tail = handle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Block numbers from cold to warm.
    fn cold_to_warm<const N: usize>(list: &RecencyList<N>) -> Vec<u32> {
        let mut order = Vec::new();
        let mut handle = list.coldest();
        while let Some(h) = handle {
            order.push(list.blockno(h));
            handle = list.warmer(h);
        }
        order
    }

    #[test]
    fn starts_fully_linked_with_block_zero() {
        let list: RecencyList<3> = RecencyList::new();
        assert_eq!(cold_to_warm(&list), vec![0, 0, 0]);
    }

    #[test]
    fn touch_moves_a_record_to_the_warm_end() {
        let mut list: RecencyList<3> = RecencyList::new();
        let a = list.coldest().unwrap();
        list.set_blockno(a, 7);

        assert!(list.touch(7));
        assert_eq!(cold_to_warm(&list), vec![0, 0, 7]);
        // Touching again is a no-op on the order.
        assert!(list.touch(7));
        assert_eq!(cold_to_warm(&list), vec![0, 0, 7]);
    }

    #[test]
    fn touch_reports_a_missing_record() {
        let mut list: RecencyList<2> = RecencyList::new();
        assert!(!list.touch(99));
    }

    #[test]
    fn release_order_determines_cold_to_warm_order() {
        let mut list: RecencyList<3> = RecencyList::new();
        // Recycle each record for a distinct block, then release in order
        // 10, 20, 30.
        for blockno in [10, 20, 30] {
            let handle = list.coldest().unwrap();
            list.set_blockno(handle, blockno);
            assert!(list.touch(blockno));
        }
        assert_eq!(cold_to_warm(&list), vec![10, 20, 30]);

        assert!(list.touch(10));
        assert_eq!(cold_to_warm(&list), vec![20, 30, 10]);
    }

    #[test]
    fn rewriting_in_place_keeps_the_position() {
        let mut list: RecencyList<3> = RecencyList::new();
        for blockno in [10, 20, 30] {
            let handle = list.coldest().unwrap();
            list.set_blockno(handle, blockno);
            assert!(list.touch(blockno));
        }

        // Recycle the coldest (10) for 40 without releasing it.
        let coldest = list.coldest().unwrap();
        list.set_blockno(coldest, 40);
        assert_eq!(cold_to_warm(&list), vec![40, 20, 30]);
    }
}
