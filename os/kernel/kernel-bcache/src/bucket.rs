/// Membership node: one cached block's place in its hash chain.
///
/// The (dev, blockno) pair here is the identity lookups match against; the
/// slot's own metadata mirrors it for paths that start from a slot index.
#[derive(Clone, Copy)]
pub(crate) struct ChainEntry {
    pub slot: usize,
    pub dev: u32,
    pub blockno: u32,
}

/// One chain of the bucket table.
///
/// Backed by a fixed slot array instead of links: capacity equals the whole
/// pool, so even if every buffer hashes to one chain, insertion — and in
/// particular relocation during eviction — can never fail for lack of a node.
/// Chains are short; scans are linear.
pub(crate) struct Bucket<const N_BUF: usize> {
    entries: [Option<ChainEntry>; N_BUF],
}

impl<const N_BUF: usize> Bucket<N_BUF> {
    pub const fn new() -> Self {
        Self {
            entries: [const { None }; N_BUF],
        }
    }

    /// Slot caching (dev, blockno), if it lives in this chain.
    pub fn find(&self, dev: u32, blockno: u32) -> Option<usize> {
        self.entries
            .iter()
            .flatten()
            .find(|entry| entry.dev == dev && entry.blockno == blockno)
            .map(|entry| entry.slot)
    }

    /// Occupied entries with their indices.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &ChainEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|e| (index, e)))
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut ChainEntry {
        self.entries[index]
            .as_mut()
            .expect("bucket entry index points at an empty slot")
    }

    /// Unlink the entry at `index` from this chain.
    pub fn take(&mut self, index: usize) -> ChainEntry {
        self.entries[index]
            .take()
            .expect("bucket entry index points at an empty slot")
    }

    /// Link an entry into this chain.
    pub fn insert(&mut self, entry: ChainEntry) {
        let free = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .expect("bucket chain overflow: more entries than buffers");
        *free = Some(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_matches_device_and_block() {
        let mut bucket: Bucket<4> = Bucket::new();
        bucket.insert(ChainEntry {
            slot: 2,
            dev: 1,
            blockno: 18,
        });

        assert_eq!(bucket.find(1, 18), Some(2));
        assert_eq!(bucket.find(2, 18), None);
        assert_eq!(bucket.find(1, 5), None);
    }

    #[test]
    fn take_then_insert_relocates_an_entry() {
        let mut src: Bucket<2> = Bucket::new();
        let mut dst: Bucket<2> = Bucket::new();
        src.insert(ChainEntry {
            slot: 0,
            dev: 1,
            blockno: 13,
        });

        let (index, _) = src.entries().next().unwrap();
        let mut entry = src.take(index);
        entry.blockno = 5;
        dst.insert(entry);

        assert_eq!(src.entries().count(), 0);
        assert_eq!(dst.find(1, 5), Some(0));
    }
}
