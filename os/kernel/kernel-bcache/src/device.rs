use crate::BLOCK_SIZE;

/// Synchronous block-device transfer primitive.
///
/// The cache's single collaborator on the storage side. Both operations move
/// one whole block and return only when the transfer is complete; either may
/// suspend the calling task while the device works.
///
/// The cache guarantees it calls these while holding no spin lock — only the
/// target buffer's exclusive sleep lock — so an implementation is free to
/// block, wait on an interrupt, or reschedule.
pub trait BlockDevice: Sync {
    /// Read block `blockno` of device `dev` into `data`.
    fn read_block(&self, dev: u32, blockno: u32, data: &mut [u8; BLOCK_SIZE]);

    /// Write `data` to block `blockno` of device `dev`.
    fn write_block(&self, dev: u32, blockno: u32, data: &[u8; BLOCK_SIZE]);
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read_block(&self, dev: u32, blockno: u32, data: &mut [u8; BLOCK_SIZE]) {
        (**self).read_block(dev, blockno, data);
    }

    fn write_block(&self, dev: u32, blockno: u32, data: &[u8; BLOCK_SIZE]) {
        (**self).write_block(dev, blockno, data);
    }
}
