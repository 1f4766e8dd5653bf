//! Backing-device registration and geometry

use core::borrow::BorrowMut;

use crate::block_device::BlockDevice;
use crate::controller::Controller;
use crate::device::Msc;
use crate::{Error, BLOCK_SIZE_USB};

impl<C, D, Buf> Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    /// Registers the backing block device and derives the USB-visible
    /// geometry from it.
    ///
    /// Reads, writes and erases must be aligned to the underlying hardware
    /// blocks. The exposed region is assumed to be aligned to the end of the
    /// device, so all accesses are offset by the leading remainder bytes
    /// that don't make up a full USB block.
    ///
    /// # Errors
    /// [Error::BufferTooSmall] if either caller-provided buffer cannot hold
    /// a full native write block.
    pub fn register_block_device(&mut self, dev: D) -> Result<(), Error> {
        let write_block_size = dev.write_block_size();
        if self.scratch.capacity() < write_block_size as usize
            || self.block_cache.borrow().len() < write_block_size as usize
        {
            return Err(Error::BufferTooSmall);
        }

        self.block_size_raw = write_block_size;
        self.block_count = (dev.size() / BLOCK_SIZE_USB as u64) as u32;
        self.block_offset = (dev.size() % BLOCK_SIZE_USB as u64) as u32;
        self.erase_block_size = dev.erase_block_size();
        self.dev = Some(dev);

        Ok(())
    }

    /// Marks the medium as write protected; WRITE and UNMAP then fail with
    /// DataProtect/WriteProtected before touching the backing device
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}
