//! UNMAP handling
//!
//! 3.54 Unmap Command (SBC-4)
//! <https://www.seagate.com/files/staticfiles/support/docs/manual/Interface%20manuals/100293068j.pdf>

use core::borrow::BorrowMut;

use crate::block_device::BlockDevice;
use crate::bot::CommandStatus;
use crate::controller::Controller;
use crate::device::{Msc, State};
use crate::scsi::{Cdb, SenseCode, SenseKey};
use crate::BLOCK_SIZE_USB;

impl<C, D, Buf> Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    /// UNMAP sends a header in the CBW and a parameter list in the data
    /// stage. The list is an 8 byte header plus 16 bytes per descriptor;
    /// anything shorter than one descriptor, or not a whole number of
    /// descriptors, is not a format that can be decoded.
    pub(crate) fn command_unmap(&mut self, cdb: Cdb) {
        let param_len = cdb.param_list_len();
        if param_len < 24 || (param_len - 8) % 16 != 0 {
            self.send_error(
                CommandStatus::Failed,
                SenseKey::IllegalRequest,
                SenseCode::InvalidFieldInCdb,
            );
        }
        // The parameter list itself arrives in the data stage
    }

    /// Decodes the queued parameter list and erases the named ranges. Runs
    /// in the worker context.
    pub(crate) fn unmap_queued(&mut self) {
        if self.read_only {
            self.send_error(
                CommandStatus::Failed,
                SenseKey::DataProtect,
                SenseCode::WriteProtected,
            );
            return;
        }

        let len = self.scratch.len();
        if len < 8 {
            self.send_error(
                CommandStatus::Failed,
                SenseKey::IllegalRequest,
                SenseCode::InvalidFieldInCdb,
            );
            return;
        }

        let buf = self.scratch.as_slice();
        let msg_len = u16::from_be_bytes(buf[..2].try_into().unwrap());
        let desc_len = u16::from_be_bytes(buf[2..4].try_into().unwrap());

        // Sanity checks on the message lengths; max 3 block descriptors so
        // the whole list fits one 64 byte packet. A descriptor range past
        // the bytes actually received means a fragmented list, which is not
        // supported.
        let desc_end = 8 + desc_len as usize;
        if msg_len < 8 || desc_len < 16 || desc_len > 3 * 16 || msg_len != desc_len + 6 || desc_end > len
        {
            self.send_error(
                CommandStatus::Failed,
                SenseKey::IllegalRequest,
                SenseCode::InvalidFieldInCdb,
            );
            return;
        }

        let mut offset = 8;
        while offset < desc_end {
            let mut desc = [0u8; 16];
            desc.copy_from_slice(&self.scratch.as_slice()[offset..offset + 16]);
            if self.unmap_descriptor(&desc).is_err() {
                // TODO: backing-device failures deserve a medium error here
                // rather than a range error
                self.send_error(
                    CommandStatus::Failed,
                    SenseKey::VolumeOverflow,
                    SenseCode::LbaOutOfRange,
                );
                return;
            }
            offset += 16;
        }

        self.sent_bytes += len as u32;
        if self.sent_bytes >= self.total_bytes {
            // Wipeout complete, send the CSW
            self.set_state(State::Status);
            self.run(&[], true);
        }
    }

    fn unmap_descriptor(&mut self, desc: &[u8; 16]) -> Result<(), ()> {
        let block_count = u32::from_be_bytes(desc[8..12].try_into().unwrap());
        if block_count == 0 {
            // No blocks to unmap. Explicitly not an error per the spec
            return Ok(());
        }

        // The wire carries a 64-bit LBA, far more than this device can
        // address; the low word covers the whole range
        let lba = u32::from_be_bytes(desc[4..8].try_into().unwrap());

        // The unmap must not extend past the end of the volume
        if lba as u64 + block_count as u64 > self.block_count as u64 {
            return Err(());
        }

        let Some(dev) = self.dev.as_mut() else {
            return Err(());
        };
        let erase_block_size = dev.erase_block_size() as u64;
        if erase_block_size == 0 {
            return Err(());
        }

        // Convert the emulated block range to hardware erase block units
        let start = lba as u64 * BLOCK_SIZE_USB as u64 / erase_block_size;
        let count = block_count as u64 * BLOCK_SIZE_USB as u64 / erase_block_size;
        dev.erase_blocks(start, count).map_err(|_| ())
    }
}
