//! READ(10)/WRITE(10) handling and USB-to-native block translation

use core::borrow::{Borrow, BorrowMut};
use core::cmp::min;

use crate::block_device::BlockDevice;
use crate::bot::CommandStatus;
use crate::controller::Controller;
use crate::device::{Msc, State};
use crate::scsi::{Cdb, Opcode, SenseCode, SenseKey};
use crate::BLOCK_SIZE_USB;

impl<C, D, Buf> Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    pub(crate) fn command_read_write(&mut self, cdb: Cdb) {
        let status = self.validate_read_write(&cdb);
        if status != CommandStatus::Passed {
            self.send_error(status, SenseKey::IllegalRequest, SenseCode::InvalidCmdOpCode);
        } else if self.total_bytes > 0 {
            if matches!(cdb.kind(), Some(Opcode::Read10)) {
                self.read_next(cdb);
            }
            // WRITE(10) takes no action until the data stage begins
        } else {
            // Zero byte transfer. No practical use case, but explicitly not
            // an error according to the spec
            self.set_state(State::Status);
        }
    }

    /// Arbitrates the CBW transfer length against the CDB block count.
    /// 6.7 The Thirteen Cases
    /// <https://usb.org/sites/default/files/usbmassbulk_10.pdf>
    fn validate_read_write(&self, cdb: &Cdb) -> CommandStatus {
        let block_count = cdb.transfer_blocks() as u32;
        let is_read = matches!(cdb.kind(), Some(Opcode::Read10));

        if self.total_bytes == 0 {
            if block_count > 0 {
                // The wrapper expects no data but the command transfers some
                return CommandStatus::PhaseError;
            }
            return CommandStatus::Passed;
        }
        if (is_read && self.cbw.is_out()) || (!is_read && self.cbw.is_in()) {
            // Case 10 (Ho <> Di) for READ(10), Case 8 (Hi <> Do) for WRITE(10)
            return CommandStatus::PhaseError;
        }
        if block_count == 0 {
            // Zero length transfers were handled above - Case 4 (Hi > Dn)
            return CommandStatus::Failed;
        }
        if self.total_bytes / block_count == 0 {
            // Block size small enough to round to zero - Case 7 (Hi < Di)
            // for READ(10) or Case 13 (Ho < Do) for WRITE(10)
            return CommandStatus::PhaseError;
        }
        CommandStatus::Passed
    }

    /// Translates a USB block address plus a byte offset within the current
    /// transfer into the native byte address of the containing hardware
    /// block and the remainder into it
    fn usb_to_raw(&self, lba: u32, offset: u32) -> (u64, u32) {
        let byte = lba as u64 * BLOCK_SIZE_USB as u64 + offset as u64;
        let raw_lba = byte / self.block_size_raw as u64;
        let raw_offset = (byte % self.block_size_raw as u64) as u32;
        (
            self.block_offset as u64 + raw_lba * self.block_size_raw as u64,
            raw_offset,
        )
    }

    /// Emits the next READ(10) data packet from the block cache
    pub(crate) fn read_next(&mut self, cdb: Cdb) {
        let read_end = min(self.total_bytes - self.sent_bytes, self.max_packet_size) as usize;
        self.scratch.reset(read_end);

        match self.read_block(cdb.lba(), self.sent_bytes) {
            Ok(n) if n > 0 => {
                self.queued_bytes = read_end as u32;
                self.ctrl.send_in_packet(self.endpoints.ep_in, self.scratch.as_slice());
            }
            _ => {
                self.send_error(
                    CommandStatus::Failed,
                    SenseKey::NotReady,
                    SenseCode::MediumNotPresent,
                );
            }
        }
    }

    /// Reads one full native block through the cache and copies the part the
    /// current packet wants into the scratch, returning the byte count
    fn read_block(&mut self, lba: u32, offset: u32) -> Result<usize, ()> {
        if self.dev.is_none() || self.block_size_raw == 0 {
            return Err(());
        }

        let (block_start, block_offset) = self.usb_to_raw(lba, offset);
        let block_offset = block_offset as usize;
        let raw = self.block_size_raw as usize;
        let want = self.scratch.len();

        let Some(dev) = self.dev.as_mut() else {
            return Err(());
        };
        let n = dev
            .read_at(&mut self.block_cache.borrow_mut()[..raw], block_start)
            .map_err(|_| ())?;

        let n = n.saturating_sub(block_offset);
        let n = min(min(n, want), raw - block_offset);

        let cache = self.block_cache.borrow();
        self.scratch.as_mut_slice()[..n]
            .copy_from_slice(&cache[block_offset..block_offset + n]);

        Ok(n)
    }

    /// Writes the native block assembled in the scratch. Runs in the worker
    /// context; the data stage is responsible for having accumulated exactly
    /// one full aligned block.
    pub(crate) fn write_queued(&mut self, cdb: Cdb) {
        if self.read_only {
            self.send_error(
                CommandStatus::Failed,
                SenseKey::DataProtect,
                SenseCode::WriteProtected,
            );
            return;
        }

        let block_len = self.scratch.len();
        match self.write_block(cdb.lba(), self.sent_bytes) {
            Ok(n) if n >= block_len => {
                self.sent_bytes += block_len as u32;
            }
            Ok(n) => {
                // Short write: only the acknowledged prefix counts
                self.sent_bytes += n as u32;
                self.send_error(
                    CommandStatus::Failed,
                    SenseKey::NotReady,
                    SenseCode::MediumNotPresent,
                );
            }
            Err(()) => {
                self.send_error(
                    CommandStatus::Failed,
                    SenseKey::NotReady,
                    SenseCode::MediumNotPresent,
                );
            }
        }

        if self.sent_bytes >= self.total_bytes {
            // Data transfer complete, send the CSW
            self.set_state(State::Status);
            self.run(&[], true);
        }
    }

    fn write_block(&mut self, lba: u32, offset: u32) -> Result<usize, ()> {
        if self.dev.is_none() || self.block_size_raw == 0 {
            return Err(());
        }

        let (block_start, block_offset) = self.usb_to_raw(lba, offset);
        if block_offset != 0 || self.scratch.len() != self.block_size_raw as usize {
            // Partial or misaligned native blocks cannot be written
            return Err(());
        }

        let Some(dev) = self.dev.as_mut() else {
            return Err(());
        };
        dev.write_at(self.scratch.as_slice(), block_start).map_err(|_| ())
    }
}
