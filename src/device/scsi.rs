//! SCSI command dispatch and the single-packet handlers

use core::borrow::BorrowMut;

use crate::block_device::BlockDevice;
use crate::bot::CommandStatus;
use crate::controller::Controller;
use crate::device::{Msc, State};
use crate::fmt::debug;
use crate::scsi::{
    Cdb, Opcode, SenseCode, SenseKey, MODE_SENSE10_RESP_LEN, MODE_SENSE6_RESP_LEN,
    READ_CAPACITY_RESP_LEN, READ_FORMAT_CAPACITY_RESP_LEN, REQUEST_SENSE_RESP_LEN,
};
use crate::BLOCK_SIZE_USB;

impl<C, D, Buf> Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    pub(crate) fn command_begin(&mut self) {
        let cdb = self.cbw.scsi_cdb();
        debug!("usb: msc: Command: {}", cdb.opcode());

        // Multi-packet commands run their own validation and data phases
        match cdb.kind() {
            Some(Opcode::Read10) | Some(Opcode::Write10) => {
                self.command_read_write(cdb);
                return;
            }
            Some(Opcode::Unmap) => {
                self.command_unmap(cdb);
                return;
            }
            _ => {}
        }

        if self.total_bytes > self.max_packet_size && self.cbw.is_out() {
            // 6.7.3 The Thirteen Cases - Case 9 (Ho > Dn): reject any other
            // multi-packet OUT command without examining it further
            // https://usb.org/sites/default/files/usbmassbulk_10.pdf
            self.send_error(
                CommandStatus::Failed,
                SenseKey::IllegalRequest,
                SenseCode::InvalidCmdOpCode,
            );
            return;
        }

        match cdb.kind() {
            Some(Opcode::TestUnitReady) => self.command_test_unit_ready(),
            Some(Opcode::ReadCapacity10) => self.command_read_capacity(),
            Some(Opcode::ReadFormatCapacity) => self.command_read_format_capacity(),
            Some(Opcode::Inquiry) => self.command_inquiry(cdb),
            Some(Opcode::ModeSense6) | Some(Opcode::ModeSense10) => self.command_mode_sense(cdb),
            Some(Opcode::RequestSense) => self.command_request_sense(),
            Some(Opcode::PreventAllowMediumRemoval) => self.command_medium_removal(),
            _ => {
                // Unsupported command, error out
                self.send_error(
                    CommandStatus::Failed,
                    SenseKey::IllegalRequest,
                    SenseCode::InvalidCmdOpCode,
                );
            }
        }

        if self.resp_status != CommandStatus::Passed {
            // An error reply is already on its way, leave the scratch alone
            return;
        }

        if self.scratch.is_empty() {
            if self.total_bytes > 0 {
                // 6.7.2 The Thirteen Cases - Case 4 (Hi > Dn)
                self.send_error(CommandStatus::Failed, SenseKey::IllegalRequest, SenseCode::None);
            } else {
                // 6.7.1 The Thirteen Cases - Case 1 (Hn = Dn): all good
                self.set_state(State::Status);
            }
        } else if self.total_bytes == 0 {
            // 6.7.1 The Thirteen Cases - Case 2 (Hn < Di)
            self.send_error(CommandStatus::Failed, SenseKey::IllegalRequest, SenseCode::None);
        } else {
            // Never return more data than the host is expecting
            if (self.cbw.transfer_length() as usize) < self.scratch.len() {
                self.scratch.truncate(self.cbw.transfer_length() as usize);
            }
            self.ctrl.send_in_packet(self.endpoints.ep_in, self.scratch.as_slice());
        }
    }

    fn command_test_unit_ready(&mut self) {
        self.scratch.reset(0);
        self.queued_bytes = 0;

        if !self.ready() {
            self.set_sense(SenseKey::NotReady, SenseCode::MediumNotPresent);
        } else {
            self.clear_sense();
        }
    }

    fn command_read_capacity(&mut self) {
        self.scratch.reset(READ_CAPACITY_RESP_LEN);
        self.queued_bytes = READ_CAPACITY_RESP_LEN as u32;

        let last_lba = self.block_count.wrapping_sub(1);
        let buf = self.scratch.as_mut_slice();
        // Last LBA address (big endian)
        buf[..4].copy_from_slice(&last_lba.to_be_bytes());
        // Block size (big endian)
        buf[4..8].copy_from_slice(&BLOCK_SIZE_USB.to_be_bytes());
    }

    fn command_read_format_capacity(&mut self) {
        self.scratch.reset(READ_FORMAT_CAPACITY_RESP_LEN);
        self.queued_bytes = READ_FORMAT_CAPACITY_RESP_LEN as u32;

        let block_count = self.block_count;
        let buf = self.scratch.as_mut_slice();
        // bytes 0-2 - reserved
        buf[3] = 8; // capacity list length
        // Number of blocks (big endian)
        buf[4..8].copy_from_slice(&block_count.to_be_bytes());
        // Block size (24-bit, big endian)
        buf[8..12].copy_from_slice(&BLOCK_SIZE_USB.to_be_bytes());
        // Descriptor type - formatted media
        buf[8] = 2;
    }

    /// MODE SENSE(6) / MODE SENSE(10) - only used here to report whether the
    /// device is write protected
    fn command_mode_sense(&mut self, cdb: Cdb) {
        let resp_len = if matches!(cdb.kind(), Some(Opcode::ModeSense10)) {
            MODE_SENSE10_RESP_LEN
        } else {
            MODE_SENSE6_RESP_LEN
        };
        self.scratch.reset(resp_len);
        self.queued_bytes = resp_len as u32;

        // The host allows a good amount of leeway in response size; reset
        // the total to what actually goes out and terminate with a ZLP
        if self.total_bytes > resp_len as u32 {
            self.total_bytes = resp_len as u32;
            self.send_zlp = true;
        }

        let write_protected = if self.read_only { 0x80 } else { 0x00 };
        let buf = self.scratch.as_mut_slice();
        if matches!(cdb.kind(), Some(Opcode::ModeSense10)) {
            // bytes 0-1 - number of bytes after this one
            buf[1] = (resp_len - 2) as u8;
            // byte 2 - medium type (0x00 for direct access block device)
            // bit 7 of byte 3 indicates write protected
            buf[3] = write_protected;
        } else {
            // byte 0 - number of bytes after this one
            buf[0] = (resp_len - 1) as u8;
            // byte 1 - medium type (0x00 for direct access block device)
            // bit 7 of byte 2 indicates write protected
            buf[2] = write_protected;
            // byte 3 - block descriptor length: 0 (not supported)
        }
    }

    /// REQUEST SENSE returns and then clears the recorded error codes
    fn command_request_sense(&mut self) {
        self.scratch.reset(REQUEST_SENSE_RESP_LEN);
        self.queued_bytes = REQUEST_SENSE_RESP_LEN as u32;
        self.total_bytes = REQUEST_SENSE_RESP_LEN as u32;

        let key = self.sense_key as u8;
        let code = self.sense_code as u8;
        let qualifier = self.sense_qualifier;

        let buf = self.scratch.as_mut_slice();
        // 0x70 - current error, plus 0x80 for the valid flag bit
        buf[0] = 0xF0;
        // byte 1 - reserved
        buf[2] = key & 0x0F; // Incorrect Length Indicator bit not supported
        // bytes 3-6 - information (not used)
        // byte 7 - additional sense length (bytes remaining in the message)
        buf[7] = (REQUEST_SENSE_RESP_LEN - 8) as u8;
        // bytes 8-11 - command specific information (not used)
        buf[12] = code;
        buf[13] = qualifier;
        // bytes 14-17 - reserved

        // Sense data is consumed by being reported
        self.clear_sense();
    }

    /// PREVENT/ALLOW MEDIUM REMOVAL - the medium is not removable, so this
    /// is a no-op beyond the readiness check
    fn command_medium_removal(&mut self) {
        self.scratch.reset(0);
        self.queued_bytes = 0;

        if !self.ready() {
            self.set_sense(SenseKey::NotReady, SenseCode::MediumNotPresent);
        } else {
            self.clear_sense();
        }

        self.set_state(State::Status);
    }
}
