//! Mass Storage protocol engine
//!
//! Life of a command:
//!
//! 1. The engine starts out in the `Cmd` state, waiting for a Command Block
//!    Wrapper. A valid CBW is saved and dispatched to its SCSI handler; the
//!    engine moves to `Data`.
//! 2. The handler answers the initial data packet (if any). If the command
//!    carries no data the engine skips straight to `Status`.
//! 3. Every subsequent bulk event continues the data phase: IN completions
//!    advance the sent-byte count and emit the next packet, OUT packets
//!    accumulate in the scratch or schedule a deferred task. When the
//!    declared transfer is done the engine moves to `Status`.
//! 4. The `Status` state is checked after every event so the Command Status
//!    Wrapper can go out without another packet cycling through the state
//!    machine; the engine then sits in `StatusSent` until the host takes the
//!    CSW, and returns to `Cmd`.
//!
//! An invalid CBW parks the engine in `NeedReset`, which only a Bulk-Only
//! Mass Storage Reset leaves. Writes and unmaps never touch the backing
//! device from the packet path: they go through a single-slot task that
//! [Msc::process_task] drains from a non-interrupt context, while the OUT
//! endpoint is held unacknowledged for backpressure.

mod disk;
mod inquiry;
mod read_write;
mod scsi;
mod setup;
mod unmap;

use core::borrow::BorrowMut;

use crate::block_device::BlockDevice;
use crate::bot::{Cbw, CommandStatus, CBW_LEN, CSW_LEN};
use crate::buffer::Scratch;
use crate::controller::{Controller, Endpoints, CONTROL_ENDPOINT};
use crate::fmt::{error, info, trace};
use crate::scsi::{Cdb, Opcode, SenseCode, SenseKey};
use crate::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Cmd,        // awaiting CBW
    Data,       // transferring command payload in either direction
    Status,     // handler finished, CSW not yet emitted
    StatusSent, // CSW in flight
    NeedReset,  // fatal protocol violation, wait for MSC reset
}

/// USB Mass Storage function over Bulk Only Transport.
///
/// Owns the controller port, the backing device and two caller-provided
/// buffers: a scratch that must fit a CBW, a full packet and (once a device
/// is registered) a full native write block, and a cache of one native block
/// for read translation.
pub struct Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    ctrl: C,
    dev: Option<D>,
    scratch: Scratch<Buf>,
    block_cache: Buf,
    endpoints: Endpoints,

    state: State,
    cbw: Cbw,
    csw_buf: [u8; CSW_LEN],
    task_queued: bool,
    tx_stalled: bool,
    max_packet_size: u32,
    resp_status: CommandStatus,
    send_zlp: bool,
    queued_bytes: u32,
    sent_bytes: u32,
    total_bytes: u32,

    max_lun: u8,
    block_count: u32,
    block_offset: u32,
    block_size_raw: u32,
    erase_block_size: u32,
    read_only: bool,

    vendor_id: [u8; 8],
    product_id: [u8; 16],
    product_rev: [u8; 4],

    sense_key: SenseKey,
    sense_code: SenseCode,
    sense_qualifier: u8,
}

impl<C, D, Buf> Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    /// Creates a Mass Storage function instance
    ///
    /// # Arguments
    /// * `ctrl` - the controller port
    /// * `packet_size` - maximum USB packet size. Allowed values: 8,16,32,64
    /// * `endpoints` - bulk endpoint and interface numbers from the
    ///   integrator's descriptor set
    /// * `scratch` - the shared data buffer. It is **required** to fit at
    ///   least a CBW and a single full packet
    /// * `block_cache` - the read translation buffer
    ///
    /// # Errors
    /// * [Error::BufferTooSmall]
    pub fn new(
        ctrl: C,
        packet_size: u16,
        endpoints: Endpoints,
        scratch: Buf,
        block_cache: Buf,
    ) -> Result<Msc<C, D, Buf>, Error> {
        let scratch = Scratch::new(scratch);
        if scratch.capacity() < CBW_LEN || scratch.capacity() < packet_size as usize {
            return Err(Error::BufferTooSmall);
        }

        let mut msc = Msc {
            ctrl,
            dev: None,
            scratch,
            block_cache,
            endpoints,
            state: State::Cmd,
            cbw: Cbw::default(),
            csw_buf: [0; CSW_LEN],
            task_queued: false,
            tx_stalled: false,
            max_packet_size: packet_size as u32,
            resp_status: CommandStatus::Passed,
            send_zlp: false,
            queued_bytes: 0,
            sent_bytes: 0,
            total_bytes: 0,
            max_lun: 0,
            block_count: 0,
            block_offset: 0,
            block_size_raw: 0,
            erase_block_size: 0,
            read_only: false,
            vendor_id: [0x20; 8],
            product_id: [0x20; 16],
            product_rev: [0x20; 4],
            sense_key: SenseKey::None,
            sense_code: SenseCode::None,
            sense_qualifier: 0,
        };

        // Default inquiry identity, overridable via the setters
        msc.set_vendor_id("TinyGo");
        msc.set_product_id("Mass Storage");
        msc.set_product_rev("1.0");

        Ok(msc)
    }

    /// Feeds a received bulk-OUT packet to the engine.
    ///
    /// Returns whether the controller may release the transfer immediately.
    /// `false` parks the transfer until a deferred task finishes and the
    /// engine calls [Controller::ack_out_transfer]; the hardware must not
    /// deliver further OUT data before that.
    pub fn handle_rx(&mut self, packet: &[u8]) -> bool {
        self.run(packet, true)
    }

    /// Notifies the engine that the host took the last bulk-IN packet
    pub fn handle_tx_complete(&mut self) {
        self.run(&[], false);
    }

    /// Runs one pending deferred task, if any, returning whether work was
    /// done.
    ///
    /// Poll this from a task context; it owns all backing-device writes and
    /// unmaps and may take arbitrarily long. The held OUT transfer is
    /// acknowledged once the slot is drained.
    pub fn process_task(&mut self) -> bool {
        if !self.task_queued {
            return false;
        }

        // The slot is drained before dispatch so the status phase triggered
        // by a completed command observes clean transfer counters
        self.task_queued = false;
        self.queued_bytes = 0;

        let cdb = self.cbw.scsi_cdb();
        match cdb.kind() {
            Some(Opcode::Write10) => self.write_queued(cdb),
            Some(Opcode::Unmap) => self.unmap_queued(),
            _ => {}
        }

        // A task that failed leaves its status phase pending with no bus
        // event on the way to flush it; cycle the state machine once
        if self.state == State::Status {
            self.run(&[], true);
        }

        // Let the next OUT packet flow
        self.ctrl.ack_out_transfer(self.endpoints.ep_out);
        true
    }

    fn ready(&self) -> bool {
        self.dev.is_some()
    }

    fn run(&mut self, packet: &[u8], is_ep_out: bool) -> bool {
        let mut ack = true;

        match self.state {
            State::Cmd => {
                // IN endpoint transfer complete confirmation, no action needed
                if !is_ep_out {
                    return ack;
                }

                match Cbw::try_from_packet(packet) {
                    Ok(cbw) => {
                        info!("usb: msc: Recv CBW, tag: {}", cbw.tag());
                        self.cbw = cbw;
                        self.set_state(State::Data);
                        self.total_bytes = cbw.transfer_length();
                        self.queued_bytes = 0;
                        self.sent_bytes = 0;
                        self.resp_status = CommandStatus::Passed;
                        self.send_zlp = false;
                        self.command_begin();
                    }
                    Err(_) => {
                        // 6.6.1 CBW Not Valid
                        // https://usb.org/sites/default/files/usbmassbulk_10.pdf
                        self.set_state(State::NeedReset);
                        self.stall_in();
                        self.stall_out();
                        self.ctrl.set_stall_in(CONTROL_ENDPOINT);
                    }
                }
            }
            State::Data => {
                ack = self.data_transfer(packet);
            }
            State::Status => {
                // Handled below, so a CSW can go out without another packet
                // cycling through this match, e.g. after TEST UNIT READY
            }
            State::StatusSent => {
                if !is_ep_out && self.queued_bytes == CSW_LEN as u32 {
                    // Status confirmed sent, wait for the next CBW
                    self.set_state(State::Cmd);
                }
                // Anything else here is unexpected, ignore it
            }
            State::NeedReset => {
                // Invalid CBW received earlier, stop everything until reset
            }
        }

        if self.state == State::Status && !self.tx_stalled {
            if self.total_bytes > self.sent_bytes && self.cbw.is_in() {
                // 6.7.2 The Thirteen Cases - Case 5 (Hi > Di): STALL before status
                self.stall_in();
            } else if self.send_zlp {
                // Force the end of the transfer before the CSW goes out
                self.queued_bytes = 0;
                self.send_zlp = false;
                self.ctrl.send_in_packet(self.endpoints.ep_in, &[]);
            } else {
                self.send_csw(self.resp_status);
            }
        }

        ack
    }

    fn data_transfer(&mut self, packet: &[u8]) -> bool {
        let cdb = self.cbw.scsi_cdb();

        match cdb.kind() {
            Some(Opcode::Write10) | Some(Opcode::Unmap) => {
                if self.read_only {
                    self.send_error(
                        CommandStatus::Failed,
                        SenseKey::DataProtect,
                        SenseCode::WriteProtected,
                    );
                    return true;
                }
                return self.queue_task(cdb, packet);
            }
            _ => {}
        }

        // Count the bytes whose transmission the hardware just confirmed
        self.sent_bytes += self.queued_bytes;
        trace!("usb: msc: Sent bytes: {}/{}", self.sent_bytes, self.total_bytes);

        if self.sent_bytes >= self.total_bytes {
            // Transfer complete, send the CSW once this event settles
            self.set_state(State::Status);
        } else if matches!(cdb.kind(), Some(Opcode::Read10)) {
            self.read_next(cdb);
        }
        // Other multi-packet commands were rejected in command_begin()

        true
    }

    /// Accumulates OUT data for the deferred worker, scheduling the task
    /// once enough has arrived. Returns whether to acknowledge the transfer.
    fn queue_task(&mut self, cdb: Cdb, packet: &[u8]) -> bool {
        // Data overflowing the scratch can never be written out
        if self.queued_bytes as usize + packet.len() > self.scratch.capacity() {
            self.send_error(
                CommandStatus::Failed,
                SenseKey::IllegalRequest,
                SenseCode::InvalidFieldInCdb,
            );
            return true;
        }

        // The slot is still occupied; backpressure should have kept the
        // hardware from delivering this
        if self.task_queued {
            self.send_error(
                CommandStatus::Failed,
                SenseKey::AbortedCommand,
                SenseCode::MsgReject,
            );
            return true;
        }

        let start = self.queued_bytes as usize;
        self.scratch.set_len(start + packet.len());
        self.scratch.as_mut_slice()[start..].copy_from_slice(packet);
        self.queued_bytes += packet.len() as u32;

        match cdb.kind() {
            Some(Opcode::Write10) => {
                // Wait until a full native write block has accumulated
                if self.block_size_raw != 0 && self.queued_bytes == self.block_size_raw {
                    self.task_queued = true;
                }
            }
            Some(Opcode::Unmap) => {
                self.task_queued = true;
            }
            _ => {}
        }

        // Hold the OUT endpoint until the worker has drained the slot
        !self.task_queued
    }

    fn send_csw(&mut self, status: CommandStatus) {
        let residue = self.total_bytes.saturating_sub(self.sent_bytes);
        self.csw_buf = self.cbw.csw(status, residue);
        self.queued_bytes = CSW_LEN as u32;
        self.set_state(State::StatusSent);
        info!("usb: msc: Send CSW: {}, residue: {}", status, residue);
        self.ctrl.send_in_packet(self.endpoints.ep_in, &self.csw_buf);
    }

    /// Common error-emit routine: records the sense triple, arms the
    /// terminating ZLP, stalls the active data endpoint if a residue remains
    /// and advances to the status phase. The CSW goes out on the next event.
    fn send_error(&mut self, status: CommandStatus, key: SenseKey, code: SenseCode) {
        error!("usb: msc: SCSI error, key: {}, code: {}", key, code);

        let residue = self.total_bytes.saturating_sub(self.sent_bytes);
        self.send_zlp = true;
        self.resp_status = status;
        self.set_state(State::Status);
        self.set_sense(key, code);

        if self.total_bytes > 0 && residue > 0 {
            if self.cbw.is_in() {
                self.stall_in();
            } else {
                self.stall_out();
            }
        }
    }

    fn set_sense(&mut self, key: SenseKey, code: SenseCode) {
        self.sense_key = key;
        self.sense_code = code;
        self.sense_qualifier = 0;
    }

    fn clear_sense(&mut self) {
        self.sense_key = SenseKey::None;
        self.sense_code = SenseCode::None;
        self.sense_qualifier = 0;
    }

    fn set_state(&mut self, state: State) {
        info!("usb: msc: Enter state: {}", state);
        self.state = state;
    }

    fn stall_in(&mut self) {
        info!("usb: msc: Stall IN ep");
        self.tx_stalled = true;
        self.ctrl.set_stall_in(self.endpoints.ep_in);
    }

    fn stall_out(&mut self) {
        info!("usb: msc: Stall OUT ep");
        self.ctrl.set_stall_out(self.endpoints.ep_out);
    }

    fn clear_stall_in(&mut self) {
        self.ctrl.clear_stall_in(self.endpoints.ep_in);
        self.tx_stalled = false;
    }

    fn clear_stall_out(&mut self) {
        self.ctrl.clear_stall_out(self.endpoints.ep_out);
    }
}
