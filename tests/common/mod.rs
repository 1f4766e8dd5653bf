//! Shared test harness: a recording controller and RAM disk behind the
//! engine, plus host-side wrapper and setup-packet builders.

pub mod mock;
pub mod scsi;

use usbd_msc::block_device::BlockDevice;
use usbd_msc::controller::{Endpoints, SetupPacket};
use usbd_msc::device::Msc;

use crate::common::mock::{CommandStatus, Csw, MockController, RamDisk};

pub const PACKET_SIZE: u16 = 64;
pub const EP_IN: u8 = 1;
pub const EP_OUT: u8 = 2;
pub const MSC_INTERFACE: u16 = 0;

pub const DEFAULT_TAG: u32 = 0xDEADBEEF;

#[allow(dead_code)]
pub enum DataDirection {
    Out,
    In,
}

/// Host-side view of a Command Block Wrapper
pub struct Cbw {
    pub tag: u32,
    pub transfer_len: u32,
    pub direction: DataDirection,
    pub block: Vec<u8>,
}

impl Cbw {
    pub fn new(transfer_len: u32, direction: DataDirection, block: Vec<u8>) -> Cbw {
        Cbw {
            tag: DEFAULT_TAG,
            transfer_len,
            direction,
            block,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        assert!((1..=16).contains(&self.block.len()));

        let mut bytes = vec![];
        bytes.extend_from_slice(&0x43425355u32.to_le_bytes());
        bytes.extend_from_slice(&self.tag.to_le_bytes());
        bytes.extend_from_slice(&self.transfer_len.to_le_bytes());
        bytes.push(match self.direction {
            DataDirection::In => 1 << 7,
            DataDirection::Out => 0,
        });
        bytes.push(0); // lun
        bytes.push(self.block.len() as u8);

        let mut block = [0u8; 16];
        block[..self.block.len()].copy_from_slice(&self.block);
        bytes.extend_from_slice(&block);

        bytes
    }
}

pub fn clear_feature_in() -> SetupPacket {
    SetupPacket {
        bm_request_type: 0x02,
        b_request: 0x01,
        w_value: 0,
        w_index: 0x80 | EP_IN as u16,
        w_length: 0,
    }
}

pub fn clear_feature_out() -> SetupPacket {
    SetupPacket {
        bm_request_type: 0x02,
        b_request: 0x01,
        w_value: 0,
        w_index: EP_OUT as u16,
        w_length: 0,
    }
}

pub fn get_max_lun() -> SetupPacket {
    SetupPacket {
        bm_request_type: 0xA1,
        b_request: 0xFE,
        w_value: 0,
        w_index: MSC_INTERFACE,
        w_length: 1,
    }
}

pub fn msc_reset() -> SetupPacket {
    SetupPacket {
        bm_request_type: 0x21,
        b_request: 0xFF,
        w_value: 0,
        w_index: MSC_INTERFACE,
        w_length: 0,
    }
}

pub type TestMsc = Msc<MockController, RamDisk, Vec<u8>>;

/// Engine under test plus host-side handles on its collaborators
pub struct Rig {
    pub msc: TestMsc,
    pub ctrl: MockController,
    pub disk: RamDisk,
}

impl Rig {
    /// Engine with `disk` registered and buffers sized to its write block
    pub fn new(disk: RamDisk) -> Rig {
        let buf_len = disk.write_block_size() as usize;
        let mut rig = Rig::with_buffers(disk.clone(), buf_len);
        rig.msc.register_block_device(disk).unwrap();
        rig
    }

    /// Engine with no registered backing device
    pub fn without_device() -> Rig {
        Rig::with_buffers(RamDisk::new(0, 512, 4096), 512)
    }

    fn with_buffers(disk: RamDisk, buf_len: usize) -> Rig {
        let ctrl = MockController::new();
        let endpoints = Endpoints {
            ep_in: EP_IN,
            ep_out: EP_OUT,
            interface: MSC_INTERFACE,
        };
        let msc = Msc::new(
            ctrl.clone(),
            PACKET_SIZE,
            endpoints,
            vec![0u8; buf_len],
            vec![0u8; buf_len],
        )
        .unwrap();
        Rig { msc, ctrl, disk }
    }

    /// Sends a CBW as the host would, returning the RX acknowledgement
    pub fn send_cbw(&mut self, cbw: Cbw) -> bool {
        self.msc.handle_rx(&cbw.into_bytes())
    }

    /// Sends host data in packet-sized chunks, returning the last RX
    /// acknowledgement
    pub fn send_data(&mut self, data: &[u8]) -> bool {
        let mut ack = true;
        for chunk in data.chunks(PACKET_SIZE as usize) {
            ack = self.msc.handle_rx(chunk);
        }
        ack
    }

    /// Reads `n` data bytes from the IN endpoint, confirming each packet
    pub fn read_data(&mut self, n: usize) -> Vec<u8> {
        let mut bytes = vec![];
        while bytes.len() < n {
            let (ep, packet) = self.ctrl.next_packet().expect("expected a data packet");
            assert_eq!(EP_IN, ep);
            assert!(!packet.is_empty(), "unexpected zero-length packet");
            bytes.extend_from_slice(&packet);
            self.msc.handle_tx_complete();
        }
        assert_eq!(n, bytes.len());
        bytes
    }

    /// Reads and confirms a zero-length packet terminating a short transfer
    pub fn read_zlp(&mut self) {
        let (ep, packet) = self.ctrl.next_packet().expect("expected a ZLP");
        assert_eq!(EP_IN, ep);
        assert!(packet.is_empty());
        self.msc.handle_tx_complete();
    }

    /// Reads and confirms the CSW
    pub fn read_csw(&mut self) -> Csw {
        let (ep, packet) = self.ctrl.next_packet().expect("expected a CSW");
        assert_eq!(EP_IN, ep);
        let csw = Csw::from_bytes(&packet);
        self.msc.handle_tx_complete();
        csw
    }

    /// Issues REQUEST SENSE and returns (sense key, ASC, ASCQ)
    pub fn request_sense(&mut self) -> (u8, u8, u8) {
        let ack = self.send_cbw(Cbw::new(18, DataDirection::In, scsi::request_sense(18)));
        assert!(ack);
        let data = self.read_data(18);
        assert_eq!(0xF0, data[0]);
        assert_eq!(10, data[7]);
        let csw = self.read_csw();
        assert_eq!(CommandStatus::Passed, csw.status);
        (data[2] & 0x0F, data[12], data[13])
    }
}
