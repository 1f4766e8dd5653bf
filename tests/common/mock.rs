use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use usbd_msc::block_device::BlockDevice;
use usbd_msc::controller::{Controller, CONTROL_ENDPOINT};

use crate::common::{EP_IN, EP_OUT};

#[derive(Debug, Eq, PartialEq)]
pub enum CommandStatus {
    Passed = 0x00,
    Failed = 0x01,
    PhaseError = 0x02,
}

/// Host-side view of a Command Status Wrapper
#[derive(Debug, Eq, PartialEq)]
pub struct Csw {
    pub tag: u32,
    pub residue: u32,
    pub status: CommandStatus,
}

impl Csw {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(13, bytes.len());
        assert_eq!(&0x53425355u32.to_le_bytes(), &bytes[..4], "CSW signature");

        let status = match bytes[12] {
            0x00 => CommandStatus::Passed,
            0x01 => CommandStatus::Failed,
            0x02 => CommandStatus::PhaseError,
            _ => panic!("invalid status code"),
        };

        Self {
            tag: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            residue: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            status,
        }
    }
}

#[derive(Default)]
struct ControllerInner {
    /// Packets the device queued on IN endpoints, as (endpoint, bytes)
    packets: VecDeque<(u8, Vec<u8>)>,
    acks: usize,
    zlps: usize,
    in_stalled: bool,
    out_stalled: bool,
    control_stalled: bool,
    in_stall_count: usize,
}

/// Recording USB device controller. Cloning shares the state, so a test can
/// keep a handle after the engine takes ownership.
#[derive(Clone)]
pub struct MockController {
    inner: Arc<Mutex<ControllerInner>>,
}

impl MockController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ControllerInner::default())),
        }
    }

    /// Pops the next queued IN packet as (endpoint, bytes)
    pub fn next_packet(&self) -> Option<(u8, Vec<u8>)> {
        self.inner.lock().unwrap().packets.pop_front()
    }

    pub fn pending_packets(&self) -> usize {
        self.inner.lock().unwrap().packets.len()
    }

    pub fn acks(&self) -> usize {
        self.inner.lock().unwrap().acks
    }

    pub fn zlps(&self) -> usize {
        self.inner.lock().unwrap().zlps
    }

    pub fn in_stalled(&self) -> bool {
        self.inner.lock().unwrap().in_stalled
    }

    pub fn out_stalled(&self) -> bool {
        self.inner.lock().unwrap().out_stalled
    }

    pub fn control_stalled(&self) -> bool {
        self.inner.lock().unwrap().control_stalled
    }

    /// Number of times the IN endpoint was stalled, counting re-stalls
    pub fn in_stall_count(&self) -> usize {
        self.inner.lock().unwrap().in_stall_count
    }
}

impl Controller for MockController {
    fn send_in_packet(&mut self, ep: u8, data: &[u8]) -> bool {
        let mut lock = self.inner.lock().unwrap();
        lock.packets.push_back((ep, data.to_vec()));
        true
    }

    fn ack_out_transfer(&mut self, ep: u8) {
        assert_eq!(EP_OUT, ep);
        self.inner.lock().unwrap().acks += 1;
    }

    fn set_stall_in(&mut self, ep: u8) {
        let mut lock = self.inner.lock().unwrap();
        if ep == CONTROL_ENDPOINT {
            lock.control_stalled = true;
        } else {
            assert_eq!(EP_IN, ep);
            lock.in_stalled = true;
            lock.in_stall_count += 1;
        }
    }

    fn set_stall_out(&mut self, ep: u8) {
        assert_eq!(EP_OUT, ep);
        self.inner.lock().unwrap().out_stalled = true;
    }

    fn clear_stall_in(&mut self, ep: u8) {
        assert_eq!(EP_IN, ep);
        self.inner.lock().unwrap().in_stalled = false;
    }

    fn clear_stall_out(&mut self, ep: u8) {
        assert_eq!(EP_OUT, ep);
        self.inner.lock().unwrap().out_stalled = false;
    }

    fn send_zlp(&mut self) {
        self.inner.lock().unwrap().zlps += 1;
    }
}

struct RamDiskInner {
    data: Vec<u8>,
    write_block_size: u32,
    erase_block_size: u32,
    writes: Vec<(u64, usize)>,
    erases: Vec<(u64, u64)>,
}

/// RAM-backed block device recording every write and erase. Cloning shares
/// the state, like [MockController].
#[derive(Clone)]
pub struct RamDisk {
    inner: Arc<Mutex<RamDiskInner>>,
}

impl RamDisk {
    pub fn new(size: usize, write_block_size: u32, erase_block_size: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RamDiskInner {
                data: vec![0; size],
                write_block_size,
                erase_block_size,
                writes: vec![],
                erases: vec![],
            })),
        }
    }

    pub fn fill(&self, offset: usize, data: &[u8]) {
        self.inner.lock().unwrap().data[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn contents(&self, offset: usize, len: usize) -> Vec<u8> {
        self.inner.lock().unwrap().data[offset..offset + len].to_vec()
    }

    /// Recorded write_at calls as (offset, length)
    pub fn writes(&self) -> Vec<(u64, usize)> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Recorded erase_blocks calls as (start, count)
    pub fn erases(&self) -> Vec<(u64, u64)> {
        self.inner.lock().unwrap().erases.clone()
    }
}

impl BlockDevice for RamDisk {
    type Error = String;

    fn size(&self) -> u64 {
        self.inner.lock().unwrap().data.len() as u64
    }

    fn write_block_size(&self) -> u32 {
        self.inner.lock().unwrap().write_block_size
    }

    fn erase_block_size(&self) -> u32 {
        self.inner.lock().unwrap().erase_block_size
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, Self::Error> {
        let lock = self.inner.lock().unwrap();
        let offset = offset as usize;
        if offset + buf.len() > lock.data.len() {
            return Err(format!("read at {offset} out of bounds"));
        }
        buf.copy_from_slice(&lock.data[offset..offset + buf.len()]);
        Ok(buf.len())
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, Self::Error> {
        let mut lock = self.inner.lock().unwrap();
        let start = offset as usize;
        if start + buf.len() > lock.data.len() {
            return Err(format!("write at {start} out of bounds"));
        }
        lock.data[start..start + buf.len()].copy_from_slice(buf);
        lock.writes.push((offset, buf.len()));
        Ok(buf.len())
    }

    fn erase_blocks(&mut self, start: u64, count: u64) -> Result<(), Self::Error> {
        let mut lock = self.inner.lock().unwrap();
        let erase_block_size = lock.erase_block_size as u64;
        let from = (start * erase_block_size) as usize;
        let to = ((start + count) * erase_block_size) as usize;
        if to > lock.data.len() {
            return Err(format!("erase of blocks {start}+{count} out of bounds"));
        }
        lock.data[from..to].fill(0);
        lock.erases.push((start, count));
        Ok(())
    }
}
