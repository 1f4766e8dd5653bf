//! Bulk Only Transport wrappers (BBB/BOT)
//!
//! Wire framing of every transaction: the 31-byte Command Block Wrapper sent
//! by the host and the 13-byte Command Status Wrapper answered by the device.
//! Wrapper fields are little-endian; the SCSI payload inside is big-endian
//! and decoded by [crate::scsi].

use crate::scsi::Cdb;

const CBW_SIGNATURE_LE: [u8; 4] = 0x43425355u32.to_le_bytes();
const CSW_SIGNATURE_LE: [u8; 4] = 0x53425355u32.to_le_bytes();

/// Command Block Wrapper message length
pub const CBW_LEN: usize = 31;
/// Command Status Wrapper message length
pub const CSW_LEN: usize = 13;

/// Inner transport-specific error
pub(crate) struct InvalidCbwError;

/// The status of a Mass Storage command.
///
/// Refer to the USB-MS doc.
#[repr(u8)]
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandStatus {
    #[default]
    Passed = 0x00,
    Failed = 0x01,
    PhaseError = 0x02,
}

/// Saved Command Block Wrapper.
///
/// Holds the raw 31 bytes of the last accepted CBW; accessors decode fields
/// in place so the copy taken in interrupt context stays a plain memcpy.
#[derive(Copy, Clone)]
pub(crate) struct Cbw {
    data: [u8; CBW_LEN],
}

impl Default for Cbw {
    fn default() -> Self {
        Cbw {
            data: [0; CBW_LEN],
        }
    }
}

impl Cbw {
    /// Validates length and signature of an incoming packet. Spec. 6.2.1
    pub fn try_from_packet(packet: &[u8]) -> Result<Cbw, InvalidCbwError> {
        if packet.len() != CBW_LEN || !packet.starts_with(&CBW_SIGNATURE_LE) {
            return Err(InvalidCbwError);
        }
        let mut data = [0u8; CBW_LEN];
        data.copy_from_slice(packet);
        Ok(Cbw { data })
    }

    pub fn tag(&self) -> u32 {
        u32::from_le_bytes(self.data[4..8].try_into().unwrap())
    }

    pub fn transfer_length(&self) -> u32 {
        u32::from_le_bytes(self.data[8..12].try_into().unwrap())
    }

    /// Whether the data direction is from the device to the host
    pub fn is_in(&self) -> bool {
        self.data[12] >> 7 != 0
    }

    /// Whether the data direction is from the host to the device
    pub fn is_out(&self) -> bool {
        !self.is_in()
    }

    pub fn scsi_cdb(&self) -> Cdb {
        Cdb::new(self.data[15..31].try_into().unwrap())
    }

    /// Builds the CSW answering this CBW. The tag is echoed verbatim.
    pub fn csw(&self, status: CommandStatus, residue: u32) -> [u8; CSW_LEN] {
        let mut csw = [0u8; CSW_LEN];
        csw[..4].copy_from_slice(CSW_SIGNATURE_LE.as_slice());
        csw[4..8].copy_from_slice(&self.data[4..8]);
        csw[8..12].copy_from_slice(residue.to_le_bytes().as_slice());
        csw[12] = status as u8;
        csw
    }
}
