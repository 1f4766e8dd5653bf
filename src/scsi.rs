//! SCSI codec
//!
//! Opcode and sense taxonomies plus the Command Descriptor Block accessor.
//! Refer to specifications (SPC, SAM, SBC, MMC, etc.). All multi-byte fields
//! are big-endian.

use num_enum::TryFromPrimitive;

/// SCSI operation codes understood by the device.
///
/// Commands outside this list, and the listed ones the engine has no handler
/// for, answer Failed with IllegalRequest/InvalidCmdOpCode.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Opcode {
    /// TEST UNIT READY determines if a device is ready to transfer data
    TestUnitReady = 0x00,
    /// REQUEST SENSE returns the current sense data
    RequestSense = 0x03,
    /// INQUIRY obtains basic information from a target device
    Inquiry = 0x12,
    /// MODE SELECT (6) lets the application client specify parameters
    ModeSelect6 = 0x15,
    /// MODE SENSE (6) reports parameters to an application client
    ModeSense6 = 0x1A,
    /// START STOP UNIT starts or stops the medium
    StartStopUnit = 0x1B,
    /// PREVENT ALLOW MEDIUM REMOVAL locks or unlocks the storage medium
    PreventAllowMediumRemoval = 0x1E,
    /// READ FORMAT CAPACITY lists the possible format capacities
    ReadFormatCapacity = 0x23,
    /// READ CAPACITY obtains data capacity information
    ReadCapacity10 = 0x25,
    /// READ (10) transfers logical blocks to the data-in buffer
    Read10 = 0x28,
    /// WRITE (10) writes logical blocks from the data-out buffer
    Write10 = 0x2A,
    /// UNMAP marks logical blocks as no longer in use
    Unmap = 0x42,
    /// MODE SELECT (10)
    ModeSelect10 = 0x55,
    /// MODE SENSE (10)
    ModeSense10 = 0x5A,
}

/// Sense keys. 4.5.6 Sense key and sense code definitions
/// <https://www.t10.org/ftp/t10/document.08/08-309r0.pdf>
#[repr(u8)]
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SenseKey {
    /// No error condition
    #[default]
    None = 0x00,
    /// The LUN addressed is not ready to be accessed
    NotReady = 0x02,
    /// The command terminated with an unrecoverable error condition
    MediumError = 0x03,
    /// An illegal parameter was provided in the CDB or the parameter list
    IllegalRequest = 0x05,
    /// The drive may have been reset
    UnitAttention = 0x06,
    /// The addressed block is protected from this operation
    DataProtect = 0x07,
    /// The drive aborted the command
    AbortedCommand = 0x0B,
    /// The device reached the end of the medium partition
    VolumeOverflow = 0x0D,
}

/// Additional sense codes qualifying a [SenseKey]
#[repr(u8)]
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SenseCode {
    #[default]
    None = 0x00,
    /// LUN communication failure (AbortedCommand)
    LunCommFailure = 0x08,
    /// The command operation code is not supported (IllegalRequest)
    InvalidCmdOpCode = 0x20,
    /// The LBA is beyond the end of the volume (VolumeOverflow)
    LbaOutOfRange = 0x21,
    /// The CDB contains an invalid field (IllegalRequest)
    InvalidFieldInCdb = 0x24,
    /// The media is write protected (DataProtect)
    WriteProtected = 0x27,
    /// The storage medium is not present (NotReady)
    MediumNotPresent = 0x3A,
    /// The command was rejected by the device (AbortedCommand)
    MsgReject = 0x43,
}

pub const INQUIRY_RESP_LEN: usize = 36;
pub const MODE_SENSE6_RESP_LEN: usize = 4;
pub const MODE_SENSE10_RESP_LEN: usize = 8;
pub const READ_CAPACITY_RESP_LEN: usize = 8;
pub const READ_FORMAT_CAPACITY_RESP_LEN: usize = 12;
pub const REQUEST_SENSE_RESP_LEN: usize = 18;

/// Command Descriptor Block carried inside a CBW.
///
/// A 16-byte by-value copy of the CBWCB field, so handlers can keep it while
/// mutating engine state.
#[derive(Copy, Clone)]
pub struct Cdb {
    data: [u8; 16],
}

impl Cdb {
    pub(crate) fn new(data: [u8; 16]) -> Cdb {
        Cdb { data }
    }

    pub fn opcode(&self) -> u8 {
        self.data[0]
    }

    pub fn kind(&self) -> Option<Opcode> {
        Opcode::try_from_primitive(self.data[0]).ok()
    }

    /// READ(10)/WRITE(10) logical block address
    pub fn lba(&self) -> u32 {
        u32::from_be_bytes(self.data[2..6].try_into().unwrap())
    }

    /// READ(10)/WRITE(10) transfer length in blocks
    pub fn transfer_blocks(&self) -> u16 {
        u16::from_be_bytes(self.data[7..9].try_into().unwrap())
    }

    /// UNMAP parameter list length in bytes (same CDB field as
    /// [transfer_blocks], named for the command that reads it)
    ///
    /// [transfer_blocks]: Cdb::transfer_blocks
    pub fn param_list_len(&self) -> u16 {
        self.transfer_blocks()
    }

    /// INQUIRY EVPD bit
    pub fn evpd(&self) -> bool {
        self.data[1] & 0x01 != 0
    }

    /// INQUIRY VPD page code
    pub fn page_code(&self) -> u8 {
        self.data[2]
    }
}
