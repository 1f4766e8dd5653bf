//! USB Mass Storage device over Bulk Only Transport
//!
//! This crate implements the Mass Storage Class protocol engine: CBW/CSW
//! framing, a SCSI (SBC/SPC) command set, and block-size translation between
//! the 512-byte blocks presented to the host and the native write/erase
//! granularity of a backing [BlockDevice]. The USB device controller itself
//! is abstracted behind the [Controller] port; descriptor assembly and
//! endpoint wiring stay with the integrator.
//!
//! Work is split between two contexts:
//! * packet handlers ([handle_rx], [handle_tx_complete], [handle_setup]) are
//!   meant to be called from the controller's interrupt callbacks;
//! * [process_task] runs writes and unmaps that may hold the backing device
//!   for a long time, and must be polled from a non-interrupt task.
//!
//! # Features
//! | Feature | Description                                                      |
//! | ------- |------------------------------------------------------------------|
//! | `defmt` | Enable logging via [defmt](https://crates.io/crates/defmt) crate |
//!
//! [BlockDevice]: crate::block_device::BlockDevice
//! [Controller]: crate::controller::Controller
//! [handle_rx]: crate::device::Msc::handle_rx
//! [handle_tx_complete]: crate::device::Msc::handle_tx_complete
//! [handle_setup]: crate::device::Msc::handle_setup
//! [process_task]: crate::device::Msc::process_task

#![no_std]

pub mod block_device;
pub mod bot;
pub(crate) mod buffer;
pub mod controller;
pub mod device;
pub(crate) mod fmt;
pub mod scsi;

/// USB Mass Storage Class code
pub const CLASS_MASS_STORAGE: u8 = 0x08;

/// SCSI Transparent command set subclass code
pub const SUBCLASS_SCSI: u8 = 0x06;

/// Bulk Only Transport interface protocol
pub const TRANSPORT_BULK_ONLY: u8 = 0x50;

/// Block size presented to the host, independent of the backing device
pub const BLOCK_SIZE_USB: u32 = 512;

/// Mass Storage configuration error
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A caller-provided buffer cannot fit a CBW, a single full packet or a
    /// full write block of the registered device
    BufferTooSmall,
}
