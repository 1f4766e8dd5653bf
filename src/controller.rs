//! USB device-controller port
//!
//! The engine drives the controller through this trait only; enumeration,
//! endpoint DMA and descriptor assembly live on the other side of it. The
//! integrator registers the engine's [handle_rx], [handle_tx_complete] and
//! [handle_setup] methods as the controller's bulk-OUT, bulk-IN-complete and
//! setup callbacks.
//!
//! [handle_rx]: crate::device::Msc::handle_rx
//! [handle_tx_complete]: crate::device::Msc::handle_tx_complete
//! [handle_setup]: crate::device::Msc::handle_setup

/// Default control endpoint address
pub const CONTROL_ENDPOINT: u8 = 0;

/// Standard CLEAR_FEATURE request, used for ENDPOINT_HALT
pub const REQ_CLEAR_FEATURE: u8 = 0x01;
/// Class specific Get Max LUN request. Spec. section 3.2
pub const REQ_GET_MAX_LUN: u8 = 0xFE;
/// Class specific Bulk-Only Mass Storage Reset request. Spec. section 3.1
pub const REQ_MSC_RESET: u8 = 0xFF;

/// A decoded SETUP packet
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

/// Operations the engine requires from a USB device controller.
///
/// All methods are called from whatever context the engine's handlers run
/// in; implementations must be safe to use from the controller's own
/// interrupt callbacks.
pub trait Controller {
    /// Queues a packet on the given IN endpoint, returning whether the
    /// endpoint accepted it. An empty slice sends a zero-length bulk packet.
    fn send_in_packet(&mut self, ep: u8, data: &[u8]) -> bool;

    /// Releases an OUT transfer whose reception handler returned `false`,
    /// allowing the hardware to accept the next OUT packet
    fn ack_out_transfer(&mut self, ep: u8);

    fn set_stall_in(&mut self, ep: u8);
    fn set_stall_out(&mut self, ep: u8);
    fn clear_stall_in(&mut self, ep: u8);
    fn clear_stall_out(&mut self, ep: u8);

    /// Sends a zero-length packet on the control endpoint to complete the
    /// status stage of a setup request
    fn send_zlp(&mut self);
}

/// Bulk endpoint and interface numbers assigned to the Mass Storage
/// function by the integrator's descriptor set
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoints {
    /// Bulk IN endpoint number
    pub ep_in: u8,
    /// Bulk OUT endpoint number
    pub ep_out: u8,
    /// Interface number, matched against `wIndex` of class requests
    pub interface: u16,
}
