//! Control requests and the configuration surface

use core::borrow::BorrowMut;

use crate::block_device::BlockDevice;
use crate::controller::{
    Controller, SetupPacket, CONTROL_ENDPOINT, REQ_CLEAR_FEATURE, REQ_GET_MAX_LUN, REQ_MSC_RESET,
};
use crate::device::{Msc, State};
use crate::fmt::info;

impl<C, D, Buf> Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    /// Handles a SETUP packet addressed to the Mass Storage interface or its
    /// endpoints, returning whether the request was accepted. The integrator
    /// stalls the control endpoint on `false`.
    pub fn handle_setup(&mut self, setup: SetupPacket) -> bool {
        match setup.b_request {
            REQ_CLEAR_FEATURE => self.handle_clear_feature(setup),
            REQ_GET_MAX_LUN => self.handle_get_max_lun(setup),
            REQ_MSC_RESET => self.handle_reset(setup),
            _ => false,
        }
    }

    /// CLEAR_FEATURE for ENDPOINT_HALT
    fn handle_clear_feature(&mut self, setup: SetupPacket) -> bool {
        // wValue is the feature selector; only ENDPOINT_HALT (0) is handled
        if setup.w_value != 0 {
            return false;
        }

        // Clear the direction bit from the endpoint address for comparison
        let w_index = setup.w_index & 0x7F;

        if self.state == State::NeedReset {
            // 6.6.1 CBW Not Valid: clearing the stall is not enough, keep
            // stalling until a Reset Recovery. The host shall issue in order
            // (a) a Bulk-Only Mass Storage Reset, (b) a Clear Feature HALT
            // on the Bulk-In endpoint, (c) the same on Bulk-Out.
            // https://usb.org/sites/default/files/usbmassbulk_10.pdf
            if w_index == self.endpoints.ep_in as u16 {
                self.stall_in();
            } else if w_index == self.endpoints.ep_out as u16 {
                self.stall_out();
            }
            return false;
        }

        // Clear the IN/OUT stalls if addressed to the endpoint, or both if
        // addressed to the interface
        let mut ok = false;
        if w_index == self.endpoints.ep_in as u16 || w_index == self.endpoints.interface {
            self.clear_stall_in();
            ok = true;
        }
        if w_index == self.endpoints.ep_out as u16 || w_index == self.endpoints.interface {
            self.clear_stall_out();
            ok = true;
        }

        // Resume a parked status phase once the IN endpoint works again
        if self.state == State::Status && w_index == self.endpoints.ep_in as u16 {
            self.send_csw(self.resp_status);
            ok = true;
        }

        if ok {
            self.ctrl.send_zlp();
        }
        ok
    }

    /// 3.2 Get Max LUN
    /// <https://usb.org/sites/default/files/usbmassbulk_10.pdf>
    fn handle_get_max_lun(&mut self, setup: SetupPacket) -> bool {
        if setup.w_index != self.endpoints.interface || setup.w_length != 1 || setup.w_value != 0 {
            return false;
        }
        // The maximum LUN number is zero-indexed: n-1 for n units
        self.ctrl.send_in_packet(CONTROL_ENDPOINT, &[self.max_lun])
    }

    /// 3.1 Bulk-Only Mass Storage Reset
    /// <https://usb.org/sites/default/files/usbmassbulk_10.pdf>
    fn handle_reset(&mut self, setup: SetupPacket) -> bool {
        if setup.w_index != self.endpoints.interface || setup.w_length != 0 || setup.w_value != 0 {
            return false;
        }
        info!("usb: msc: Recv reset");

        // Back to command waiting state; pending data and sense are gone.
        // Endpoint stalls stay until the host clears them.
        self.set_state(State::Cmd);
        self.scratch.clear();
        self.task_queued = false;
        self.queued_bytes = 0;
        self.send_zlp = false;
        self.clear_sense();

        // A zero-length packet signals that the reset is complete
        self.ctrl.send_zlp();
        true
    }

    fn set_string_field(field: &mut [u8], value: &str) {
        let bytes = value.as_bytes();
        for (i, b) in field.iter_mut().enumerate() {
            *b = if i < bytes.len() { bytes[i] } else { 0x20 };
        }
    }

    /// Sets the INQUIRY vendor identification (up to 8 ASCII characters,
    /// right-padded with spaces)
    pub fn set_vendor_id(&mut self, vendor_id: &str) {
        Self::set_string_field(&mut self.vendor_id, vendor_id);
    }

    /// Sets the INQUIRY product identification (up to 16 ASCII characters,
    /// right-padded with spaces)
    pub fn set_product_id(&mut self, product_id: &str) {
        Self::set_string_field(&mut self.product_id, product_id);
    }

    /// Sets the INQUIRY product revision (up to 4 ASCII characters,
    /// right-padded with spaces)
    pub fn set_product_rev(&mut self, product_rev: &str) {
        Self::set_string_field(&mut self.product_rev, product_rev);
    }
}
