//! INQUIRY and the Vital Product Data pages

use core::borrow::BorrowMut;

use crate::block_device::BlockDevice;
use crate::bot::CommandStatus;
use crate::controller::Controller;
use crate::device::Msc;
use crate::scsi::{Cdb, SenseCode, SenseKey, INQUIRY_RESP_LEN};
use crate::BLOCK_SIZE_USB;

struct VpdPage {
    page_code: u8,
    /// Advertised page length. Trailing reserved bytes may be omitted from
    /// the transmitted payload; the host presumes them zero.
    page_len: u8,
    data: &'static [u8],
}

/// These must be sorted in ascending order by page_code
static VPD_PAGES: [VpdPage; 3] = [
    VpdPage {
        // 5.4.5 Block Limits VPD page (B0h)
        // https://www.seagate.com/files/staticfiles/support/docs/manual/Interface%20manuals/100293068j.pdf
        page_code: 0xB0,
        page_len: 0x3C,
        data: &[
            0x00, 0x00, // WSNZ, MAXIMUM COMPARE AND WRITE LENGTH - Not supported
            0x00, 0x00, // OPTIMAL TRANSFER LENGTH GRANULARITY - Not supported
            0x00, 0x00, 0x00, 0x00, // MAXIMUM TRANSFER LENGTH - Not supported
            0x00, 0x00, 0x00, 0x00, // OPTIMAL TRANSFER LENGTH - Not supported
            0x00, 0x00, 0x00, 0x00, // MAXIMUM PREFETCH LENGTH - Not supported
            0xFF, 0xFF, 0xFF, 0xFF, // MAXIMUM UNMAP LBA COUNT - Maximum count supported
            0x00, 0x00, 0x00, 0x03, // MAXIMUM UNMAP BLOCK DESCRIPTOR COUNT - Max 3 descriptors
            0x00, 0x00, 0x00, 0x00, // OPTIMAL UNMAP GRANULARITY - Patched from geometry
            0x00, 0x00, 0x00, 0x00, // UNMAP GRANULARITY ALIGNMENT - Patched from geometry
            // All further bytes (MAXIMUM WRITE SAME LENGTH, the atomic
            // transfer fields) are zero and omitted from the response
        ],
    },
    VpdPage {
        // 5.4.3 Block Device Characteristics VPD page (B1h)
        page_code: 0xB1,
        page_len: 0x3C,
        data: &[
            0x00, 0x01, // Rotation rate (0x0001 - non-rotating medium)
            0x00, // Product type - Not indicated
            0x00, // WABEREQ/WACEREQ/Form Factor - Not specified
            0x00, // ZBC/BOCS/FUAB/VBULS
            // Reserved (55 bytes)
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00,
        ],
    },
    VpdPage {
        // 5.4.13 Logical Block Provisioning VPD page (B2h)
        page_code: 0xB2,
        page_len: 0x04,
        data: &[
            0x00, // Logical Block Provisioning Threshold Exponent
            0x80, // LBPU - UNMAP command supported
            0x00, // Minimum percentage/Provisioning type - Not specified
            0x00, // Threshold percentage - Not supported
        ],
    },
];

impl<C, D, Buf> Msc<C, D, Buf>
where
    C: Controller,
    D: BlockDevice,
    Buf: BorrowMut<[u8]>,
{
    pub(crate) fn command_inquiry(&mut self, cdb: Cdb) {
        if !cdb.evpd() {
            if cdb.page_code() != 0 {
                // 3.6.1 INQUIRY command introduction: a PAGE CODE without
                // the EVPD bit is invalid
                self.send_error(
                    CommandStatus::Failed,
                    SenseKey::IllegalRequest,
                    SenseCode::InvalidFieldInCdb,
                );
                return;
            }
            self.std_inquiry();
        } else {
            self.evpd_inquiry(cdb.page_code());
        }
    }

    fn std_inquiry(&mut self) {
        self.scratch.reset(INQUIRY_RESP_LEN);
        self.queued_bytes = INQUIRY_RESP_LEN as u32;
        self.total_bytes = INQUIRY_RESP_LEN as u32;

        let vendor_id = self.vendor_id;
        let product_id = self.product_id;
        let product_rev = self.product_rev;

        let buf = self.scratch.as_mut_slice();
        // byte 0 - Peripheral Device Type (0x00 for direct access block device)
        // byte 1 - Removable media bit
        buf[1] = 0x80;
        // byte 2 - Version 0x00 - conformance to no particular standard
        // byte 3 - Response data format
        buf[3] = 2;
        // byte 4 - Additional length (number of bytes after this one)
        buf[4] = (INQUIRY_RESP_LEN - 5) as u8;
        // bytes 5-7 - Not used
        buf[8..16].copy_from_slice(&vendor_id);
        buf[16..32].copy_from_slice(&product_id);
        buf[32..36].copy_from_slice(&product_rev);
    }

    fn evpd_inquiry(&mut self, page_code: u8) {
        let page_len: usize;
        match page_code {
            0x00 => {
                // 5.4.18 Supported Vital Product Data pages (00h), in
                // ascending order and including this synthetic page itself
                page_len = VPD_PAGES.len() + 1;
                self.scratch.reset(page_len + 4);
                let buf = self.scratch.as_mut_slice();
                for (i, page) in VPD_PAGES.iter().enumerate() {
                    buf[5 + i] = page.page_code; // buf[4] stays 0x00
                }
            }
            _ => {
                let Some(page) = VPD_PAGES.iter().find(|p| p.page_code == page_code) else {
                    self.send_error(
                        CommandStatus::Failed,
                        SenseKey::IllegalRequest,
                        SenseCode::InvalidFieldInCdb,
                    );
                    return;
                };
                // The response carries the bytes we have plus the four byte
                // header, while declaring the full length per the spec
                page_len = page.page_len as usize;
                self.scratch.reset(page.data.len() + 4);
                self.scratch.as_mut_slice()[4..].copy_from_slice(page.data);
                if page_code == 0xB0 {
                    self.patch_block_limits();
                }
            }
        }

        let buf = self.scratch.as_mut_slice();
        // byte 0 - Peripheral Device Type (0x00 for direct access block device)
        buf[1] = page_code;
        buf[2..4].copy_from_slice(&(page_len as u16).to_be_bytes());

        // The response length is the transfer length
        let len = self.scratch.len() as u32;
        self.queued_bytes = len;
        self.total_bytes = len;
    }

    /// Fills the unmap granularity words of the Block Limits page from the
    /// registered device's geometry
    fn patch_block_limits(&mut self) {
        // OPTIMAL UNMAP GRANULARITY: write blocks per erase block
        let granularity = self.erase_block_size / BLOCK_SIZE_USB;
        // UNMAP GRANULARITY ALIGNMENT, with the UGAVALID bit set. The
        // exposed region is aligned to the end of the device, so the
        // alignment is the erase-block remainder.
        // optimal unmap request starting LBA =
        //     (n * OPTIMAL UNMAP GRANULARITY) + UNMAP GRANULARITY ALIGNMENT
        let alignment = (self.erase_block_size % BLOCK_SIZE_USB) | 0x8000_0000;

        let buf = self.scratch.as_mut_slice();
        buf[4 + 24..4 + 28].copy_from_slice(&granularity.to_be_bytes());
        buf[4 + 28..4 + 32].copy_from_slice(&alignment.to_be_bytes());
    }
}
