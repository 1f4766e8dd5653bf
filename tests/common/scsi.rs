//! Host-side CDB builders

pub const TEST_UNIT_READY: u8 = 0x00;
pub const REQUEST_SENSE: u8 = 0x03;
pub const INQUIRY: u8 = 0x12;
pub const MODE_SENSE_6: u8 = 0x1A;
pub const MODE_SENSE_10: u8 = 0x5A;
pub const READ_FORMAT_CAPACITY: u8 = 0x23;
pub const READ_CAPACITY_10: u8 = 0x25;
pub const READ_10: u8 = 0x28;
pub const WRITE_10: u8 = 0x2A;
pub const UNMAP: u8 = 0x42;

pub fn test_unit_ready() -> Vec<u8> {
    vec![TEST_UNIT_READY, 0, 0, 0, 0, 0]
}

pub fn request_sense(alloc_len: u8) -> Vec<u8> {
    vec![REQUEST_SENSE, 0, 0, 0, alloc_len, 0]
}

pub fn inquiry(evpd: bool, page_code: u8, alloc_len: u16) -> Vec<u8> {
    let mut cdb = vec![INQUIRY, evpd as u8, page_code];
    cdb.extend_from_slice(&alloc_len.to_be_bytes());
    cdb.push(0);
    cdb
}

pub fn mode_sense6(alloc_len: u8) -> Vec<u8> {
    vec![MODE_SENSE_6, 0, 0x3F, 0, alloc_len, 0]
}

pub fn mode_sense10(alloc_len: u16) -> Vec<u8> {
    let mut cdb = vec![MODE_SENSE_10, 0, 0x3F, 0, 0, 0, 0];
    cdb.extend_from_slice(&alloc_len.to_be_bytes());
    cdb.push(0);
    cdb
}

pub fn read_format_capacity(alloc_len: u16) -> Vec<u8> {
    let mut cdb = vec![READ_FORMAT_CAPACITY, 0, 0, 0, 0, 0, 0];
    cdb.extend_from_slice(&alloc_len.to_be_bytes());
    cdb.push(0);
    cdb
}

pub fn read_capacity10() -> Vec<u8> {
    vec![READ_CAPACITY_10, 0, 0, 0, 0, 0, 0, 0, 0, 0]
}

pub fn read10(lba: u32, blocks: u16) -> Vec<u8> {
    rw10(READ_10, lba, blocks)
}

pub fn write10(lba: u32, blocks: u16) -> Vec<u8> {
    rw10(WRITE_10, lba, blocks)
}

fn rw10(opcode: u8, lba: u32, blocks: u16) -> Vec<u8> {
    let mut cdb = vec![opcode, 0];
    cdb.extend_from_slice(&lba.to_be_bytes());
    cdb.push(0);
    cdb.extend_from_slice(&blocks.to_be_bytes());
    cdb.push(0);
    cdb
}

pub fn unmap(param_list_len: u16) -> Vec<u8> {
    let mut cdb = vec![UNMAP, 0, 0, 0, 0, 0, 0];
    cdb.extend_from_slice(&param_list_len.to_be_bytes());
    cdb.push(0);
    cdb
}

/// Builds an UNMAP parameter list from (lba, block count) ranges
pub fn unmap_param_list(ranges: &[(u64, u32)]) -> Vec<u8> {
    let desc_len = (ranges.len() * 16) as u16;
    let mut list = vec![];
    list.extend_from_slice(&(desc_len + 6).to_be_bytes());
    list.extend_from_slice(&desc_len.to_be_bytes());
    list.extend_from_slice(&[0; 4]);
    for (lba, count) in ranges {
        list.extend_from_slice(&lba.to_be_bytes());
        list.extend_from_slice(&count.to_be_bytes());
        list.extend_from_slice(&[0; 4]);
    }
    list
}
