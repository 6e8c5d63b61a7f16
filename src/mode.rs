//! MODE SENSE and MODE SELECT emulation
//!
//! Supported pages are read/write error recovery (0x01), caching (0x08),
//! control (0x0a) and informational exceptions (0x1c). None of them have
//! changeable fields, so MODE SELECT only accepts a page identical to the
//! current values.

use crate::buffer::{cdb_byte, ResponseBuf, SE_MODE_PAGE_BUF};
use crate::command::Command;
use crate::device::{DeviceType, UaInterlock};
use crate::error::{SenseReason, SenseResult};
use crate::scsi::{opcode, scsi_status};
use crate::vpd::prot_pass_enabled;

/// Largest mode page the emulator generates
pub const MODE_PAGE_MAX_LEN: usize = 20;

/// Page control: changeable values
const PC_CHANGEABLE: u8 = 1;

/// Generates a mode page for a page control value, returning its length
pub type ModePageFn = fn(&Command<'_>, u8, &mut [u8; MODE_PAGE_MAX_LEN]) -> usize;

pub struct ModePageHandler {
    pub page: u8,
    pub subpage: u8,
    pub emulate: ModePageFn,
}

pub static MODESENSE_HANDLERS: &[ModePageHandler] = &[
    ModePageHandler { page: 0x01, subpage: 0x00, emulate: modesense_rwrecovery },
    ModePageHandler { page: 0x08, subpage: 0x00, emulate: modesense_caching },
    ModePageHandler { page: 0x0a, subpage: 0x00, emulate: modesense_control },
    ModePageHandler { page: 0x1c, subpage: 0x00, emulate: modesense_informational_exceptions },
];

fn find_handler(page: u8, subpage: u8) -> Option<&'static ModePageHandler> {
    MODESENSE_HANDLERS
        .iter()
        .find(|h| h.page == page && h.subpage == subpage)
}

fn modesense_rwrecovery(_: &Command<'_>, _pc: u8, p: &mut [u8; MODE_PAGE_MAX_LEN]) -> usize {
    p[0] = 0x01;
    p[1] = 0x0a;
    12
}

fn modesense_caching(cmd: &Command<'_>, pc: u8, p: &mut [u8; MODE_PAGE_MAX_LEN]) -> usize {
    p[0] = 0x08;
    p[1] = 0x12;

    if pc != PC_CHANGEABLE {
        if cmd.device.check_wce() {
            p[2] = 0x04; // WCE
        }
        p[12] = 0x20; // DRA
    }

    20
}

fn modesense_control(cmd: &Command<'_>, pc: u8, p: &mut [u8; MODE_PAGE_MAX_LEN]) -> usize {
    let dev = cmd.device;

    p[0] = 0x0a;
    p[1] = 0x0a;

    if pc == PC_CHANGEABLE {
        return 12;
    }

    // GLTSD, and D_SENSE once LBAs need more than 32 bits
    p[2] = 0x02;
    if dev.sense_desc_format() {
        p[2] |= 0x04;
    }

    // QUEUE ALGORITHM MODIFIER: 0 restricted, 1 unrestricted reordering
    p[3] = if dev.attrib.emulate_rest_reord { 0x00 } else { 0x10 };

    p[4] = match dev.attrib.emulate_ua_intlck_ctrl {
        UaInterlock::EstablishUa => 0x30,
        UaInterlock::NoClear => 0x20,
        UaInterlock::Clear => 0x00,
    };

    // TAS
    p[5] = if dev.attrib.emulate_tas { 0x40 } else { 0x00 };
    // ATO
    if prot_pass_enabled(cmd) {
        p[5] |= 0x80;
    }

    // BUSY TIMEOUT PERIOD: unlimited
    p[8] = 0xff;
    p[9] = 0xff;
    // EXTENDED SELF-TEST COMPLETION TIME
    p[11] = 30;

    12
}

fn modesense_informational_exceptions(
    _: &Command<'_>,
    _pc: u8,
    p: &mut [u8; MODE_PAGE_MAX_LEN],
) -> usize {
    p[0] = 0x1c;
    p[1] = 0x0a;
    12
}

/// Append a page at `off`, returning its length
fn put_page(cmd: &Command<'_>, h: &ModePageHandler, pc: u8, buf: &mut ResponseBuf, off: usize) -> usize {
    let mut page = [0u8; MODE_PAGE_MAX_LEN];
    let len = (h.emulate)(cmd, pc, &mut page);
    buf.put_bytes(off, &page[..len]);
    len
}

/// Short block descriptor: NUMBER OF BLOCKS clamped to 32 bits
fn put_blockdesc(buf: &mut ResponseBuf, off: usize, blocks: u64, block_size: u32) -> usize {
    buf.put_u8(off, 8);
    buf.put_be32(off + 1, blocks.min(u32::MAX as u64) as u32);
    buf.put_be32(off + 5, block_size);
    9
}

/// Long LBA block descriptor for MODE SENSE(10), starting at the LONGLBA byte
fn put_long_blockdesc(buf: &mut ResponseBuf, off: usize, blocks: u64, block_size: u32) -> usize {
    if blocks <= u32::MAX as u64 {
        return put_blockdesc(buf, off + 3, blocks, block_size) + 3;
    }

    buf.put_u8(off, 0x01); // LONGLBA
    buf.put_u8(off + 3, 16);
    buf.put_be64(off + 4, blocks);
    buf.put_be32(off + 16, block_size);
    20
}

fn build_modesense(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<usize> {
    let dev = cmd.device;
    let dev_type = dev.device_type();
    let ten = cdb_byte(&cmd.cdb, 0) == opcode::MODE_SENSE_10;
    let dbd = cdb_byte(&cmd.cdb, 1) & 0x08 != 0;
    let llba = ten && cdb_byte(&cmd.cdb, 1) & 0x10 != 0;
    let pc = cdb_byte(&cmd.cdb, 2) >> 6;
    let page = cdb_byte(&cmd.cdb, 2) & 0x3f;
    let subpage = cdb_byte(&cmd.cdb, 3);

    // Skip MODE DATA LENGTH and MEDIUM TYPE
    let mut length = if ten { 3 } else { 2 };

    // DEVICE-SPECIFIC PARAMETER
    let read_only = cmd.lun.read_only || cmd.dev_entry().map_or(false, |e| e.read_only);
    if read_only {
        buf.set_bits(length, 0x80); // WP
    }
    if dev.check_fua() && dev_type == DeviceType::Disk {
        buf.set_bits(length, 0x10); // DPOFUA
    }
    length += 1;

    if !dbd && dev_type == DeviceType::Disk {
        // NUMBER OF BLOCKS is the block count, one more than the last LBA
        let blocks = dev.capacity();
        let block_size = dev.attrib.block_size;
        if ten {
            if llba {
                length += put_long_blockdesc(buf, length, blocks, block_size);
            } else {
                length += 3;
                length += put_blockdesc(buf, length, blocks, block_size);
            }
        } else {
            length += put_blockdesc(buf, length, blocks, block_size);
        }
    } else {
        length += if ten { 4 } else { 1 };
    }

    if page == 0x3f {
        if subpage != 0x00 && subpage != 0xff {
            log::warn!("MODE_SENSE: Invalid subpage code: 0x{:02x}", subpage);
            return Err(SenseReason::InvalidCdbField);
        }

        // subpage 0x00 selects every subpage-0 page, 0xff every page
        for h in MODESENSE_HANDLERS.iter().filter(|h| h.subpage & !subpage == 0) {
            let mut page_buf = [0u8; MODE_PAGE_MAX_LEN];
            let ret = (h.emulate)(cmd, pc, &mut page_buf);
            if !ten && length + ret >= 255 {
                break;
            }
            buf.put_bytes(length, &page_buf[..ret]);
            length += ret;
        }
    } else {
        match find_handler(page, subpage) {
            Some(h) => length += put_page(cmd, h, pc, buf, length),
            None => {
                // Obsolete page 0x03 (format parameters) is probed by some initiators
                if page != 0x03 {
                    log::error!(
                        "MODE SENSE: unimplemented page/subpage: 0x{:02x}/0x{:02x}",
                        page,
                        subpage
                    );
                }
                return Err(SenseReason::UnknownModePage);
            }
        }
    }

    if ten {
        buf.put_be16(0, (length - 2) as u16);
    } else {
        buf.put_u8(0, (length - 1) as u8);
    }

    Ok(length)
}

/// Emulate MODE SENSE(6) and MODE SENSE(10)
pub fn emulate_modesense(cmd: &mut Command<'_>) -> SenseResult<()> {
    let mut buf = ResponseBuf::new(SE_MODE_PAGE_BUF);
    let length = build_modesense(cmd, &mut buf)?;

    let data_length = cmd.data_length as usize;
    let mut map = cmd.map_data().ok_or(SenseReason::CommunicationFailure)?;
    buf.copy_to(&mut map, SE_MODE_PAGE_BUF.min(data_length));
    drop(map);

    cmd.complete_with_length(length as u32);
    Ok(())
}

/// Emulate MODE SELECT(6) and MODE SELECT(10)
pub fn emulate_modeselect(cmd: &mut Command<'_>) -> SenseResult<()> {
    let ten = cdb_byte(&cmd.cdb, 0) == opcode::MODE_SELECT_10;
    let off = if ten { 8 } else { 4 };
    let pf = cdb_byte(&cmd.cdb, 1) & 0x10 != 0;
    let data_length = cmd.data_length as usize;

    if data_length == 0 {
        cmd.complete(scsi_status::GOOD);
        return Ok(());
    }

    if data_length < off + 2 {
        return Err(SenseReason::ParameterListLength);
    }

    let params = {
        let map = cmd.map_data().ok_or(SenseReason::CommunicationFailure)?;
        map.to_vec()
    };

    if !pf {
        return Err(SenseReason::InvalidCdbField);
    }

    let page = params[off] & 0x3f;
    let subpage = if params[off] & 0x40 != 0 { params[off + 1] } else { 0 };

    let h = find_handler(page, subpage).ok_or(SenseReason::UnknownModePage)?;
    let mut current = [0u8; MODE_PAGE_MAX_LEN];
    let length = (h.emulate)(cmd, 0, &mut current);

    if data_length < off + length {
        return Err(SenseReason::ParameterListLength);
    }
    if params[off..off + length] != current[..length] {
        return Err(SenseReason::InvalidParameterList);
    }

    cmd.complete(scsi_status::GOOD);
    Ok(())
}
