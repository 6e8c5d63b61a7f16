//! Vital product data pages
//!
//! Each generator fills a zeroed [`ResponseBuf`] whose byte 0 (peripheral
//! device type) and byte 1 (page code) were already set by the INQUIRY
//! emulator, and leaves the page length in bytes 2..4.

use crate::buffer::ResponseBuf;
use crate::command::Command;
use crate::device::{DeviceType, ProtectionType, INQUIRY_MODEL_LEN, INQUIRY_VENDOR_LEN};
use crate::error::SenseResult;
use crate::target::PAGE_SIZE;

/// Largest SCSI NAME STRING that fits the one-byte designator length as a multiple of four
const SCSI_NAME_MAX_LEN: usize = 252;

/// Largest designator length of the T10 vendor ID designator
const T10_VENDOR_ID_MAX_LEN: usize = 255;

/// A VPD page generator
pub type VpdEmulateFn = fn(&Command<'_>, &mut ResponseBuf) -> SenseResult<()>;

/// Registry entry for a supported VPD page
pub struct VpdHandler {
    pub page: u8,
    pub emulate: VpdEmulateFn,
}

/// Supported VPD pages in the order page 0x00 lists them
pub static EVPD_HANDLERS: &[VpdHandler] = &[
    VpdHandler { page: 0x00, emulate: emulate_evpd_00 },
    VpdHandler { page: 0x80, emulate: emulate_evpd_80 },
    VpdHandler { page: 0x83, emulate: emulate_evpd_83 },
    VpdHandler { page: 0x86, emulate: emulate_evpd_86 },
    VpdHandler { page: 0xb0, emulate: emulate_evpd_b0 },
    VpdHandler { page: 0xb1, emulate: emulate_evpd_b1 },
    VpdHandler { page: 0xb2, emulate: emulate_evpd_b2 },
    VpdHandler { page: 0xb3, emulate: emulate_evpd_b3 },
];

pub fn find_handler(page: u8) -> Option<&'static VpdHandler> {
    EVPD_HANDLERS.iter().find(|h| h.page == page)
}

/// Fabric can pass protection information and some protection type is set
pub(crate) fn prot_pass_enabled(cmd: &Command<'_>) -> bool {
    match cmd.session {
        Some(sess) => {
            sess.supports_prot_pass()
                && (cmd.device.attrib.pi_prot_type.is_enabled() || sess.sess_prot_type.is_enabled())
        }
        None => false,
    }
}

/// Supported VPD pages
fn emulate_evpd_00(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    // Only advertised once a unit serial makes the NAA designator valid
    if cmd.device.has_unit_serial() {
        buf.put_u8(3, EVPD_HANDLERS.len() as u8);
        for (i, h) in EVPD_HANDLERS.iter().enumerate() {
            buf.put_u8(4 + i, h.page);
        }
    }
    Ok(())
}

/// Unit serial number
fn emulate_evpd_80(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    if let Some(serial) = &cmd.device.wwn.unit_serial {
        let n = buf.put_bytes(4, serial.as_bytes());
        // NUL terminator is counted in the page length
        buf.put_u8(3, (n + 1) as u8);
    }
    Ok(())
}

/// NAA IEEE Registered Extended designator (16 bytes)
///
/// The IEEE company id fills the first 24 bits after the NAA nibble; the
/// remaining nibbles come from the hex digits of the unit serial, skipping
/// anything that is not a hex digit.
pub fn gen_naa_6h_vendor_specific(company_id: u32, serial: &str) -> [u8; 16] {
    let mut naa = [0u8; 16];

    naa[0] = 0x60 | ((company_id >> 20) & 0xf) as u8;
    naa[1] = (company_id >> 12) as u8;
    naa[2] = (company_id >> 4) as u8;
    naa[3] = ((company_id & 0xf) << 4) as u8;

    let mut off = 3;
    let mut next = true;
    for val in serial.chars().filter_map(|c| c.to_digit(16)) {
        if off >= naa.len() {
            break;
        }
        if next {
            next = false;
            naa[off] |= val as u8;
            off += 1;
        } else {
            next = true;
            naa[off] = (val as u8) << 4;
        }
    }

    naa
}

/// Write a NUL terminated, NUL padded SCSI NAME STRING designator at `off`
///
/// Returns the designator length including its 4-byte header.
fn put_scsi_name(buf: &mut ResponseBuf, off: usize, header: [u8; 2], name: &str) -> usize {
    // NUL terminator, then pad to a multiple of four
    let mut name_len = (name.len() + 1 + 3) & !3;
    if name_len > SCSI_NAME_MAX_LEN {
        name_len = SCSI_NAME_MAX_LEN;
    }

    buf.put_u8(off, header[0]);
    buf.put_u8(off + 1, header[1]);
    buf.put_u8(off + 3, name_len as u8);
    let text = &name.as_bytes()[..name.len().min(name_len - 1)];
    buf.put_bytes(off + 4, text);

    4 + name_len
}

/// Device identification
fn emulate_evpd_83(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    let dev = cmd.device;
    let tpg = &cmd.lun.tpg;
    let proto = tpg.proto_id << 4;
    let mut off = 4;

    if let Some(serial) = &dev.wwn.unit_serial {
        // CODE SET=binary, ASSOCIATION=LU, DESIGNATOR TYPE=NAA
        buf.put_bytes(off, &[0x01, 0x03, 0x00, 0x10]);
        buf.put_bytes(off + 4, &gen_naa_6h_vendor_specific(dev.wwn.company_id, serial));
        off += 20;
    }

    // T10 vendor ID: CODE SET=ASCII, DESIGNATOR TYPE=T10 vendor ID
    buf.put_u8(off, 0x02);
    buf.put_u8(off + 1, 0x01);
    buf.put_ascii_padded(off + 4, &dev.wwn.vendor, INQUIRY_VENDOR_LEN);
    let mut id_len = INQUIRY_VENDOR_LEN;
    if let Some(serial) = &dev.wwn.unit_serial {
        let model = &dev.wwn.model[..dev.wwn.model.len().min(INQUIRY_MODEL_LEN)];
        let ident = format!("{}:{}", model, serial);
        let max = T10_VENDOR_ID_MAX_LEN - INQUIRY_VENDOR_LEN - 1;
        id_len += buf.put_bytes(off + 4 + INQUIRY_VENDOR_LEN, &ident.as_bytes()[..ident.len().min(max)]);
    }
    id_len += 1;
    buf.put_u8(off + 3, id_len as u8);
    off += id_len + 4;

    // Relative target port: PIV=1, ASSOCIATION=target port, TYPE=RTPI
    buf.put_bytes(off, &[proto | 0x01, 0x94, 0x00, 0x04]);
    buf.put_be16(off + 6, tpg.rtpi);
    off += 8;

    if let Some(tg_pt_gp) = cmd.lun.tg_pt_gp() {
        // Target port group: PIV=1, ASSOCIATION=target port, TYPE=TPG
        buf.put_bytes(off, &[proto | 0x01, 0x95, 0x00, 0x04]);
        buf.put_be16(off + 6, tg_pt_gp.id);
        off += 8;
    }

    if let Some(lu_gp) = dev.lu_group() {
        // Logical unit group: ASSOCIATION=LU
        buf.put_bytes(off, &[0x01, 0x06, 0x00, 0x04]);
        buf.put_be16(off + 6, lu_gp.id);
        off += 8;
    }

    // SCSI name string of the target port, UTF-8
    let port_name = format!("{},t,0x{:04x}", tpg.wwn, tpg.tag);
    off += put_scsi_name(buf, off, [proto | 0x03, 0x98], &port_name);

    // SCSI name string of the target device
    off += put_scsi_name(buf, off, [proto | 0x03, 0xa8], &tpg.wwn);

    buf.put_be16(2, (off - 4) as u16);
    Ok(())
}

/// Extended INQUIRY data
fn emulate_evpd_86(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    let dev = cmd.device;

    buf.put_u8(3, 0x3c);

    if let Some(sess) = cmd.session.filter(|s| s.supports_prot_pass()) {
        let types = [dev.attrib.pi_prot_type, sess.sess_prot_type];
        if types.contains(&ProtectionType::Type1) {
            // GRD_CHK | REF_CHK
            buf.put_u8(4, 0x05);
        } else if types.contains(&ProtectionType::Type3) {
            // GRD_CHK
            buf.put_u8(4, 0x04);
        }
    }

    // SPT: type 1 and type 3 protection
    if dev.device_type() == DeviceType::Disk && prot_pass_enabled(cmd) {
        buf.set_bits(4, 0x18);
    }

    // HEADSUP | ORDSUP | SIMPSUP
    buf.put_u8(5, 0x07);

    // V_SUP
    if dev.check_wce() {
        buf.put_u8(6, 0x01);
    }

    // R_SUP
    if dev.has_lba_map() {
        buf.put_u8(8, 0x10);
    }

    Ok(())
}

/// Block limits
fn emulate_evpd_b0(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    let dev = cmd.device;
    let attrib = &dev.attrib;
    let have_tp = attrib.emulate_tpu || attrib.emulate_tpws;
    let block_size = attrib.block_size;

    buf.put_u8(0, dev.device_type().code());
    buf.put_u8(3, if have_tp { 0x3c } else { 0x10 });

    // WSNZ
    buf.put_u8(4, 0x01);

    // MAXIMUM COMPARE AND WRITE LENGTH
    if attrib.emulate_caw {
        buf.put_u8(5, 0x01);
    }

    // OPTIMAL TRANSFER LENGTH GRANULARITY
    let granularity = match dev.backend.io_min {
        0 => 1,
        min => (min / block_size) as u16,
    };
    buf.put_be16(6, granularity);

    // MAXIMUM TRANSFER LENGTH
    let sg_limit = (cmd.lun.tpg.max_data_sg_nents as u64 * PAGE_SIZE as u64) / block_size as u64;
    let io_max_blocks =
        (attrib.hw_max_sectors as u64 * attrib.hw_block_size as u64) / block_size as u64;
    let mtl = match (sg_limit, io_max_blocks) {
        (0, io) => io,
        (sg, 0) => sg,
        (sg, io) => sg.min(io),
    };
    buf.put_be32(8, mtl.min(u32::MAX as u64) as u32);

    // OPTIMAL TRANSFER LENGTH
    let optimal = match dev.backend.io_opt {
        0 => attrib.optimal_sectors,
        opt => opt / block_size,
    };
    buf.put_be32(12, optimal);

    if have_tp {
        buf.put_be32(20, attrib.max_unmap_lba_count);
        buf.put_be32(24, attrib.max_unmap_block_desc_count);
        buf.put_be32(28, attrib.unmap_granularity);
        buf.put_be32(32, attrib.unmap_granularity_alignment);
        if attrib.unmap_granularity_alignment != 0 {
            // UGAVALID
            buf.set_bits(32, 0x80);
        }
    }

    // MAXIMUM WRITE SAME LENGTH
    buf.put_be64(36, attrib.max_write_same_len);

    Ok(())
}

/// Block device characteristics
fn emulate_evpd_b1(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    buf.put_u8(0, cmd.device.device_type().code());
    buf.put_u8(3, 0x3c);
    buf.put_u8(5, cmd.device.attrib.is_nonrot as u8);
    Ok(())
}

/// Logical block provisioning
fn emulate_evpd_b2(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    let attrib = &cmd.device.attrib;

    buf.put_u8(0, cmd.device.device_type().code());
    buf.put_be16(2, 0x0004);

    // THRESHOLD EXPONENT
    buf.put_u8(4, 0x00);

    if attrib.emulate_tpu {
        // LBPU
        buf.put_u8(5, 0x80);
    }
    if attrib.emulate_tpws {
        // LBPWS | LBPWS10
        buf.set_bits(5, 0x40 | 0x20);
    }
    if (attrib.emulate_tpu || attrib.emulate_tpws) && attrib.unmap_zeroes_data {
        // LBPRZ
        buf.set_bits(5, 0x04);
    }

    Ok(())
}

/// Referrals
fn emulate_evpd_b3(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    let (segment_size, segment_multiplier) = cmd.device.lba_map_segment();

    buf.put_u8(0, cmd.device.device_type().code());
    buf.put_u8(3, 0x0c);
    buf.put_be32(8, segment_size);
    buf.put_be32(12, segment_multiplier);
    Ok(())
}
