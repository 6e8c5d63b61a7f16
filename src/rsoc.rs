//! REPORT SUPPORTED OPERATION CODES
//!
//! Reporting options (CDB byte 2, bits 2:0):
//! - 0: every enabled descriptor in table order (all_commands format)
//! - 1: one opcode without service actions
//! - 2: one opcode with a service action
//! - 3: one opcode + service action, matching either form
//!
//! RCTD (CDB byte 2, bit 7) appends a command timeouts descriptor.

use crate::buffer::{cdb_be16, cdb_byte, ResponseBuf};
use crate::command::Command;
use crate::error::{SenseReason, SenseResult};
use crate::opcodes::{
    OpcodeDescriptor, SCSI_SUPPORT_FULL, SCSI_SUPPORT_NOT_SUPPORTED, SUPPORTED_OPCODES,
};

/// Size of a command timeouts descriptor
const CMD_TIMEOUTS_DESC_LEN: usize = 12;

/// Size of a command descriptor in the all_commands format
const CMD_DESC_LEN: usize = 8;

fn encode_timeouts(buf: &mut ResponseBuf, off: usize, ctdp: bool, descr: &OpcodeDescriptor) -> usize {
    if !ctdp {
        return 0;
    }

    buf.put_be16(off, 0x0a);
    buf.put_u8(off + 3, descr.specific_timeout);
    buf.put_be32(off + 4, descr.nominal_timeout);
    buf.put_be32(off + 8, descr.recommended_timeout);

    CMD_TIMEOUTS_DESC_LEN
}

fn encode_command_descriptor(
    buf: &mut ResponseBuf,
    off: usize,
    ctdp: bool,
    descr: &OpcodeDescriptor,
) -> usize {
    buf.put_u8(off, descr.opcode);
    buf.put_be16(off + 2, descr.service_action.unwrap_or(0));
    buf.put_u8(off + 5, ((ctdp as u8) << 1) | descr.sa_valid() as u8);
    buf.put_be16(off + 6, descr.cdb_size);

    CMD_DESC_LEN + encode_timeouts(buf, off + CMD_DESC_LEN, ctdp, descr)
}

fn encode_one_command(
    buf: &mut ResponseBuf,
    ctdp: bool,
    descr: Option<&OpcodeDescriptor>,
    cmd: &Command<'_>,
) -> usize {
    let descr = match descr {
        Some(d) => d,
        None => {
            buf.put_u8(1, ((ctdp as u8) << 7) | SCSI_SUPPORT_NOT_SUPPORTED);
            return 2;
        }
    };

    buf.put_u8(1, ((ctdp as u8) << 7) | SCSI_SUPPORT_FULL);
    buf.put_be16(2, descr.cdb_size);
    buf.put_bytes(4, &descr.usage_bits_for(cmd.device));

    let cdb_size = descr.cdb_size as usize;
    4 + cdb_size + encode_timeouts(buf, 4 + cdb_size, ctdp, descr)
}

/// Resolve the descriptor requested by reporting options 1 to 3
///
/// `Ok(None)` means the command is reported as not supported.
fn get_descr(cmd: &Command<'_>) -> SenseResult<Option<&'static OpcodeDescriptor>> {
    let opts = cdb_byte(&cmd.cdb, 2) & 0x07;
    let requested_opcode = cdb_byte(&cmd.cdb, 3);
    let requested_sa = cdb_be16(&cmd.cdb, 4);

    if opts > 3 {
        log::debug!(
            "{}: invalid REPORT SUPPORTED OPERATION CODES reporting options {:#x} for LUN {}",
            cmd.lun.tpg.fabric_name,
            opts,
            cmd.lun.unpacked_lun
        );
        return Err(SenseReason::InvalidCdbField);
    }

    for descr in SUPPORTED_OPCODES.iter().filter(|d| d.opcode == requested_opcode) {
        match opts {
            1 => {
                if descr.sa_valid() {
                    return Err(SenseReason::InvalidCdbField);
                }
                if descr.is_enabled(cmd) {
                    return Ok(Some(descr));
                }
            }
            2 => match descr.service_action {
                Some(sa) if sa == requested_sa => {
                    if descr.is_enabled(cmd) {
                        return Ok(Some(descr));
                    }
                }
                Some(_) => {}
                None => return Err(SenseReason::InvalidCdbField),
            },
            3 => {
                if descr.service_action.unwrap_or(0) == requested_sa && descr.is_enabled(cmd) {
                    return Ok(Some(descr));
                }
            }
            _ => {}
        }
    }

    Ok(None)
}

/// Emulate REPORT SUPPORTED OPERATION CODES
pub fn emulate_report_supp_op_codes(cmd: &mut Command<'_>) -> SenseResult<()> {
    if !cmd.device.attrib.emulate_rsoc {
        return Err(SenseReason::UnsupportedOpcode);
    }

    let rctd = cdb_byte(&cmd.cdb, 2) & 0x80 != 0;
    let opts = cdb_byte(&cmd.cdb, 2) & 0x07;
    let data_length = cmd.data_length;

    if data_length > 0 && cmd.map_data().is_none() {
        return Err(SenseReason::CommunicationFailure);
    }

    let per_descr = CMD_DESC_LEN + if rctd { CMD_TIMEOUTS_DESC_LEN } else { 0 };
    let view: &Command<'_> = cmd;
    let (buf, response_length) = if opts == 0 {
        let mut buf = ResponseBuf::new(4 + per_descr * SUPPORTED_OPCODES.len());
        let mut len = 4;
        for descr in SUPPORTED_OPCODES.iter().filter(|d| d.is_enabled(view)) {
            len += encode_command_descriptor(&mut buf, len, rctd, descr);
        }
        buf.put_be32(0, (len - 4) as u32);
        (buf, len)
    } else {
        let descr = get_descr(view)?;
        let cap = match descr {
            Some(d) => 4 + d.cdb_size as usize + if rctd { CMD_TIMEOUTS_DESC_LEN } else { 0 },
            None => 2,
        };
        let mut buf = ResponseBuf::new(cap);
        let len = encode_one_command(&mut buf, rctd, descr, view);
        (buf, len)
    };

    if let Some(mut map) = cmd.map_data() {
        let n = response_length.min(data_length as usize);
        buf.copy_to(&mut map, n);
    }

    cmd.complete_with_length(response_length as u32);
    Ok(())
}
