//! CDB parsing and command dispatch
//!
//! [`parse_cdb`] decides the expected transfer size and who executes a
//! command. [`SpcHandler::handle_command`] runs the emulated commands and
//! turns failures into CHECK CONDITION responses.

use crate::buffer::{cdb_be16, cdb_be24, cdb_be32, cdb_byte};
use crate::command::{Command, TaskAttr};
use crate::device::DeviceType;
use crate::error::{SenseReason, SenseResult};
use crate::inquiry::emulate_inquiry;
use crate::luns::emulate_report_luns;
use crate::mode::{emulate_modeselect, emulate_modesense};
use crate::rsoc::emulate_report_supp_op_codes;
use crate::scsi::{opcode, scsi_status, service_action, ScsiResponse};
use crate::sense::emulate_request_sense;

/// Emulator entry point
pub type EmulateFn = fn(&mut Command<'_>) -> SenseResult<()>;

/// Commands executed by collaborators outside the emulation core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalOp {
    PersistentReserveIn,
    PersistentReserveOut,
    Reserve,
    Release,
    ExtendedCopy,
    ReceiveCopyResults,
    ReportTargetPortGroups,
    SetTargetPortGroups,
}

/// Who executes a parsed command
#[derive(Clone, Copy)]
pub enum Handler {
    Emulate(EmulateFn),
    Delegate(ExternalOp),
    /// Sized only, execution is left to the backend
    None,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Emulate(_) => write!(f, "Emulate"),
            Handler::Delegate(op) => write!(f, "Delegate({:?})", op),
            Handler::None => write!(f, "None"),
        }
    }
}

/// Result of parsing a CDB
#[derive(Debug, Clone, Copy)]
pub struct ParsedCdb {
    /// Expected data transfer size in bytes
    pub size: u32,
    pub handler: Handler,
}

/// Emulate TEST UNIT READY
pub fn emulate_test_unit_ready(cmd: &mut Command<'_>) -> SenseResult<()> {
    cmd.complete(scsi_status::GOOD);
    Ok(())
}

/// Parse the CDB of an SPC command
///
/// INQUIRY and REPORT LUNS are switched to HEAD OF QUEUE.
pub fn parse_cdb(cmd: &mut Command<'_>) -> SenseResult<ParsedCdb> {
    let dev = cmd.device;
    let cdb = &cmd.cdb;
    let op = cdb_byte(cdb, 0);

    match op {
        opcode::RESERVE | opcode::RESERVE_10 | opcode::RELEASE | opcode::RELEASE_10 => {
            if !dev.attrib.emulate_pr || dev.backend.passthrough_pgr {
                return Err(SenseReason::UnsupportedOpcode);
            }
        }
        opcode::PERSISTENT_RESERVE_IN | opcode::PERSISTENT_RESERVE_OUT => {
            if !dev.attrib.emulate_pr {
                return Err(SenseReason::UnsupportedOpcode);
            }
        }
        _ => {}
    }

    let parsed = match op {
        opcode::MODE_SELECT => ParsedCdb {
            size: cdb_byte(cdb, 4) as u32,
            handler: Handler::Emulate(emulate_modeselect),
        },
        opcode::MODE_SELECT_10 => ParsedCdb {
            size: cdb_be16(cdb, 7) as u32,
            handler: Handler::Emulate(emulate_modeselect),
        },
        opcode::MODE_SENSE => ParsedCdb {
            size: cdb_byte(cdb, 4) as u32,
            handler: Handler::Emulate(emulate_modesense),
        },
        opcode::MODE_SENSE_10 => ParsedCdb {
            size: cdb_be16(cdb, 7) as u32,
            handler: Handler::Emulate(emulate_modesense),
        },
        opcode::LOG_SELECT | opcode::LOG_SENSE => ParsedCdb {
            size: cdb_be16(cdb, 7) as u32,
            handler: Handler::None,
        },
        opcode::PERSISTENT_RESERVE_IN => ParsedCdb {
            size: cdb_be16(cdb, 7) as u32,
            handler: Handler::Delegate(ExternalOp::PersistentReserveIn),
        },
        opcode::PERSISTENT_RESERVE_OUT => ParsedCdb {
            size: cdb_be32(cdb, 5),
            handler: Handler::Delegate(ExternalOp::PersistentReserveOut),
        },
        opcode::RELEASE | opcode::RELEASE_10 => ParsedCdb {
            size: if op == opcode::RELEASE_10 {
                cdb_be16(cdb, 7) as u32
            } else {
                cmd.data_length
            },
            handler: Handler::Delegate(ExternalOp::Release),
        },
        // RESERVE(6) carries no size, trust the transport
        opcode::RESERVE | opcode::RESERVE_10 => ParsedCdb {
            size: if op == opcode::RESERVE_10 {
                cdb_be16(cdb, 7) as u32
            } else {
                cmd.data_length
            },
            handler: Handler::Delegate(ExternalOp::Reserve),
        },
        opcode::REQUEST_SENSE => ParsedCdb {
            size: cdb_byte(cdb, 4) as u32,
            handler: Handler::Emulate(emulate_request_sense),
        },
        opcode::INQUIRY => {
            cmd.task_attr = TaskAttr::HeadOfQueue;
            ParsedCdb {
                size: cdb_be16(&cmd.cdb, 3) as u32,
                handler: Handler::Emulate(emulate_inquiry),
            }
        }
        opcode::SECURITY_PROTOCOL_IN | opcode::SECURITY_PROTOCOL_OUT => ParsedCdb {
            size: cdb_be32(cdb, 6),
            handler: Handler::None,
        },
        opcode::EXTENDED_COPY => ParsedCdb {
            size: cdb_be32(cdb, 10),
            handler: Handler::Delegate(ExternalOp::ExtendedCopy),
        },
        opcode::RECEIVE_COPY_RESULTS => ParsedCdb {
            size: cdb_be32(cdb, 10),
            handler: Handler::Delegate(ExternalOp::ReceiveCopyResults),
        },
        opcode::READ_ATTRIBUTE | opcode::WRITE_ATTRIBUTE => ParsedCdb {
            size: cdb_be32(cdb, 10),
            handler: Handler::None,
        },
        opcode::RECEIVE_DIAGNOSTIC | opcode::SEND_DIAGNOSTIC => ParsedCdb {
            size: cdb_be16(cdb, 3) as u32,
            handler: Handler::None,
        },
        opcode::WRITE_BUFFER => ParsedCdb {
            size: cdb_be24(cdb, 6),
            handler: Handler::None,
        },
        opcode::REPORT_LUNS => {
            cmd.task_attr = TaskAttr::HeadOfQueue;
            ParsedCdb {
                size: cdb_be32(&cmd.cdb, 6),
                handler: Handler::Emulate(emulate_report_luns),
            }
        }
        opcode::TEST_UNIT_READY => ParsedCdb {
            size: 0,
            handler: Handler::Emulate(emulate_test_unit_ready),
        },
        opcode::MAINTENANCE_IN => {
            if dev.device_type() != DeviceType::Rom {
                // SCC-2 MAINTENANCE IN
                let handler = match (cdb_byte(cdb, 1) & 0x1f) as u16 {
                    service_action::MI_REPORT_TARGET_PGS => {
                        Handler::Delegate(ExternalOp::ReportTargetPortGroups)
                    }
                    service_action::MI_REPORT_SUPPORTED_OPERATION_CODES => {
                        Handler::Emulate(emulate_report_supp_op_codes)
                    }
                    _ => Handler::None,
                };
                ParsedCdb {
                    size: cdb_be32(cdb, 6),
                    handler,
                }
            } else {
                // MMC SEND KEY
                ParsedCdb {
                    size: cdb_be16(cdb, 8) as u32,
                    handler: Handler::None,
                }
            }
        }
        opcode::MAINTENANCE_OUT => {
            if dev.device_type() != DeviceType::Rom {
                let handler = if cdb_byte(cdb, 1) as u16 == service_action::MO_SET_TARGET_PGS {
                    Handler::Delegate(ExternalOp::SetTargetPortGroups)
                } else {
                    Handler::None
                };
                ParsedCdb {
                    size: cdb_be32(cdb, 6),
                    handler,
                }
            } else {
                ParsedCdb {
                    size: cdb_be16(cdb, 8) as u32,
                    handler: Handler::None,
                }
            }
        }
        _ => return Err(SenseReason::UnsupportedOpcode),
    };

    Ok(parsed)
}

/// What became of a command passed to [`SpcHandler::handle_command`]
#[derive(Debug)]
pub enum Disposition {
    /// Emulated here, or rejected with CHECK CONDITION
    Completed(ScsiResponse),
    /// Must be executed by an external collaborator
    Delegate { op: ExternalOp, size: u32 },
    /// Sized only, the backend executes it
    Backend { size: u32 },
}

/// SPC command handler
pub struct SpcHandler;

impl SpcHandler {
    /// Parse and, when emulated here, execute a command
    pub fn handle_command(cmd: &mut Command<'_>) -> Disposition {
        if cmd.cdb.is_empty() {
            return Disposition::Completed(Self::reject(cmd, SenseReason::UnsupportedOpcode));
        }

        log::debug!(
            "SPC CDB {} data_length {}",
            hex::encode(&cmd.cdb),
            cmd.data_length
        );

        let parsed = match parse_cdb(cmd) {
            Ok(parsed) => parsed,
            Err(reason) => return Disposition::Completed(Self::reject(cmd, reason)),
        };

        match parsed.handler {
            Handler::Emulate(emulate) => {
                let response = match emulate(cmd) {
                    Ok(()) => Self::response(cmd),
                    Err(reason) => Self::reject(cmd, reason),
                };
                Disposition::Completed(response)
            }
            Handler::Delegate(op) => Disposition::Delegate {
                op,
                size: parsed.size,
            },
            Handler::None => Disposition::Backend { size: parsed.size },
        }
    }

    fn response(cmd: &Command<'_>) -> ScsiResponse {
        match cmd.completion() {
            Some(c) => match c.length {
                Some(length) => {
                    let data = cmd.data();
                    let n = (length as usize).min(data.len());
                    ScsiResponse::good(data[..n].to_vec(), length)
                }
                None => ScsiResponse {
                    status: c.status,
                    data: Vec::new(),
                    transfer_length: cmd.data_length,
                    sense: None,
                },
            },
            None => {
                log::warn!("emulator returned without completing CDB {}", hex::encode(&cmd.cdb));
                ScsiResponse::good_no_data()
            }
        }
    }

    fn reject(cmd: &Command<'_>, reason: SenseReason) -> ScsiResponse {
        let sense = reason.sense();
        log::debug!(
            "CDB {} failed: {} ({})",
            hex::encode(&cmd.cdb),
            reason,
            crate::error::decode_sense(sense.sense_key, sense.asc, sense.ascq)
        );
        ScsiResponse::check_condition(sense)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::scsi::{asc, sense_key};
    use crate::target::{Lun, TargetPort};
    use std::sync::Arc;

    fn lun() -> Lun {
        Lun::new(0, Arc::new(TargetPort::builder().build().unwrap()))
    }

    fn size_of(cdb: &[u8], dev: &Device) -> u32 {
        let lun = lun();
        let mut cmd = Command::new(cdb, 0, dev, &lun);
        parse_cdb(&mut cmd).unwrap().size
    }

    #[test]
    fn test_size_sources() {
        let dev = Device::builder().capacity(8).build().unwrap();

        assert_eq!(size_of(&[opcode::MODE_SENSE, 0, 0x3f, 0, 0xc0, 0], &dev), 0xc0);
        assert_eq!(size_of(&[opcode::REQUEST_SENSE, 0, 0, 0, 18, 0], &dev), 18);
        assert_eq!(
            size_of(&[opcode::MODE_SENSE_10, 0, 0x3f, 0, 0, 0, 0, 0x01, 0x02, 0], &dev),
            0x102
        );
        assert_eq!(size_of(&[opcode::INQUIRY, 0, 0, 0x01, 0x00, 0], &dev), 256);
        assert_eq!(
            size_of(&[opcode::REPORT_LUNS, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0, 0], &dev),
            0x1000
        );
        assert_eq!(
            size_of(&[opcode::PERSISTENT_RESERVE_OUT, 0, 0, 0, 0, 0, 0, 0, 24, 0], &dev),
            24
        );
        assert_eq!(
            size_of(&[opcode::WRITE_BUFFER, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00, 0], &dev),
            0x10000
        );
        assert_eq!(size_of(&[opcode::TEST_UNIT_READY, 0, 0, 0, 0, 0], &dev), 0);
    }

    #[test]
    fn test_reserve6_uses_transport_length() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&[opcode::RESERVE, 0, 0, 0, 0, 0], 24, &dev, &lun);
        let parsed = parse_cdb(&mut cmd).unwrap();
        assert_eq!(parsed.size, 24);
        assert!(matches!(parsed.handler, Handler::Delegate(ExternalOp::Reserve)));
    }

    #[test]
    fn test_head_of_queue_forced() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&[opcode::INQUIRY, 0, 0, 0, 96, 0], 96, &dev, &lun);
        parse_cdb(&mut cmd).unwrap();
        assert_eq!(cmd.task_attr, TaskAttr::HeadOfQueue);

        let mut cmd = Command::new(&[opcode::MODE_SENSE, 0, 0x3f, 0, 96, 0], 96, &dev, &lun);
        parse_cdb(&mut cmd).unwrap();
        assert_eq!(cmd.task_attr, TaskAttr::Simple);
    }

    #[test]
    fn test_reservation_gating() {
        let dev = Device::builder()
            .capacity(8)
            .configure(|a| a.emulate_pr = false)
            .build()
            .unwrap();
        let lun = lun();
        for op in [opcode::RESERVE, opcode::RELEASE_10, opcode::PERSISTENT_RESERVE_IN] {
            let mut cmd = Command::new(&[op, 0, 0, 0, 0, 0, 0, 0, 0, 0], 0, &dev, &lun);
            assert_eq!(parse_cdb(&mut cmd).unwrap_err(), SenseReason::UnsupportedOpcode);
        }

        let mut dev = Device::builder().capacity(8).build().unwrap();
        dev.backend.passthrough_pgr = true;
        let mut cmd = Command::new(&[opcode::RELEASE, 0, 0, 0, 0, 0], 0, &dev, &lun);
        assert_eq!(parse_cdb(&mut cmd).unwrap_err(), SenseReason::UnsupportedOpcode);
        let mut cmd = Command::new(&[opcode::PERSISTENT_RESERVE_IN, 0, 0, 0, 0, 0, 0, 0, 8, 0], 0, &dev, &lun);
        assert!(parse_cdb(&mut cmd).is_ok());
    }

    #[test]
    fn test_maintenance_in_routing() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();

        let cdb = [opcode::MAINTENANCE_IN, 0x0a, 0, 0, 0, 0, 0, 0, 0x02, 0, 0, 0];
        let mut cmd = Command::new(&cdb, 0, &dev, &lun);
        let parsed = parse_cdb(&mut cmd).unwrap();
        assert_eq!(parsed.size, 0x200);
        assert!(matches!(
            parsed.handler,
            Handler::Delegate(ExternalOp::ReportTargetPortGroups)
        ));

        let cdb = [opcode::MAINTENANCE_IN, 0x0c, 0, 0, 0, 0, 0, 0, 0x02, 0, 0, 0];
        let mut cmd = Command::new(&cdb, 0, &dev, &lun);
        assert!(matches!(parse_cdb(&mut cmd).unwrap().handler, Handler::Emulate(_)));

        let rom = Device::builder()
            .capacity(8)
            .device_type(DeviceType::Rom)
            .build()
            .unwrap();
        let cdb = [opcode::MAINTENANCE_IN, 0x0c, 0, 0, 0, 0, 0, 0, 0x02, 0x10, 0, 0];
        let mut cmd = Command::new(&cdb, 0, &rom, &lun);
        let parsed = parse_cdb(&mut cmd).unwrap();
        assert_eq!(parsed.size, 0x0210);
        assert!(matches!(parsed.handler, Handler::None));
    }

    #[test]
    fn test_unsupported_opcode_check_condition() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&[opcode::READ_10, 0, 0, 0, 0, 0, 0, 0, 1, 0], 512, &dev, &lun);
        match SpcHandler::handle_command(&mut cmd) {
            Disposition::Completed(response) => {
                assert_eq!(response.status, scsi_status::CHECK_CONDITION);
                let sense = response.sense.unwrap();
                assert_eq!(sense.sense_key, sense_key::ILLEGAL_REQUEST);
                assert_eq!(sense.asc, asc::INVALID_COMMAND_OPERATION_CODE);
            }
            other => panic!("unexpected disposition {:?}", other),
        }
    }

    #[test]
    fn test_handle_inquiry_truncated() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&[opcode::INQUIRY, 0, 0, 0, 36, 0], 36, &dev, &lun);
        match SpcHandler::handle_command(&mut cmd) {
            Disposition::Completed(response) => {
                assert!(response.is_good());
                assert_eq!(response.data.len(), 36);
                assert_eq!(response.transfer_length, 96);
            }
            other => panic!("unexpected disposition {:?}", other),
        }
    }

    #[test]
    fn test_handle_test_unit_ready() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&[opcode::TEST_UNIT_READY, 0, 0, 0, 0, 0], 0, &dev, &lun);
        match SpcHandler::handle_command(&mut cmd) {
            Disposition::Completed(response) => {
                assert!(response.is_good());
                assert!(response.data.is_empty());
            }
            other => panic!("unexpected disposition {:?}", other),
        }
    }

    #[test]
    fn test_delegated_and_backend_commands() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let cdb = [opcode::PERSISTENT_RESERVE_IN, 0, 0, 0, 0, 0, 0, 0x00, 0x40, 0];
        let mut cmd = Command::new(&cdb, 64, &dev, &lun);
        assert!(matches!(
            SpcHandler::handle_command(&mut cmd),
            Disposition::Delegate {
                op: ExternalOp::PersistentReserveIn,
                size: 64
            }
        ));

        let cdb = [opcode::LOG_SENSE, 0, 0, 0, 0, 0, 0, 0x00, 0x80, 0];
        let mut cmd = Command::new(&cdb, 128, &dev, &lun);
        assert!(matches!(
            SpcHandler::handle_command(&mut cmd),
            Disposition::Backend { size: 128 }
        ));
    }

    #[test]
    fn test_unknown_mode_page_rejected() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&[opcode::MODE_SENSE, 0, 0x19, 0, 255, 0], 255, &dev, &lun);
        match SpcHandler::handle_command(&mut cmd) {
            Disposition::Completed(response) => {
                let sense = response.sense.unwrap();
                assert_eq!(sense.asc, asc::INVALID_FIELD_IN_CDB);
                assert!(response.data.is_empty());
            }
            other => panic!("unexpected disposition {:?}", other),
        }
    }
}
