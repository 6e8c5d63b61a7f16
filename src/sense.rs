//! REQUEST SENSE emulation

use crate::buffer::{cdb_byte, SE_SENSE_BUF};
use crate::command::Command;
use crate::error::{SenseReason, SenseResult};
use crate::scsi::{sense_key, SenseData};

/// Emulate REQUEST SENSE
///
/// Reports and clears the oldest pending unit attention on the command's
/// nexus entry, otherwise NO SENSE. Only the format the device uses for
/// CHECK CONDITION is supported.
pub fn emulate_request_sense(cmd: &mut Command<'_>) -> SenseResult<()> {
    if cdb_byte(&cmd.cdb, 1) & 0x01 != 0 {
        log::error!("REQUEST_SENSE description emulation not supported");
        return Err(SenseReason::InvalidCdbField);
    }

    let data_length = cmd.data_length;
    let desc_format = cmd.device.sense_desc_format();
    let entry = cmd.dev_entry();

    let mut map = cmd.map_data().ok_or(SenseReason::CommunicationFailure)?;

    let sense = match entry.as_ref().and_then(|e| e.take_ua()) {
        Some(ua) => {
            log::debug!(
                "REQUEST SENSE: reporting unit attention ASC 0x{:02x} ASCQ 0x{:02x}",
                ua.asc,
                ua.ascq
            );
            SenseData::new(sense_key::UNIT_ATTENTION, ua.asc, ua.ascq)
        }
        None => SenseData::no_sense(),
    };

    let mut buf = [0u8; SE_SENSE_BUF];
    let bytes = sense.encode(desc_format);
    buf[..bytes.len()].copy_from_slice(&bytes);

    let n = SE_SENSE_BUF.min(data_length as usize).min(map.len());
    map[..n].copy_from_slice(&buf[..n]);
    drop(map);

    cmd.complete_with_length(data_length);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::scsi::{asc, opcode};
    use crate::session::{NodeAcl, Session};
    use crate::target::{Lun, TargetPort};
    use std::sync::Arc;

    fn setup(capacity: u64) -> (Device, Lun) {
        let dev = Device::builder().capacity(capacity).build().unwrap();
        let lun = Lun::new(0, Arc::new(TargetPort::builder().build().unwrap()));
        (dev, lun)
    }

    fn request_sense_cdb(desc: bool, alloc: u8) -> [u8; 6] {
        [opcode::REQUEST_SENSE, desc as u8, 0, 0, alloc, 0]
    }

    #[test]
    fn test_no_sense_fixed_format() {
        let (dev, lun) = setup(8);
        let mut cmd = Command::new(&request_sense_cdb(false, 252), 252, &dev, &lun);
        emulate_request_sense(&mut cmd).unwrap();
        let data = cmd.data();
        assert_eq!(data[0], 0x70);
        assert_eq!(data[2], sense_key::NO_SENSE);
        assert_eq!(data[7], 10);
        assert_eq!(data[12], 0);
        assert_eq!(cmd.completion().unwrap().length, Some(252));
    }

    #[test]
    fn test_unit_attention_reported_once() {
        let (dev, lun) = setup(8);
        let acl = Arc::new(NodeAcl::new("iqn.init"));
        let entry = acl.map_lun(0, false);
        entry.establish_ua(asc::REPORTED_LUNS_DATA_HAS_CHANGED, 0x0e);
        let sess = Session::new(acl);

        let mut cmd = Command::new(&request_sense_cdb(false, 18), 18, &dev, &lun).with_session(&sess);
        emulate_request_sense(&mut cmd).unwrap();
        let data = cmd.data();
        assert_eq!(data[2], sense_key::UNIT_ATTENTION);
        assert_eq!(&data[12..14], &[0x3f, 0x0e]);
        assert_eq!(entry.pending_ua_count(), 0);

        let mut cmd = Command::new(&request_sense_cdb(false, 18), 18, &dev, &lun).with_session(&sess);
        emulate_request_sense(&mut cmd).unwrap();
        assert_eq!(cmd.data()[2], sense_key::NO_SENSE);
    }

    #[test]
    fn test_descriptor_format_on_large_device() {
        let (dev, lun) = setup(0x2_0000_0000);
        let mut cmd = Command::new(&request_sense_cdb(false, 96), 96, &dev, &lun);
        emulate_request_sense(&mut cmd).unwrap();
        assert_eq!(&cmd.data()[..8], &[0x72, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_desc_bit_rejected() {
        let (dev, lun) = setup(8);
        let mut cmd = Command::new(&request_sense_cdb(true, 18), 18, &dev, &lun);
        assert_eq!(
            emulate_request_sense(&mut cmd),
            Err(SenseReason::InvalidCdbField)
        );
    }

    #[test]
    fn test_unmappable_buffer_keeps_unit_attention() {
        let (dev, lun) = setup(8);
        let acl = Arc::new(NodeAcl::new("iqn.init"));
        let entry = acl.map_lun(0, false);
        entry.establish_ua(asc::POWER_ON_RESET, 0);
        let sess = Session::new(acl);

        let mut cmd = Command::new(&request_sense_cdb(false, 18), 18, &dev, &lun)
            .with_session(&sess)
            .without_data_buffer();
        assert_eq!(
            emulate_request_sense(&mut cmd),
            Err(SenseReason::CommunicationFailure)
        );
        assert_eq!(entry.pending_ua_count(), 1);
    }
}
