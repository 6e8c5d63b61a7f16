//! INQUIRY emulation
//!
//! Standard INQUIRY data is 96 bytes (ADDITIONAL LENGTH 91). With EVPD set
//! the page is produced by the matching generator in [`crate::vpd`].

use crate::buffer::{cdb_byte, ResponseBuf, SE_INQUIRY_BUF};
use crate::command::Command;
use crate::device::{DeviceType, INQUIRY_MODEL_LEN, INQUIRY_REVISION_LEN, INQUIRY_VENDOR_LEN};
use crate::error::{SenseReason, SenseResult};
use crate::scsi::{protocol_id, version_descriptor};
use crate::vpd::{find_handler, prot_pass_enabled};

/// Version descriptor of the SCSI transport a port speaks
pub fn find_scsi_transport_vd(proto_id: u8) -> u16 {
    match proto_id {
        protocol_id::FCP => version_descriptor::FCP4,
        protocol_id::ISCSI => version_descriptor::ISCSI,
        protocol_id::SAS => version_descriptor::SAS3,
        protocol_id::SBP => version_descriptor::SBP3,
        protocol_id::SRP => version_descriptor::SRP,
        _ => {
            log::warn!(
                "Cannot find VERSION DESCRIPTOR value for unknown SCSI transport PROTOCOL IDENTIFIER {:#x}",
                proto_id
            );
            0
        }
    }
}

/// Fill standard INQUIRY data into `buf`, byte 0 already holding the device type
pub fn emulate_inquiry_std(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<()> {
    let dev = cmd.device;
    let tpg = &cmd.lun.tpg;

    // RMB for tape devices
    if dev.device_type() == DeviceType::Tape {
        buf.put_u8(1, 0x80);
    }

    // Version: 0x06 = SPC-4
    buf.put_u8(2, 0x06);

    // NORMACA = 0, HISUP = 0, RESPONSE DATA FORMAT = 2
    buf.put_u8(3, 2);

    // SCCS, plus TPGS from the ALUA access type
    buf.put_u8(5, 0x80);
    if let Some(tg_pt_gp) = cmd.lun.tg_pt_gp() {
        buf.set_bits(5, tg_pt_gp.alua_access_type);
    }

    // 3PC
    if dev.attrib.emulate_3pc {
        buf.set_bits(5, 0x08);
    }

    // PROTECT
    if prot_pass_enabled(cmd) {
        buf.set_bits(5, 0x01);
    }

    // MULTIP
    if dev.export_count() > 1 {
        buf.set_bits(6, 0x10);
    }

    buf.put_u8(7, 0x02); // CmdQue = 1

    buf.put_ascii_padded(8, &dev.wwn.vendor, INQUIRY_VENDOR_LEN);
    buf.put_ascii_padded(16, &dev.wwn.model, INQUIRY_MODEL_LEN);
    buf.put_ascii_padded(32, &dev.wwn.revision, INQUIRY_REVISION_LEN);

    buf.put_be16(58, version_descriptor::SAM5);
    buf.put_be16(60, find_scsi_transport_vd(tpg.proto_id));
    buf.put_be16(62, version_descriptor::SPC4);
    if dev.device_type() == DeviceType::Disk {
        buf.put_be16(64, version_descriptor::SBC3);
    }

    // Additional length
    buf.put_u8(4, 91);

    Ok(())
}

fn build_inquiry(cmd: &Command<'_>, buf: &mut ResponseBuf) -> SenseResult<usize> {
    let evpd = cdb_byte(&cmd.cdb, 1) & 0x01 != 0;
    let page = cdb_byte(&cmd.cdb, 2);

    buf.put_u8(0, cmd.device.device_type().code());

    if !evpd {
        if page != 0 {
            log::error!("INQUIRY with EVPD==0 but PAGE CODE={:02x}", page);
            return Err(SenseReason::InvalidCdbField);
        }
        emulate_inquiry_std(cmd, buf)?;
        return Ok(buf.get(4) as usize + 5);
    }

    match find_handler(page) {
        Some(handler) => {
            buf.put_u8(1, page);
            (handler.emulate)(cmd, buf)?;
            Ok(buf.get_be16(2) as usize + 4)
        }
        None => {
            log::debug!("Unknown VPD Code: 0x{:02x}", page);
            Err(SenseReason::InvalidCdbField)
        }
    }
}

/// Emulate INQUIRY
pub fn emulate_inquiry(cmd: &mut Command<'_>) -> SenseResult<()> {
    let mut buf = ResponseBuf::new(SE_INQUIRY_BUF);
    let len = build_inquiry(cmd, &mut buf)?;

    let data_length = cmd.data_length as usize;
    let mut map = cmd.map_data().ok_or(SenseReason::CommunicationFailure)?;
    buf.copy_to(&mut map, SE_INQUIRY_BUF.min(data_length));
    drop(map);

    cmd.complete_with_length(len as u32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, ProtectionType};
    use crate::session::{prot_ops, NodeAcl, Session};
    use crate::target::{Lun, TargetPort, TargetPortGroup, TPGS_IMPLICIT_ALUA};
    use std::sync::Arc;

    fn lun() -> Lun {
        Lun::new(0, Arc::new(TargetPort::builder().build().unwrap()))
    }

    fn inquiry_cdb(evpd: bool, page: u8, alloc: u16) -> [u8; 6] {
        [0x12, evpd as u8, page, (alloc >> 8) as u8, alloc as u8, 0]
    }

    #[test]
    fn test_standard_inquiry() {
        let dev = Device::builder()
            .capacity(1024)
            .vendor("LIO-ORG")
            .model("FILEIO")
            .revision("4.0")
            .build()
            .unwrap();
        let lun = lun();
        let mut cmd = Command::new(&inquiry_cdb(false, 0, 96), 96, &dev, &lun);
        emulate_inquiry(&mut cmd).unwrap();

        let data = cmd.data();
        assert_eq!(data[0], 0x00);
        assert_eq!(data[2], 0x06);
        assert_eq!(data[3], 0x02);
        assert_eq!(data[4], 91);
        assert_eq!(data[5], 0x88); // SCCS | 3PC
        assert_eq!(data[7], 0x02);
        assert_eq!(&data[8..16], b"LIO-ORG ");
        assert_eq!(&data[16..32], b"FILEIO          ");
        assert_eq!(&data[32..36], b"4.0 ");
        assert_eq!(&data[58..66], &[0x00, 0xA0, 0x09, 0x60, 0x04, 0x60, 0x04, 0xC0]);
        assert_eq!(cmd.completion().unwrap().length, Some(96));
    }

    #[test]
    fn test_identity_fields_truncated() {
        let dev = Device::builder()
            .capacity(8)
            .vendor("VERYLONGVENDOR")
            .model("A-MODEL-NAME-THAT-IS-TOO-LONG")
            .revision("12345")
            .build()
            .unwrap();
        let lun = lun();
        let mut cmd = Command::new(&inquiry_cdb(false, 0, 96), 96, &dev, &lun);
        emulate_inquiry(&mut cmd).unwrap();
        let data = cmd.data();
        assert_eq!(&data[8..16], b"VERYLONG");
        assert_eq!(&data[16..32], b"A-MODEL-NAME-THA");
        assert_eq!(&data[32..36], b"1234");
    }

    #[test]
    fn test_flags_from_alua_protection_and_exports() {
        let dev = Device::builder()
            .capacity(8)
            .device_type(DeviceType::Tape)
            .export_count(2)
            .configure(|a| {
                a.emulate_3pc = false;
                a.pi_prot_type = ProtectionType::Type1;
            })
            .build()
            .unwrap();
        let lun = lun();
        lun.set_tg_pt_gp(Some(TargetPortGroup {
            id: 1,
            alua_access_type: TPGS_IMPLICIT_ALUA,
        }));
        let sess = Session::new(Arc::new(NodeAcl::new("iqn.init")))
            .with_protection(prot_ops::DOUT_PASS, ProtectionType::None);
        let mut cmd =
            Command::new(&inquiry_cdb(false, 0, 96), 96, &dev, &lun).with_session(&sess);
        emulate_inquiry(&mut cmd).unwrap();

        let data = cmd.data();
        assert_eq!(data[0], 0x01);
        assert_eq!(data[1], 0x80);
        assert_eq!(data[5], 0x91);
        assert_eq!(data[6], 0x10);
        // no SBC-3 descriptor for tape
        assert_eq!(&data[64..66], &[0, 0]);
    }

    #[test]
    fn test_short_allocation_length_keeps_full_length() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&inquiry_cdb(false, 0, 36), 36, &dev, &lun);
        emulate_inquiry(&mut cmd).unwrap();
        assert_eq!(cmd.data().len(), 36);
        assert_eq!(cmd.completion().unwrap().length, Some(96));
    }

    #[test]
    fn test_page_code_without_evpd() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&inquiry_cdb(false, 0x80, 96), 96, &dev, &lun);
        assert_eq!(emulate_inquiry(&mut cmd), Err(SenseReason::InvalidCdbField));
        assert!(cmd.completion().is_none());
        assert!(cmd.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unknown_vpd_page() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&inquiry_cdb(true, 0xC7, 96), 96, &dev, &lun);
        assert_eq!(emulate_inquiry(&mut cmd), Err(SenseReason::InvalidCdbField));
    }

    #[test]
    fn test_vpd_00_without_serial_is_empty() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&inquiry_cdb(true, 0x00, 255), 255, &dev, &lun);
        emulate_inquiry(&mut cmd).unwrap();
        assert_eq!(&cmd.data()[..4], &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(cmd.completion().unwrap().length, Some(4));
    }

    #[test]
    fn test_unmappable_buffer() {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = lun();
        let mut cmd = Command::new(&inquiry_cdb(false, 0, 96), 96, &dev, &lun).without_data_buffer();
        assert_eq!(
            emulate_inquiry(&mut cmd),
            Err(SenseReason::CommunicationFailure)
        );
    }

    #[test]
    fn test_transport_version_descriptors() {
        assert_eq!(find_scsi_transport_vd(protocol_id::SAS), 0x0C60);
        assert_eq!(find_scsi_transport_vd(protocol_id::FCP), 0x0A40);
        assert_eq!(find_scsi_transport_vd(protocol_id::ATA), 0);
    }
}
